//! Error types for generation handlers

use flow_engine::FlowEngineError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GenerationError>;

#[derive(Debug, Error)]
pub enum GenerationError {
    /// Transport failure (connection refused, TLS, body read)
    #[error("Request to generation API failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("Generation API error ({status}): {body}")]
    Status { status: u16, body: String },

    /// Still rate limited after every retry
    #[error("{operation}: rate limited after {attempts} attempts")]
    RateLimited { operation: String, attempts: u32 },

    /// Timed out on every attempt, or a video never finished
    #[error("{operation} timed out")]
    Timeout { operation: String },

    /// The response body did not have the expected shape
    #[error("Unexpected response from generation API: {0}")]
    Decode(String),

    /// The backend reported a failed generation
    #[error("{0}")]
    Backend(String),

    /// A field the request needs was not provided
    #[error("missing required input: {0}")]
    MissingInput(&'static str),
}

impl From<GenerationError> for FlowEngineError {
    fn from(err: GenerationError) -> Self {
        FlowEngineError::ExecutionFailed(err.to_string())
    }
}
