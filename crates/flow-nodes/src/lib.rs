//! Flow Nodes - Generation backends for the flow engine
//!
//! Implements the action nodes of a workflow (image, video, text
//! generation and upscaling) against an HTTP generation API.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use flow_engine::HandlerRegistry;
//! use flow_nodes::{register_generation_handlers, GenerationClient, GenerationConfig};
//!
//! let client = Arc::new(GenerationClient::new(GenerationConfig::default())?);
//! let mut handlers = HandlerRegistry::new();
//! register_generation_handlers(&mut handlers, client);
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod handlers;
pub mod requests;

pub use client::GenerationClient;
pub use config::GenerationConfig;
pub use error::{GenerationError, Result};
pub use handlers::{
    register_generation_handlers, ImageGenerationHandler, TextGenerationHandler, UpscaleHandler,
    VideoGenerationHandler,
};
