//! Generation API constants
//!
//! Endpoint paths and the default retry/poll policy of the backend.

/// Endpoint paths, relative to the configured base URL
pub mod endpoints {
    pub const IMAGE: &str = "/v1/generate/image";
    pub const VIDEO: &str = "/v1/generate/video";
    pub const VIDEO_STATUS: &str = "/v1/generate/video/status";
    pub const TEXT: &str = "/v1/generate/text";
    pub const UPSCALE: &str = "/v1/generate/upscale";
}

/// Default client configuration
pub mod defaults {
    pub const BASE_URL: &str = "http://127.0.0.1:8000";
    /// Generation calls can take minutes
    pub const REQUEST_TIMEOUT_SECS: u64 = 600;
    pub const CONNECT_TIMEOUT_SECS: u64 = 30;
    pub const MAX_RETRIES: u32 = 5;
    pub const RETRY_INITIAL_DELAY_MS: u64 = 5_000;
    pub const RETRY_MAX_DELAY_MS: u64 = 60_000;
    pub const VIDEO_POLL_INTERVAL_MS: u64 = 10_000;
    pub const VIDEO_TIMEOUT_SECS: u64 = 600;
}

/// Video status values reported by the backend
pub mod video_status {
    pub const PROCESSING: &str = "processing";
    pub const COMPLETE: &str = "complete";
    pub const ERROR: &str = "error";
}

/// Mime type assumed when the backend reports none
pub const DEFAULT_VIDEO_MIME: &str = "video/mp4";
