//! Generation client configuration

use std::path::Path;
use std::time::Duration;

use flow_engine::config::{load_json, save_json, ConfigError};
use serde::{Deserialize, Serialize};

use crate::constants::defaults;

/// Connection and retry settings for the generation API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Base URL of the generation backend (e.g., "http://127.0.0.1:8000")
    pub base_url: String,
    /// Bearer token sent with every request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Attempts made for a rate-limited or timed-out request
    pub max_retries: u32,
    pub retry_initial_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub video_poll_interval_ms: u64,
    /// Give up on a video that has not completed after this long
    pub video_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::BASE_URL.to_string(),
            api_token: None,
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
            connect_timeout_secs: defaults::CONNECT_TIMEOUT_SECS,
            max_retries: defaults::MAX_RETRIES,
            retry_initial_delay_ms: defaults::RETRY_INITIAL_DELAY_MS,
            retry_max_delay_ms: defaults::RETRY_MAX_DELAY_MS,
            video_poll_interval_ms: defaults::VIDEO_POLL_INTERVAL_MS,
            video_timeout_secs: defaults::VIDEO_TIMEOUT_SECS,
        }
    }
}

impl GenerationConfig {
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        load_json(path).await
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        save_json(self, path).await
    }

    /// Full URL for an endpoint path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn video_poll_interval(&self) -> Duration {
        Duration::from_millis(self.video_poll_interval_ms)
    }

    pub fn video_timeout(&self) -> Duration {
        Duration::from_secs(self.video_timeout_secs)
    }

    /// Delay before retry number `attempt` (zero-based): doubles from the
    /// initial delay, capped at the maximum
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self
            .retry_initial_delay_ms
            .saturating_mul(factor)
            .min(self.retry_max_delay_ms);
        Duration::from_millis(delay)
    }
}
