//! HTTP client for the generation API
//!
//! Rate-limited (HTTP 429) and timed-out requests are retried with
//! exponential backoff; any other failure status is returned at once.

use std::time::Instant;

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::GenerationConfig;
use crate::constants::endpoints;
use crate::error::{GenerationError, Result};
use crate::requests::{
    ImageRequest, ImageResponse, TextRequest, TextResponse, UpscaleRequest, UpscaleResponse,
    VideoRequest, VideoStartResponse, VideoStatusResponse,
};

/// Error bodies are cut to this many characters
const MAX_ERROR_BODY: usize = 500;

/// Whether a response status should be retried
pub fn is_rate_limited(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
}

pub struct GenerationClient {
    http: reqwest::Client,
    config: GenerationConfig,
}

impl GenerationClient {
    pub fn new(config: GenerationConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub async fn generate_image(&self, request: &ImageRequest) -> Result<ImageResponse> {
        self.post_json(endpoints::IMAGE, request, "Image generation").await
    }

    /// Start a video generation; the returned operation is polled separately
    pub async fn start_video(&self, request: &VideoRequest) -> Result<VideoStartResponse> {
        self.post_json(endpoints::VIDEO, request, "Video generation").await
    }

    pub async fn video_status(&self, operation_name: &str) -> Result<VideoStatusResponse> {
        let query = [("operation_id", operation_name)];
        let url = self.config.url(endpoints::VIDEO_STATUS);
        self.send_with_retry("Video status check", || self.http.get(&url).query(&query))
            .await
    }

    /// Poll a video operation until it completes, fails or runs out of time
    ///
    /// Returns a reference to the finished video (URL or data URI).
    pub async fn wait_for_video(&self, operation_name: &str) -> Result<String> {
        let deadline = Instant::now() + self.config.video_timeout();
        loop {
            let status = self.video_status(operation_name).await?;
            if status.is_complete() {
                return status.video_ref().ok_or_else(|| {
                    GenerationError::Backend(
                        "video generation completed but no video data found".to_string(),
                    )
                });
            }
            if status.is_error() {
                return Err(GenerationError::Backend(status.error_message()));
            }

            log::debug!(
                "Video operation {} is {} ({}%)",
                operation_name,
                status.status,
                status.progress.unwrap_or(0)
            );
            if Instant::now() >= deadline {
                log::error!("Video operation {} did not finish in time", operation_name);
                return Err(GenerationError::Timeout {
                    operation: "Video generation".to_string(),
                });
            }
            tokio::time::sleep(self.config.video_poll_interval()).await;
        }
    }

    pub async fn generate_text(&self, request: &TextRequest) -> Result<TextResponse> {
        self.post_json(endpoints::TEXT, request, "Text generation").await
    }

    pub async fn upscale(&self, request: &UpscaleRequest) -> Result<UpscaleResponse> {
        self.post_json(endpoints::UPSCALE, request, "Upscale").await
    }

    async fn post_json<B, R>(&self, path: &str, body: &B, operation: &str) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.config.url(path);
        self.send_with_retry(operation, || self.http.post(&url).json(body))
            .await
    }

    async fn send_with_retry<R, F>(&self, operation: &str, build: F) -> Result<R>
    where
        R: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let attempts = self.config.max_retries.max(1);
        let mut timed_out = false;

        for attempt in 0..attempts {
            let delay = self.config.backoff_delay(attempt);
            match self.authorize(build()).send().await {
                Ok(response) if is_rate_limited(response.status()) => {
                    timed_out = false;
                    log::warn!(
                        "{}: rate limited (attempt {}/{}), retrying in {:?}",
                        operation,
                        attempt + 1,
                        attempts,
                        delay
                    );
                }
                Ok(response) if !response.status().is_success() => {
                    let status = response.status().as_u16();
                    let body: String = response
                        .text()
                        .await
                        .unwrap_or_default()
                        .chars()
                        .take(MAX_ERROR_BODY)
                        .collect();
                    log::error!("{} failed with status {}: {}", operation, status, body);
                    return Err(GenerationError::Status { status, body });
                }
                Ok(response) => {
                    return response
                        .json::<R>()
                        .await
                        .map_err(|e| GenerationError::Decode(e.to_string()));
                }
                Err(e) if e.is_timeout() => {
                    timed_out = true;
                    log::warn!(
                        "{}: request timed out (attempt {}/{}), retrying in {:?}",
                        operation,
                        attempt + 1,
                        attempts,
                        delay
                    );
                }
                Err(e) => return Err(e.into()),
            }

            if attempt + 1 < attempts {
                tokio::time::sleep(delay).await;
            }
        }

        log::error!("{}: all {} attempts exhausted", operation, attempts);
        if timed_out {
            Err(GenerationError::Timeout {
                operation: operation.to_string(),
            })
        } else {
            Err(GenerationError::RateLimited {
                operation: operation.to_string(),
                attempts,
            })
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fast_config(base_url: String) -> GenerationConfig {
        GenerationConfig {
            base_url,
            max_retries: 3,
            retry_initial_delay_ms: 1,
            retry_max_delay_ms: 2,
            video_poll_interval_ms: 1,
            ..Default::default()
        }
    }

    fn text_request() -> TextRequest {
        TextRequest {
            prompt: "hello".into(),
            system_prompt: None,
            context: None,
            temperature: 0.7,
        }
    }

    #[test]
    fn test_only_429_is_retried() {
        assert!(is_rate_limited(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_rate_limited(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_rate_limited(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn test_retries_after_rate_limit() {
        let (base_url, server) = test_server::serve(vec![
            (429, json!({"detail": "slow down"}).to_string()),
            (200, json!({"response": "hi there"}).to_string()),
        ])
        .await;
        let mut config = fast_config(base_url);
        config.api_token = Some("secret".into());
        let client = GenerationClient::new(config).unwrap();

        let response = client.generate_text(&text_request()).await.unwrap();
        assert_eq!(response.response, "hi there");

        let requests = server.await.unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].starts_with("POST /v1/generate/text"));
        assert!(requests[1].to_lowercase().contains("authorization: bearer secret"));
        assert!(requests[1].contains("\"prompt\":\"hello\""));
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let (base_url, server) =
            test_server::serve(vec![(500, json!({"detail": "boom"}).to_string())]).await;
        let client = GenerationClient::new(fast_config(base_url)).unwrap();

        let err = client.generate_text(&text_request()).await.unwrap_err();
        match err {
            GenerationError::Status { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("boom"));
            }
            other => panic!("Expected a status error, got {:?}", other),
        }
        assert_eq!(server.await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_exhausts_retries() {
        let limited = json!({"detail": "slow down"}).to_string();
        let (base_url, server) =
            test_server::serve(vec![(429, limited.clone()), (429, limited.clone()), (429, limited)]).await;
        let client = GenerationClient::new(fast_config(base_url)).unwrap();

        let err = client.generate_text(&text_request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::RateLimited { attempts: 3, .. }));
        assert_eq!(server.await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_wait_for_video_polls_until_complete() {
        let (base_url, server) = test_server::serve(vec![
            (200, json!({"status": "processing", "progress": 40}).to_string()),
            (
                200,
                json!({"status": "complete", "video_url": "https://cdn.example/v.mp4"}).to_string(),
            ),
        ])
        .await;
        let client = GenerationClient::new(fast_config(base_url)).unwrap();

        let video = client.wait_for_video("operations/abc").await.unwrap();
        assert_eq!(video, "https://cdn.example/v.mp4");

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("GET /v1/generate/video/status?operation_id=operations%2Fabc"));
    }

    #[tokio::test]
    async fn test_wait_for_video_reports_backend_error() {
        let (base_url, _server) = test_server::serve(vec![(
            200,
            json!({"status": "error", "error": {"message": "quota exceeded"}}).to_string(),
        )])
        .await;
        let client = GenerationClient::new(fast_config(base_url)).unwrap();

        let err = client.wait_for_video("op").await.unwrap_err();
        assert_eq!(err.to_string(), "quota exceeded");
    }
}
