//! Request and response bodies of the generation API
//!
//! Requests are built from the merged inputs an action handler receives;
//! field names match the backend's JSON.

use flow_engine::constants::defaults;
use flow_engine::PortValues;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{video_status, DEFAULT_VIDEO_MIME};
use crate::error::{GenerationError, Result};

const DEFAULT_IMAGE_MIME: &str = "image/png";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reference_images: Vec<String>,
    pub aspect_ratio: String,
    pub resolution: String,
}

impl ImageRequest {
    pub fn from_inputs(inputs: &PortValues) -> Result<Self> {
        Ok(Self {
            prompt: required_str(inputs, "prompt")?,
            reference_images: str_list(inputs, "reference_images"),
            aspect_ratio: opt_str(inputs, "aspect_ratio")
                .unwrap_or_else(|| defaults::IMAGE_ASPECT_RATIO.into()),
            resolution: opt_str(inputs, "resolution")
                .unwrap_or_else(|| defaults::IMAGE_RESOLUTION.into()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_frame: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_frame: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reference_images: Vec<String>,
    pub aspect_ratio: String,
    pub duration_seconds: u64,
    pub generate_audio: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl VideoRequest {
    pub fn from_inputs(inputs: &PortValues) -> Result<Self> {
        Ok(Self {
            prompt: required_str(inputs, "prompt")?,
            first_frame: opt_str(inputs, "first_frame"),
            last_frame: opt_str(inputs, "last_frame"),
            reference_images: str_list(inputs, "reference_images"),
            aspect_ratio: opt_str(inputs, "aspect_ratio")
                .unwrap_or_else(|| defaults::VIDEO_ASPECT_RATIO.into()),
            duration_seconds: inputs
                .get("duration_seconds")
                .and_then(Value::as_u64)
                .unwrap_or(u64::from(defaults::VIDEO_DURATION_SECONDS)),
            generate_audio: inputs
                .get("generate_audio")
                .and_then(Value::as_bool)
                .unwrap_or(defaults::GENERATE_AUDIO),
            seed: inputs.get("seed").and_then(Value::as_u64),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub temperature: f64,
}

impl TextRequest {
    pub fn from_inputs(inputs: &PortValues) -> Result<Self> {
        Ok(Self {
            prompt: required_str(inputs, "prompt")?,
            system_prompt: opt_str(inputs, "system_prompt"),
            context: opt_str(inputs, "context"),
            temperature: inputs
                .get("temperature")
                .and_then(Value::as_f64)
                .unwrap_or(defaults::TEMPERATURE),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpscaleRequest {
    pub image: String,
    pub upscale_factor: String,
}

impl UpscaleRequest {
    pub fn from_inputs(inputs: &PortValues) -> Result<Self> {
        Ok(Self {
            image: required_str(inputs, "image")?,
            upscale_factor: opt_str(inputs, "upscale_factor")
                .unwrap_or_else(|| defaults::UPSCALE_FACTOR.into()),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageResponse {
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoStartResponse {
    pub operation_name: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoStatusResponse {
    pub status: String,
    #[serde(default)]
    pub video_base64: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub storage_uri: Option<String>,
    #[serde(default, rename = "mimeType")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub progress: Option<u32>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl VideoStatusResponse {
    pub fn is_complete(&self) -> bool {
        self.status == video_status::COMPLETE
    }

    pub fn is_error(&self) -> bool {
        self.status == video_status::ERROR
    }

    /// Where the finished video can be loaded from
    ///
    /// A public URL wins over a storage URI; inline bytes become a data URI.
    pub fn video_ref(&self) -> Option<String> {
        if let Some(url) = self.video_url.as_ref().filter(|u| !u.is_empty()) {
            return Some(url.clone());
        }
        if let Some(uri) = self.storage_uri.as_ref().filter(|u| !u.is_empty()) {
            return Some(uri.clone());
        }
        self.video_base64.as_deref().filter(|b| !b.is_empty()).map(|b| {
            let mime = self.mime_type.as_deref().unwrap_or(DEFAULT_VIDEO_MIME);
            as_data_uri(b, mime)
        })
    }

    /// Human-readable reason for an error status
    pub fn error_message(&self) -> String {
        match &self.error {
            Some(Value::Object(map)) => map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => self
                .message
                .clone()
                .unwrap_or_else(|| "video generation failed".to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextResponse {
    pub response: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpscaleResponse {
    pub image: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl UpscaleResponse {
    /// The upscaled image as something an image connector can carry
    pub fn image_ref(&self) -> String {
        let mime = self.mime_type.as_deref().unwrap_or(DEFAULT_IMAGE_MIME);
        as_data_uri(&self.image, mime)
    }
}

/// Wrap raw base64 in a data URI; URLs and existing data URIs pass through
fn as_data_uri(data: &str, mime: &str) -> String {
    const PASSTHROUGH: [&str; 4] = ["data:", "http://", "https://", "gs://"];
    if PASSTHROUGH.iter().any(|prefix| data.starts_with(prefix)) {
        data.to_string()
    } else {
        format!("data:{};base64,{}", mime, data)
    }
}

fn opt_str(inputs: &PortValues, key: &str) -> Option<String> {
    inputs
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn required_str(inputs: &PortValues, key: &'static str) -> Result<String> {
    opt_str(inputs, key).ok_or(GenerationError::MissingInput(key))
}

fn str_list(inputs: &PortValues, key: &str) -> Vec<String> {
    match inputs.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inputs(value: Value) -> PortValues {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_image_request_from_inputs() {
        let request = ImageRequest::from_inputs(&inputs(json!({
            "prompt": "a red fox",
            "reference_images": ["a.png", "b.png"],
            "aspect_ratio": "16:9"
        })))
        .unwrap();
        assert_eq!(request.reference_images, vec!["a.png", "b.png"]);
        assert_eq!(request.resolution, "1K");

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["aspect_ratio"], "16:9");
    }

    #[test]
    fn test_missing_prompt_is_rejected() {
        let err = TextRequest::from_inputs(&inputs(json!({"prompt": "  "}))).unwrap_err();
        assert!(matches!(err, GenerationError::MissingInput("prompt")));
    }

    #[test]
    fn test_video_request_omits_empty_fields() {
        let request = VideoRequest::from_inputs(&inputs(json!({
            "prompt": "waves",
            "duration_seconds": 4,
            "generate_audio": false
        })))
        .unwrap();
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["duration_seconds"], 4);
        assert_eq!(body["generate_audio"], false);
        assert!(body.get("first_frame").is_none());
        assert!(body.get("reference_images").is_none());
        assert!(body.get("seed").is_none());
    }

    #[test]
    fn test_video_status_prefers_url() {
        let status: VideoStatusResponse = serde_json::from_value(json!({
            "status": "complete",
            "video_url": "https://cdn.example/v.mp4",
            "video_base64": "AAAA"
        }))
        .unwrap();
        assert!(status.is_complete());
        assert_eq!(status.video_ref().as_deref(), Some("https://cdn.example/v.mp4"));

        let inline: VideoStatusResponse = serde_json::from_value(json!({
            "status": "complete",
            "video_base64": "AAAA",
            "mimeType": "video/webm"
        }))
        .unwrap();
        assert_eq!(inline.video_ref().as_deref(), Some("data:video/webm;base64,AAAA"));
    }

    #[test]
    fn test_video_error_message() {
        let status: VideoStatusResponse = serde_json::from_value(json!({
            "status": "error",
            "error": {"code": 3, "message": "prompt rejected by safety filter"}
        }))
        .unwrap();
        assert!(status.is_error());
        assert_eq!(status.error_message(), "prompt rejected by safety filter");

        let bare = VideoStatusResponse {
            status: "error".into(),
            ..Default::default()
        };
        assert_eq!(bare.error_message(), "video generation failed");
    }

    #[test]
    fn test_upscale_image_ref() {
        let raw = UpscaleResponse {
            image: "iVBOR".into(),
            mime_type: Some("image/jpeg".into()),
        };
        assert_eq!(raw.image_ref(), "data:image/jpeg;base64,iVBOR");

        let uri = UpscaleResponse {
            image: "data:image/png;base64,iVBOR".into(),
            mime_type: None,
        };
        assert_eq!(uri.image_ref(), "data:image/png;base64,iVBOR");
    }
}
