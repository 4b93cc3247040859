//! Typed per-node settings
//!
//! Every node type owns one settings struct. Fields that a connector
//! writes into live on the consuming type (for example
//! `VideoGenerationSettings::first_frame`), so the propagation channel
//! and the user editor touch the same record.
//!
//! Non-action nodes compute their outputs from settings alone through
//! [`NodeSettings::recompute`]. Action nodes return `None` there and only
//! produce outputs through an action handler, which receives
//! [`NodeSettings::handler_inputs`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::constants::{defaults, limits};
use crate::error::{FlowEngineError, Result};
use crate::types::{NodeType, PortValues};

/// Settings of a node, tagged by node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeSettings {
    Prompt(PromptSettings),
    ImageUpload(ImageUploadSettings),
    Format(FormatSettings),
    PromptConcatenator(ConcatenatorSettings),
    ImageGeneration(ImageGenerationSettings),
    VideoGeneration(VideoGenerationSettings),
    TextGeneration(TextGenerationSettings),
    Upscale(UpscaleSettings),
    ImageOutput(ImageOutputSettings),
    VideoOutput(VideoOutputSettings),
    TextOutput(TextOutputSettings),
    Preview(PreviewSettings),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSettings {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageUploadSettings {
    /// Uploaded image, set by the upload contract rather than by an edge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Output format shared by generation nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatSettings {
    pub aspect_ratio: String,
    pub duration_seconds: u32,
    pub generate_audio: bool,
}

impl Default for FormatSettings {
    fn default() -> Self {
        Self {
            aspect_ratio: defaults::VIDEO_ASPECT_RATIO.to_string(),
            duration_seconds: defaults::VIDEO_DURATION_SECONDS,
            generate_audio: defaults::GENERATE_AUDIO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcatenatorSettings {
    pub separator: String,
    /// Connected prompts, in edge order
    pub prompts: Vec<String>,
}

impl Default for ConcatenatorSettings {
    fn default() -> Self {
        Self {
            separator: defaults::CONCATENATOR_SEPARATOR.to_string(),
            prompts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageGenerationSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub reference_images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<FormatSettings>,
    pub aspect_ratio: String,
    pub resolution: String,
}

impl Default for ImageGenerationSettings {
    fn default() -> Self {
        Self {
            prompt: None,
            reference_images: Vec::new(),
            format: None,
            aspect_ratio: defaults::IMAGE_ASPECT_RATIO.to_string(),
            resolution: defaults::IMAGE_RESOLUTION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoGenerationSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_frame: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_frame: Option<String>,
    pub reference_images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<FormatSettings>,
    pub aspect_ratio: String,
    pub duration_seconds: u32,
    pub generate_audio: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for VideoGenerationSettings {
    fn default() -> Self {
        Self {
            prompt: None,
            first_frame: None,
            last_frame: None,
            reference_images: Vec::new(),
            format: None,
            aspect_ratio: defaults::VIDEO_ASPECT_RATIO.to_string(),
            duration_seconds: defaults::VIDEO_DURATION_SECONDS,
            generate_audio: defaults::GENERATE_AUDIO,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextGenerationSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub context: Vec<String>,
    pub temperature: f64,
}

impl Default for TextGenerationSettings {
    fn default() -> Self {
        Self {
            prompt: None,
            system_prompt: None,
            context: Vec::new(),
            temperature: defaults::TEMPERATURE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpscaleSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub upscale_factor: String,
}

impl Default for UpscaleSettings {
    fn default() -> Self {
        Self {
            image: None,
            upscale_factor: defaults::UPSCALE_FACTOR.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageOutputSettings {
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoOutputSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextOutputSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl NodeSettings {
    /// Default settings for a freshly created node of this type
    pub fn default_for(node_type: NodeType) -> Self {
        match node_type {
            NodeType::Prompt => Self::Prompt(PromptSettings::default()),
            NodeType::ImageUpload => Self::ImageUpload(ImageUploadSettings::default()),
            NodeType::Format => Self::Format(FormatSettings::default()),
            NodeType::PromptConcatenator => Self::PromptConcatenator(ConcatenatorSettings::default()),
            NodeType::ImageGeneration => Self::ImageGeneration(ImageGenerationSettings::default()),
            NodeType::VideoGeneration => Self::VideoGeneration(VideoGenerationSettings::default()),
            NodeType::TextGeneration => Self::TextGeneration(TextGenerationSettings::default()),
            NodeType::Upscale => Self::Upscale(UpscaleSettings::default()),
            NodeType::ImageOutput => Self::ImageOutput(ImageOutputSettings::default()),
            NodeType::VideoOutput => Self::VideoOutput(VideoOutputSettings::default()),
            NodeType::TextOutput => Self::TextOutput(TextOutputSettings::default()),
            NodeType::Preview => Self::Preview(PreviewSettings::default()),
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Prompt(_) => NodeType::Prompt,
            Self::ImageUpload(_) => NodeType::ImageUpload,
            Self::Format(_) => NodeType::Format,
            Self::PromptConcatenator(_) => NodeType::PromptConcatenator,
            Self::ImageGeneration(_) => NodeType::ImageGeneration,
            Self::VideoGeneration(_) => NodeType::VideoGeneration,
            Self::TextGeneration(_) => NodeType::TextGeneration,
            Self::Upscale(_) => NodeType::Upscale,
            Self::ImageOutput(_) => NodeType::ImageOutput,
            Self::VideoOutput(_) => NodeType::VideoOutput,
            Self::TextOutput(_) => NodeType::TextOutput,
            Self::Preview(_) => NodeType::Preview,
        }
    }

    /// Shorthand for a prompt node's settings
    pub fn prompt(text: impl Into<String>) -> Self {
        Self::Prompt(PromptSettings { text: text.into() })
    }

    /// Write a gathered connector value into the matching field
    ///
    /// `None` clears the field. Returns whether the settings changed.
    pub fn apply_input(&mut self, handle: &str, value: Option<&Value>) -> Result<bool> {
        let before = self.clone();
        match self {
            Self::PromptConcatenator(s) => match handle {
                "prompts" => s.prompts = text_list(handle, value)?,
                _ => return Err(unknown_input(handle)),
            },
            Self::ImageGeneration(s) => match handle {
                "prompt" => s.prompt = opt_text(handle, value)?,
                "reference_images" => s.reference_images = string_list(handle, value)?,
                "format" => s.format = opt_format(handle, value)?,
                _ => return Err(unknown_input(handle)),
            },
            Self::VideoGeneration(s) => match handle {
                "prompt" => s.prompt = opt_text(handle, value)?,
                "first_frame" => s.first_frame = opt_text(handle, value)?,
                "last_frame" => s.last_frame = opt_text(handle, value)?,
                "reference_images" => s.reference_images = string_list(handle, value)?,
                "format" => s.format = opt_format(handle, value)?,
                _ => return Err(unknown_input(handle)),
            },
            Self::TextGeneration(s) => match handle {
                "prompt" => s.prompt = opt_text(handle, value)?,
                "system_prompt" => s.system_prompt = opt_text(handle, value)?,
                "context" => s.context = text_list(handle, value)?,
                _ => return Err(unknown_input(handle)),
            },
            Self::Upscale(s) => match handle {
                "image" => s.image = opt_text(handle, value)?,
                _ => return Err(unknown_input(handle)),
            },
            Self::ImageOutput(s) => match handle {
                "images" => s.images = string_list(handle, value)?,
                _ => return Err(unknown_input(handle)),
            },
            Self::VideoOutput(s) => match handle {
                "video" => s.video = opt_text(handle, value)?,
                _ => return Err(unknown_input(handle)),
            },
            Self::TextOutput(s) => match handle {
                "text" => s.text = opt_text(handle, value)?,
                _ => return Err(unknown_input(handle)),
            },
            Self::Preview(s) => match handle {
                "value" => s.value = value.filter(|v| !v.is_null()).cloned(),
                _ => return Err(unknown_input(handle)),
            },
            Self::Prompt(_) | Self::ImageUpload(_) | Self::Format(_) => {
                return Err(unknown_input(handle));
            }
        }
        Ok(*self != before)
    }

    /// Whether an input field currently holds a usable value
    pub fn has_input(&self, handle: &str) -> bool {
        match (self, handle) {
            (Self::PromptConcatenator(s), "prompts") => s.prompts.iter().any(|p| filled(p)),
            (Self::ImageGeneration(s), "prompt") => opt_filled(&s.prompt),
            (Self::ImageGeneration(s), "reference_images") => !s.reference_images.is_empty(),
            (Self::ImageGeneration(s), "format") => s.format.is_some(),
            (Self::VideoGeneration(s), "prompt") => opt_filled(&s.prompt),
            (Self::VideoGeneration(s), "first_frame") => opt_filled(&s.first_frame),
            (Self::VideoGeneration(s), "last_frame") => opt_filled(&s.last_frame),
            (Self::VideoGeneration(s), "reference_images") => !s.reference_images.is_empty(),
            (Self::VideoGeneration(s), "format") => s.format.is_some(),
            (Self::TextGeneration(s), "prompt") => opt_filled(&s.prompt),
            (Self::TextGeneration(s), "system_prompt") => opt_filled(&s.system_prompt),
            (Self::TextGeneration(s), "context") => s.context.iter().any(|c| filled(c)),
            (Self::Upscale(s), "image") => opt_filled(&s.image),
            (Self::ImageOutput(s), "images") => !s.images.is_empty(),
            (Self::VideoOutput(s), "video") => opt_filled(&s.video),
            (Self::TextOutput(s), "text") => opt_filled(&s.text),
            (Self::Preview(s), "value") => s.value.is_some(),
            _ => false,
        }
    }

    /// Recompute outputs from settings alone
    ///
    /// Returns `None` for action nodes, whose outputs only come from a handler.
    pub fn recompute(&self) -> Option<PortValues> {
        let mut outputs = PortValues::new();
        match self {
            Self::Prompt(s) => {
                outputs.insert("prompt".into(), json!(s.text));
            }
            Self::ImageUpload(s) => {
                if let Some(image) = &s.image {
                    outputs.insert("image".into(), json!(image));
                }
            }
            Self::Format(s) => {
                outputs.insert(
                    "format".into(),
                    json!({
                        "aspect_ratio": s.aspect_ratio,
                        "duration_seconds": s.duration_seconds,
                        "generate_audio": s.generate_audio,
                    }),
                );
            }
            Self::PromptConcatenator(s) => {
                let joined = s
                    .prompts
                    .iter()
                    .map(|p| p.trim())
                    .filter(|p| !p.is_empty())
                    .collect::<Vec<_>>()
                    .join(&s.separator);
                outputs.insert("prompt".into(), json!(joined));
            }
            Self::ImageOutput(s) => {
                if !s.images.is_empty() {
                    outputs.insert("images".into(), json!(s.images));
                }
            }
            Self::VideoOutput(s) => {
                if let Some(video) = &s.video {
                    outputs.insert("video".into(), json!(video));
                }
            }
            Self::TextOutput(s) => {
                if let Some(text) = &s.text {
                    outputs.insert("text".into(), json!(text));
                }
            }
            Self::Preview(s) => {
                if let Some(value) = &s.value {
                    outputs.insert("value".into(), value.clone());
                }
            }
            Self::ImageGeneration(_)
            | Self::VideoGeneration(_)
            | Self::TextGeneration(_)
            | Self::Upscale(_) => return None,
        }
        Some(outputs)
    }

    /// Request fields handed to an action handler
    ///
    /// Settings and connected inputs are merged; a connected format
    /// overrides the node's own format fields.
    pub fn handler_inputs(&self) -> PortValues {
        let mut inputs = PortValues::new();
        match self {
            Self::ImageGeneration(s) => {
                put_opt(&mut inputs, "prompt", &s.prompt);
                put_images(&mut inputs, &s.reference_images, limits::MAX_IMAGE_REFERENCES);
                let aspect_ratio = s
                    .format
                    .as_ref()
                    .map_or(&s.aspect_ratio, |f| &f.aspect_ratio);
                inputs.insert("aspect_ratio".into(), json!(aspect_ratio));
                inputs.insert("resolution".into(), json!(s.resolution));
            }
            Self::VideoGeneration(s) => {
                put_opt(&mut inputs, "prompt", &s.prompt);
                put_opt(&mut inputs, "first_frame", &s.first_frame);
                put_opt(&mut inputs, "last_frame", &s.last_frame);
                put_images(&mut inputs, &s.reference_images, limits::MAX_VIDEO_REFERENCES);
                let (aspect_ratio, duration, audio) = match &s.format {
                    Some(f) => (&f.aspect_ratio, f.duration_seconds, f.generate_audio),
                    None => (&s.aspect_ratio, s.duration_seconds, s.generate_audio),
                };
                inputs.insert("aspect_ratio".into(), json!(aspect_ratio));
                inputs.insert("duration_seconds".into(), json!(duration));
                inputs.insert("generate_audio".into(), json!(audio));
                if let Some(seed) = s.seed {
                    inputs.insert("seed".into(), json!(seed));
                }
            }
            Self::TextGeneration(s) => {
                put_opt(&mut inputs, "prompt", &s.prompt);
                put_opt(&mut inputs, "system_prompt", &s.system_prompt);
                let context: Vec<&str> = s
                    .context
                    .iter()
                    .map(String::as_str)
                    .filter(|c| filled(c))
                    .collect();
                if !context.is_empty() {
                    inputs.insert(
                        "context".into(),
                        json!(context.join(defaults::CONTEXT_SEPARATOR)),
                    );
                }
                inputs.insert("temperature".into(), json!(s.temperature));
            }
            Self::Upscale(s) => {
                put_opt(&mut inputs, "image", &s.image);
                inputs.insert("upscale_factor".into(), json!(s.upscale_factor));
            }
            _ => {}
        }
        inputs
    }

    /// Check user-editable fields against the accepted ranges
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Prompt(s) => check_prompt("text", &s.text),
            Self::Format(s) => check_duration(s.duration_seconds),
            Self::VideoGeneration(s) => {
                check_duration(s.duration_seconds)?;
                if let Some(format) = &s.format {
                    check_duration(format.duration_seconds)?;
                }
                s.prompt.as_deref().map_or(Ok(()), |p| check_prompt("prompt", p))
            }
            Self::ImageGeneration(s) => {
                s.prompt.as_deref().map_or(Ok(()), |p| check_prompt("prompt", p))
            }
            Self::TextGeneration(s) => {
                if !s.temperature.is_finite()
                    || s.temperature < limits::MIN_TEMPERATURE
                    || s.temperature > limits::MAX_TEMPERATURE
                {
                    return Err(FlowEngineError::InvalidSettings(format!(
                        "temperature must be between {} and {}",
                        limits::MIN_TEMPERATURE,
                        limits::MAX_TEMPERATURE
                    )));
                }
                if let Some(system_prompt) = &s.system_prompt {
                    check_prompt("system_prompt", system_prompt)?;
                }
                let context_chars: usize = s.context.iter().map(|c| c.chars().count()).sum();
                if context_chars > limits::MAX_CONTEXT_CHARS {
                    return Err(FlowEngineError::InvalidSettings(format!(
                        "context exceeds {} characters",
                        limits::MAX_CONTEXT_CHARS
                    )));
                }
                s.prompt.as_deref().map_or(Ok(()), |p| check_prompt("prompt", p))
            }
            Self::Upscale(s) => {
                if limits::UPSCALE_FACTORS.contains(&s.upscale_factor.as_str()) {
                    Ok(())
                } else {
                    Err(FlowEngineError::InvalidSettings(format!(
                        "unsupported upscale factor '{}'",
                        s.upscale_factor
                    )))
                }
            }
            _ => Ok(()),
        }
    }
}

fn unknown_input(handle: &str) -> FlowEngineError {
    FlowEngineError::invalid_input(handle, "no such input on this node")
}

fn filled(s: &str) -> bool {
    !s.trim().is_empty()
}

fn opt_filled(s: &Option<String>) -> bool {
    s.as_deref().is_some_and(filled)
}

fn put_opt(inputs: &mut PortValues, key: &str, value: &Option<String>) {
    if let Some(v) = value.as_deref().filter(|v| filled(v)) {
        inputs.insert(key.to_string(), json!(v));
    }
}

fn put_images(inputs: &mut PortValues, images: &[String], max: usize) {
    if images.is_empty() {
        return;
    }
    if images.len() > max {
        log::debug!("Forwarding {} of {} reference images", max, images.len());
    }
    let kept: Vec<&String> = images.iter().take(max).collect();
    inputs.insert("reference_images".into(), json!(kept));
}

fn text_value(handle: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Array(items) => {
            let parts = items
                .iter()
                .map(|v| text_value(handle, v))
                .collect::<Result<Vec<_>>>()?;
            Ok(parts.join(defaults::CONCATENATOR_SEPARATOR))
        }
        other => Err(FlowEngineError::invalid_input(
            handle,
            format!("expected text, got {}", other),
        )),
    }
}

fn opt_text(handle: &str, value: Option<&Value>) -> Result<Option<String>> {
    value
        .filter(|v| !v.is_null())
        .map(|v| text_value(handle, v))
        .transpose()
}

fn text_list(handle: &str, value: Option<&Value>) -> Result<Vec<String>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items.iter().map(|v| text_value(handle, v)).collect(),
        Some(v) => Ok(vec![text_value(handle, v)?]),
    }
}

fn string_list(handle: &str, value: Option<&Value>) -> Result<Vec<String>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => Ok(s.clone()),
                other => Err(FlowEngineError::invalid_input(
                    handle,
                    format!("expected an image, got {}", other),
                )),
            })
            .collect(),
        Some(other) => Err(FlowEngineError::invalid_input(
            handle,
            format!("expected images, got {}", other),
        )),
    }
}

fn opt_format(handle: &str, value: Option<&Value>) -> Result<Option<FormatSettings>> {
    value
        .filter(|v| !v.is_null())
        .map(|v| {
            serde_json::from_value(v.clone())
                .map_err(|e| FlowEngineError::invalid_input(handle, e.to_string()))
        })
        .transpose()
}

fn check_prompt(field: &str, text: &str) -> Result<()> {
    if text.chars().count() > limits::MAX_PROMPT_CHARS {
        return Err(FlowEngineError::InvalidSettings(format!(
            "{} exceeds {} characters",
            field,
            limits::MAX_PROMPT_CHARS
        )));
    }
    Ok(())
}

fn check_duration(seconds: u32) -> Result<()> {
    if !(limits::MIN_VIDEO_DURATION_SECONDS..=limits::MAX_VIDEO_DURATION_SECONDS).contains(&seconds) {
        return Err(FlowEngineError::InvalidSettings(format!(
            "duration must be between {} and {} seconds",
            limits::MIN_VIDEO_DURATION_SECONDS,
            limits::MAX_VIDEO_DURATION_SECONDS
        )));
    }
    Ok(())
}
