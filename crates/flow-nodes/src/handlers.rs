//! Action handlers backed by the generation API
//!
//! Each handler turns the merged inputs of its node into a request, calls
//! the backend and returns outputs keyed by the node's output connector.

use std::sync::Arc;

use async_trait::async_trait;
use flow_engine::{ActionHandler, HandlerRegistry, NodeType, PortValues, Result};
use serde_json::json;

use crate::client::GenerationClient;
use crate::error::GenerationError;
use crate::requests::{ImageRequest, TextRequest, UpscaleRequest, VideoRequest};

/// Generates images from a prompt and optional reference images
pub struct ImageGenerationHandler {
    client: Arc<GenerationClient>,
}

impl ImageGenerationHandler {
    pub fn new(client: Arc<GenerationClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ActionHandler for ImageGenerationHandler {
    async fn execute(&self, node_id: &str, _node_type: NodeType, inputs: PortValues) -> Result<PortValues> {
        let request = ImageRequest::from_inputs(&inputs)?;
        log::info!(
            "Image generation for '{}' ({} reference images, {})",
            node_id,
            request.reference_images.len(),
            request.aspect_ratio
        );

        let response = self.client.generate_image(&request).await?;
        if response.images.is_empty() {
            return Err(GenerationError::Backend("no images were returned".to_string()).into());
        }

        let mut outputs = PortValues::new();
        outputs.insert("images".into(), json!(response.images));
        Ok(outputs)
    }
}

/// Starts a video generation and polls it to completion
pub struct VideoGenerationHandler {
    client: Arc<GenerationClient>,
}

impl VideoGenerationHandler {
    pub fn new(client: Arc<GenerationClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ActionHandler for VideoGenerationHandler {
    async fn execute(&self, node_id: &str, _node_type: NodeType, inputs: PortValues) -> Result<PortValues> {
        let request = VideoRequest::from_inputs(&inputs)?;
        log::info!(
            "Video generation for '{}' ({}s, {}, first frame: {})",
            node_id,
            request.duration_seconds,
            request.aspect_ratio,
            request.first_frame.is_some()
        );

        let started = self.client.start_video(&request).await?;
        if started.operation_name.is_empty() {
            return Err(GenerationError::Decode("video operation name is empty".to_string()).into());
        }
        log::debug!("Video operation for '{}': {}", node_id, started.operation_name);

        let video = self.client.wait_for_video(&started.operation_name).await?;

        let mut outputs = PortValues::new();
        outputs.insert("video".into(), json!(video));
        Ok(outputs)
    }
}

pub struct TextGenerationHandler {
    client: Arc<GenerationClient>,
}

impl TextGenerationHandler {
    pub fn new(client: Arc<GenerationClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ActionHandler for TextGenerationHandler {
    async fn execute(&self, node_id: &str, _node_type: NodeType, inputs: PortValues) -> Result<PortValues> {
        let request = TextRequest::from_inputs(&inputs)?;
        log::info!("Text generation for '{}'", node_id);

        let response = self.client.generate_text(&request).await?;

        let mut outputs = PortValues::new();
        outputs.insert("text".into(), json!(response.response));
        Ok(outputs)
    }
}

pub struct UpscaleHandler {
    client: Arc<GenerationClient>,
}

impl UpscaleHandler {
    pub fn new(client: Arc<GenerationClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ActionHandler for UpscaleHandler {
    async fn execute(&self, node_id: &str, _node_type: NodeType, inputs: PortValues) -> Result<PortValues> {
        let request = UpscaleRequest::from_inputs(&inputs)?;
        log::info!("Upscale {} for '{}'", request.upscale_factor, node_id);

        let response = self.client.upscale(&request).await?;

        let mut outputs = PortValues::new();
        outputs.insert("image".into(), json!(response.image_ref()));
        Ok(outputs)
    }
}

/// Register a handler for every action node type
pub fn register_generation_handlers(registry: &mut HandlerRegistry, client: Arc<GenerationClient>) {
    registry.register(
        NodeType::ImageGeneration,
        Arc::new(ImageGenerationHandler::new(client.clone())),
    );
    registry.register(
        NodeType::VideoGeneration,
        Arc::new(VideoGenerationHandler::new(client.clone())),
    );
    registry.register(
        NodeType::TextGeneration,
        Arc::new(TextGenerationHandler::new(client.clone())),
    );
    registry.register(NodeType::Upscale, Arc::new(UpscaleHandler::new(client)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_server;
    use crate::config::GenerationConfig;
    use flow_engine::{
        EdgeCandidate, EngineConfig, NodeRegistry, NodeSettings, NodeStatus, VecEventSink,
        WorkflowController, WorkflowGraph,
    };

    fn client(base_url: String) -> Arc<GenerationClient> {
        let config = GenerationConfig {
            base_url,
            max_retries: 1,
            video_poll_interval_ms: 1,
            ..Default::default()
        };
        Arc::new(GenerationClient::new(config).unwrap())
    }

    #[test]
    fn test_every_action_type_gets_a_handler() {
        let mut registry = HandlerRegistry::new();
        register_generation_handlers(&mut registry, client("http://127.0.0.1:9".into()));

        let action_types: Vec<NodeType> = NodeRegistry::with_builtins()
            .all()
            .into_iter()
            .filter(|c| c.is_action())
            .map(|c| c.node_type)
            .collect();
        for node_type in action_types {
            assert!(registry.contains(node_type), "no handler for {}", node_type);
        }
    }

    #[tokio::test]
    async fn test_missing_prompt_fails_without_request() {
        let handler = TextGenerationHandler::new(client("http://127.0.0.1:9".into()));
        let err = handler
            .execute("t1", NodeType::TextGeneration, PortValues::new())
            .await
            .unwrap_err();
        assert_eq!(err.node_message(), "missing required input: prompt");
    }

    #[tokio::test]
    async fn test_video_handler_starts_and_polls() {
        let (base_url, server) = test_server::serve(vec![
            (
                200,
                json!({"status": "processing", "operation_name": "operations/v1"}).to_string(),
            ),
            (
                200,
                json!({"status": "complete", "video_base64": "AAAA", "mimeType": "video/mp4"}).to_string(),
            ),
        ])
        .await;
        let handler = VideoGenerationHandler::new(client(base_url));

        let mut inputs = PortValues::new();
        inputs.insert("prompt".into(), json!("waves at dusk"));
        inputs.insert("duration_seconds".into(), json!(4));
        let outputs = handler
            .execute("v1", NodeType::VideoGeneration, inputs)
            .await
            .unwrap();
        assert_eq!(outputs["video"], json!("data:video/mp4;base64,AAAA"));

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("POST /v1/generate/video"));
        assert!(requests[0].contains("\"duration_seconds\":4"));
        assert!(requests[1].starts_with("GET /v1/generate/video/status"));
    }

    #[tokio::test]
    async fn test_image_node_runs_against_backend() {
        let (base_url, _server) = test_server::serve(vec![(
            200,
            json!({"images": ["https://cdn.example/1.png"], "saved_to_library": true}).to_string(),
        )])
        .await;
        let mut handlers = HandlerRegistry::new();
        register_generation_handlers(&mut handlers, client(base_url));

        let controller = WorkflowController::new(
            WorkflowGraph::new("wf", "Poster"),
            Arc::new(NodeRegistry::with_builtins()),
            Arc::new(handlers),
            Arc::new(VecEventSink::new()),
            EngineConfig::default(),
        );
        let prompt = controller.add_node(NodeType::Prompt, (0.0, 0.0)).await.unwrap();
        let image = controller.add_node(NodeType::ImageGeneration, (200.0, 0.0)).await.unwrap();
        let gallery = controller.add_node(NodeType::ImageOutput, (400.0, 0.0)).await.unwrap();
        controller
            .update_settings(&prompt, NodeSettings::prompt("a poster"))
            .await
            .unwrap();
        controller
            .connect(EdgeCandidate::new(&prompt, "prompt", &image, "prompt"))
            .await
            .unwrap();
        controller
            .connect(EdgeCandidate::new(&image, "images", &gallery, "images"))
            .await
            .unwrap();

        controller.run_workflow().await.unwrap();

        let gallery = controller.node(&gallery).await.unwrap();
        assert_eq!(gallery.status(), NodeStatus::Completed);
        assert_eq!(gallery.data.outputs["images"], json!(["https://cdn.example/1.png"]));
    }
}
