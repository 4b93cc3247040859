//! Action handlers
//!
//! Action nodes (image, video and text generation, upscale) do their work
//! outside the engine. A handler receives the node's merged settings and
//! connector inputs and returns its outputs keyed by output connector id.
//! The engine never retries a handler; retry policy belongs to the handler.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{NodeType, PortValues};

/// Executes one kind of action node
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(&self, node_id: &str, node_type: NodeType, inputs: PortValues) -> Result<PortValues>;
}

type BoxedCallback = Box<
    dyn Fn(String, PortValues) -> Pin<Box<dyn Future<Output = Result<PortValues>> + Send>>
        + Send
        + Sync,
>;

/// Async callback-based handler
///
/// Wraps an async closure as an [`ActionHandler`]. Handy for tests and for
/// hosts that bridge to another runtime.
pub struct CallbackActionHandler {
    callback: BoxedCallback,
}

impl CallbackActionHandler {
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn(String, PortValues) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<PortValues>> + Send + 'static,
    {
        Self {
            callback: Box::new(move |node_id, inputs| Box::pin(callback(node_id, inputs))),
        }
    }
}

#[async_trait]
impl ActionHandler for CallbackActionHandler {
    async fn execute(&self, node_id: &str, _node_type: NodeType, inputs: PortValues) -> Result<PortValues> {
        (self.callback)(node_id.to_string(), inputs).await
    }
}

/// One handler per action node type
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<NodeType, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, returning the one it replaces
    pub fn register(
        &mut self,
        node_type: NodeType,
        handler: Arc<dyn ActionHandler>,
    ) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.insert(node_type, handler)
    }

    /// Register an async closure as the handler for a node type
    pub fn register_fn<F, Fut>(&mut self, node_type: NodeType, callback: F)
    where
        F: Fn(String, PortValues) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<PortValues>> + Send + 'static,
    {
        self.register(node_type, Arc::new(CallbackActionHandler::new(callback)));
    }

    pub fn get(&self, node_type: NodeType) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(&node_type).cloned()
    }

    pub fn contains(&self, node_type: NodeType) -> bool {
        self.handlers.contains_key(&node_type)
    }

    /// Registered node types, sorted
    pub fn node_types(&self) -> Vec<NodeType> {
        let mut types: Vec<NodeType> = self.handlers.keys().copied().collect();
        types.sort();
        types
    }

    /// Merge another registry into this one; `other` wins on conflicts
    pub fn merge(&mut self, other: HandlerRegistry) {
        self.handlers.extend(other.handlers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlowEngineError;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_fn() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn(NodeType::TextGeneration, |_node_id, inputs| async move {
            let prompt = inputs
                .get("prompt")
                .and_then(|v| v.as_str())
                .ok_or_else(|| FlowEngineError::failed("prompt is required"))?;
            let mut out = PortValues::new();
            out.insert("text".into(), json!(prompt.to_uppercase()));
            Ok(out)
        });

        let handler = registry.get(NodeType::TextGeneration).unwrap();
        let mut inputs = PortValues::new();
        inputs.insert("prompt".into(), json!("hi"));
        let out = handler.execute("t1", NodeType::TextGeneration, inputs).await.unwrap();
        assert_eq!(out["text"], "HI");

        let err = handler
            .execute("t1", NodeType::TextGeneration, PortValues::new())
            .await
            .unwrap_err();
        assert_eq!(err.node_message(), "prompt is required");
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn(NodeType::Upscale, |_, inputs| async move { Ok(inputs) });
        assert!(registry.contains(NodeType::Upscale));

        let previous = registry.register(
            NodeType::Upscale,
            Arc::new(CallbackActionHandler::new(|_, _| async { Ok(PortValues::new()) })),
        );
        assert!(previous.is_some());

        let mut other = HandlerRegistry::new();
        other.register_fn(NodeType::ImageGeneration, |_, inputs| async move { Ok(inputs) });
        registry.merge(other);
        assert_eq!(
            registry.node_types(),
            vec![NodeType::ImageGeneration, NodeType::Upscale]
        );
    }
}
