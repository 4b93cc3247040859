//! Node type registry
//!
//! Maps each [`NodeType`] to its static [`NodeConfiguration`]. The built-in
//! catalog is produced by [`configuration_of`], an exhaustive match over the
//! closed node type enum, so a type without a configuration does not compile.
//!
//! # Composability
//!
//! Hosts can narrow or override the catalog:
//! ```ignore
//! let mut registry = NodeRegistry::with_builtins();
//! registry.remove(NodeType::Preview);       // hide from the palette
//! registry.merge(custom_registry);          // override labels or limits
//! ```

use std::collections::HashMap;

use crate::constants::limits;
use crate::descriptor::{
    InputConnector, MutualExclusion, NodeCategory, NodeConfiguration, OutputConnector,
};
use crate::types::{ConnectorType, NodeType};

/// Registry of node configurations
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    entries: HashMap<NodeType, NodeConfiguration>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registry holding every built-in node type
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for node_type in NodeType::ALL {
            registry.register(configuration_of(node_type));
        }
        registry
    }

    /// Register a configuration, replacing any previous one for the type
    pub fn register(&mut self, config: NodeConfiguration) {
        self.entries.insert(config.node_type, config);
    }

    pub fn remove(&mut self, node_type: NodeType) -> Option<NodeConfiguration> {
        self.entries.remove(&node_type)
    }

    /// Get the configuration for a node type
    pub fn get(&self, node_type: NodeType) -> Option<&NodeConfiguration> {
        self.entries.get(&node_type)
    }

    pub fn contains(&self, node_type: NodeType) -> bool {
        self.entries.contains_key(&node_type)
    }

    /// All configurations in palette order
    pub fn all(&self) -> Vec<&NodeConfiguration> {
        NodeType::ALL
            .iter()
            .filter_map(|t| self.entries.get(t))
            .collect()
    }

    /// Configurations grouped by category
    pub fn by_category(&self) -> HashMap<NodeCategory, Vec<&NodeConfiguration>> {
        let mut grouped: HashMap<NodeCategory, Vec<&NodeConfiguration>> = HashMap::new();
        for config in self.all() {
            grouped.entry(config.category).or_default().push(config);
        }
        grouped
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override entries in `self` for the same type.
    pub fn merge(&mut self, other: NodeRegistry) {
        self.entries.extend(other.entries);
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Built-in configuration for a node type
pub fn configuration_of(node_type: NodeType) -> NodeConfiguration {
    use ConnectorType::*;

    match node_type {
        NodeType::Prompt => NodeConfiguration::new(
            node_type,
            NodeCategory::Input,
            "Prompt",
            "Free text used to drive generation",
        )
        .output(OutputConnector::new("prompt", "Prompt", Text)),

        NodeType::ImageUpload => NodeConfiguration::new(
            node_type,
            NodeCategory::Input,
            "Image Upload",
            "An image supplied by the user",
        )
        .output(OutputConnector::new("image", "Image", Image)),

        NodeType::Format => NodeConfiguration::new(
            node_type,
            NodeCategory::Modifier,
            "Format",
            "Aspect ratio, duration and audio settings for generation",
        )
        .output(OutputConnector::new("format", "Format", Format)),

        NodeType::PromptConcatenator => NodeConfiguration::new(
            node_type,
            NodeCategory::Modifier,
            "Prompt Concatenator",
            "Joins several prompts into one",
        )
        .input(InputConnector::required("prompts", "Prompts", Text).multiple())
        .output(OutputConnector::new("prompt", "Prompt", Text)),

        NodeType::ImageGeneration => NodeConfiguration::new(
            node_type,
            NodeCategory::Action,
            "Image Generation",
            "Generates images from a prompt and optional references",
        )
        .input(InputConnector::required("prompt", "Prompt", Text))
        .input(
            InputConnector::optional("reference_images", "Reference Images", Images)
                .max_connections(limits::MAX_IMAGE_REFERENCES),
        )
        .input(InputConnector::optional("format", "Format", Format))
        .output(OutputConnector::new("images", "Images", Images)),

        NodeType::VideoGeneration => NodeConfiguration::new(
            node_type,
            NodeCategory::Action,
            "Video Generation",
            "Generates a video from a prompt, frames or references",
        )
        .input(InputConnector::required("prompt", "Prompt", Text))
        .input(InputConnector::optional("first_frame", "First Frame", Image))
        .input(InputConnector::optional("last_frame", "Last Frame", Image))
        .input(
            InputConnector::optional("reference_images", "Reference Images", Images)
                .max_connections(limits::MAX_VIDEO_REFERENCES),
        )
        .input(InputConnector::optional("format", "Format", Format))
        .output(OutputConnector::new("video", "Video", Video))
        .exclusion(MutualExclusion::new(
            ["first_frame", "last_frame"],
            ["reference_images"],
        )),

        NodeType::TextGeneration => NodeConfiguration::new(
            node_type,
            NodeCategory::Action,
            "Text Generation",
            "Generates text from a prompt",
        )
        .input(InputConnector::required("prompt", "Prompt", Text))
        .input(InputConnector::optional("system_prompt", "System Prompt", Text))
        .input(InputConnector::optional("context", "Context", Text).multiple())
        .output(OutputConnector::new("text", "Text", Text)),

        NodeType::Upscale => NodeConfiguration::new(
            node_type,
            NodeCategory::Action,
            "Upscale",
            "Increases the resolution of an image",
        )
        .input(InputConnector::required("image", "Image", Image))
        .output(OutputConnector::new("image", "Image", Image)),

        NodeType::ImageOutput => NodeConfiguration::new(
            node_type,
            NodeCategory::Output,
            "Image Output",
            "Displays generated images",
        )
        .input(InputConnector::optional("images", "Images", Images).multiple()),

        NodeType::VideoOutput => NodeConfiguration::new(
            node_type,
            NodeCategory::Output,
            "Video Output",
            "Displays a generated video",
        )
        .input(InputConnector::optional("video", "Video", Video)),

        NodeType::TextOutput => NodeConfiguration::new(
            node_type,
            NodeCategory::Output,
            "Text Output",
            "Displays generated text",
        )
        .input(InputConnector::optional("text", "Text", Text)),

        NodeType::Preview => NodeConfiguration::new(
            node_type,
            NodeCategory::Output,
            "Preview",
            "Shows whatever value reaches it",
        )
        .input(InputConnector::optional("value", "Value", Any)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_node_type_has_configuration() {
        let registry = NodeRegistry::with_builtins();
        for node_type in NodeType::ALL {
            let config = registry
                .get(node_type)
                .unwrap_or_else(|| panic!("missing configuration for {}", node_type));
            assert_eq!(config.node_type, node_type);
        }
        assert_eq!(registry.all().len(), NodeType::ALL.len());
    }

    #[test]
    fn test_by_category() {
        let registry = NodeRegistry::with_builtins();
        let grouped = registry.by_category();
        let actions: Vec<NodeType> = grouped[&NodeCategory::Action]
            .iter()
            .map(|c| c.node_type)
            .collect();
        assert_eq!(
            actions,
            vec![
                NodeType::ImageGeneration,
                NodeType::VideoGeneration,
                NodeType::TextGeneration,
                NodeType::Upscale,
            ]
        );
        assert_eq!(grouped[&NodeCategory::Output].len(), 4);
    }

    #[test]
    fn test_remove_and_merge() {
        let mut registry = NodeRegistry::with_builtins();
        assert!(registry.remove(NodeType::Preview).is_some());
        assert!(!registry.contains(NodeType::Preview));

        let mut extra = NodeRegistry::new();
        let mut preview = configuration_of(NodeType::Preview);
        preview.label = "Inspector".into();
        extra.register(preview);
        registry.merge(extra);

        assert_eq!(registry.get(NodeType::Preview).map(|c| c.label.as_str()), Some("Inspector"));
    }

    #[test]
    fn test_video_generation_declares_exclusion() {
        let config = configuration_of(NodeType::VideoGeneration);
        assert_eq!(config.exclusions.len(), 1);
        let refs = config.find_input("reference_images").unwrap();
        assert_eq!(refs.max_connections, Some(limits::MAX_VIDEO_REFERENCES));
        assert!(refs.accepts_multiple);
    }
}
