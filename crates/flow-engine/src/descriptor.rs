//! Static connector declarations for node types
//!
//! A [`NodeConfiguration`] describes what a node type accepts and produces.
//! Configurations are immutable at runtime and held by the
//! [`NodeRegistry`](crate::registry::NodeRegistry).

use serde::{Deserialize, Serialize};

use crate::types::{ConnectorType, HandleId, NodeType, DEFAULT_HANDLE};

/// Category of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// User-provided values (prompts, uploads)
    Input,
    /// Reshape values without external calls
    Modifier,
    /// Call out to an action handler
    Action,
    /// Display results
    Output,
}

/// How a node produces its outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Recomputes from its settings whenever inputs change
    Reactive,
    /// Requires an explicit run
    Manual,
}

/// An input connector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputConnector {
    pub id: HandleId,
    pub label: String,
    pub connector_type: ConnectorType,
    pub required: bool,
    pub accepts_multiple: bool,
    /// Upper bound on edges when `accepts_multiple` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<usize>,
}

impl InputConnector {
    pub fn required(id: impl Into<String>, label: impl Into<String>, connector_type: ConnectorType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            connector_type,
            required: true,
            accepts_multiple: false,
            max_connections: None,
        }
    }

    pub fn optional(id: impl Into<String>, label: impl Into<String>, connector_type: ConnectorType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            connector_type,
            required: false,
            accepts_multiple: false,
            max_connections: None,
        }
    }

    /// Accept more than one incoming edge
    pub fn multiple(mut self) -> Self {
        self.accepts_multiple = true;
        self
    }

    /// Accept at most `max` incoming edges
    pub fn max_connections(mut self, max: usize) -> Self {
        self.accepts_multiple = max > 1;
        self.max_connections = Some(max);
        self
    }
}

/// An output connector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputConnector {
    pub id: HandleId,
    pub label: String,
    pub connector_type: ConnectorType,
}

impl OutputConnector {
    pub fn new(id: impl Into<String>, label: impl Into<String>, connector_type: ConnectorType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            connector_type,
        }
    }
}

/// Two groups of inputs that cannot both be connected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutualExclusion {
    pub first: Vec<HandleId>,
    pub second: Vec<HandleId>,
}

impl MutualExclusion {
    pub fn new<A, B>(first: A, second: B) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        B: IntoIterator,
        B::Item: Into<String>,
    {
        Self {
            first: first.into_iter().map(Into::into).collect(),
            second: second.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the given set of connected handles has members on both sides
    pub fn is_violated_by<'a>(&self, connected: impl Iterator<Item = &'a str> + Clone) -> bool {
        let hits = |group: &[HandleId]| connected.clone().any(|h| group.iter().any(|g| g == h));
        hits(&self.first) && hits(&self.second)
    }
}

/// Static description of a node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfiguration {
    pub node_type: NodeType,
    pub category: NodeCategory,
    pub label: String,
    pub description: String,
    pub inputs: Vec<InputConnector>,
    pub outputs: Vec<OutputConnector>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclusions: Vec<MutualExclusion>,
}

impl NodeConfiguration {
    pub fn new(
        node_type: NodeType,
        category: NodeCategory,
        label: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            node_type,
            category,
            label: label.into(),
            description: description.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            exclusions: Vec::new(),
        }
    }

    pub fn input(mut self, connector: InputConnector) -> Self {
        self.inputs.push(connector);
        self
    }

    pub fn output(mut self, connector: OutputConnector) -> Self {
        self.outputs.push(connector);
        self
    }

    pub fn exclusion(mut self, exclusion: MutualExclusion) -> Self {
        self.exclusions.push(exclusion);
        self
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        match self.category {
            NodeCategory::Action => ExecutionMode::Manual,
            _ => ExecutionMode::Reactive,
        }
    }

    pub fn is_action(&self) -> bool {
        self.category == NodeCategory::Action
    }

    /// Resolve an input handle to its connector
    ///
    /// An explicit handle must match exactly. The implicit `"default"` handle
    /// falls back to the only input when there is exactly one.
    pub fn find_input(&self, handle: &str) -> Option<&InputConnector> {
        resolve(&self.inputs, handle, |c| &c.id)
    }

    /// Resolve an output handle to its connector, with the same fallback
    pub fn find_output(&self, handle: &str) -> Option<&OutputConnector> {
        resolve(&self.outputs, handle, |c| &c.id)
    }

    pub fn required_inputs(&self) -> impl Iterator<Item = &InputConnector> {
        self.inputs.iter().filter(|c| c.required)
    }

    pub fn input_label(&self, handle: &str) -> String {
        self.inputs
            .iter()
            .find(|c| c.id == handle)
            .map_or_else(|| handle.to_string(), |c| c.label.clone())
    }
}

fn resolve<'a, T>(items: &'a [T], handle: &str, id: impl Fn(&T) -> &String) -> Option<&'a T> {
    if let Some(found) = items.iter().find(|c| id(c) == handle) {
        return Some(found);
    }
    match items {
        [only] if handle == DEFAULT_HANDLE => Some(only),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NodeConfiguration {
        NodeConfiguration::new(NodeType::Upscale, NodeCategory::Action, "Upscale", "Upscale an image")
            .input(InputConnector::required("image", "Image", ConnectorType::Image))
            .output(OutputConnector::new("image", "Image", ConnectorType::Image))
    }

    #[test]
    fn test_default_handle_resolves_single_connector() {
        let config = sample();
        assert_eq!(config.find_input("default").map(|c| c.id.as_str()), Some("image"));
        assert_eq!(config.find_output("default").map(|c| c.id.as_str()), Some("image"));
        assert!(config.find_input("prompt").is_none());
    }

    #[test]
    fn test_default_handle_ambiguous_with_many_connectors() {
        let config = sample().input(InputConnector::optional("mask", "Mask", ConnectorType::Image));
        assert!(config.find_input("default").is_none());
    }

    #[test]
    fn test_mutual_exclusion() {
        let exclusion = MutualExclusion::new(["first_frame", "last_frame"], ["reference_images"]);
        assert!(!exclusion.is_violated_by(["first_frame", "last_frame"].into_iter()));
        assert!(exclusion.is_violated_by(["last_frame", "reference_images"].into_iter()));
    }

    #[test]
    fn test_max_connections_implies_multiple() {
        let connector = InputConnector::optional("refs", "Refs", ConnectorType::Images).max_connections(3);
        assert!(connector.accepts_multiple);
        assert_eq!(connector.max_connections, Some(3));
    }

    #[test]
    fn test_execution_mode_follows_category() {
        assert_eq!(sample().execution_mode(), ExecutionMode::Manual);
        let prompt = NodeConfiguration::new(NodeType::Prompt, NodeCategory::Input, "Prompt", "");
        assert_eq!(prompt.execution_mode(), ExecutionMode::Reactive);
    }
}
