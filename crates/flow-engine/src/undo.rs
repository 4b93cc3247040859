//! Snapshot history for undo/redo
//!
//! Every recorded state is a zstd-compressed JSON [`WorkflowSnapshot`], so
//! stepping through history swaps whole graphs and no edit needs an inverse.
//! Recording the state that is already current is a no-op.

use crate::constants::defaults;
use crate::error::{FlowEngineError, Result};
use crate::types::WorkflowSnapshot;

const COMPRESSION_LEVEL: i32 = 3;

/// Compressed snapshot bytes
type Frame = Vec<u8>;

/// Bounded undo/redo history
///
/// `present` is the state the graph is in; `past` holds older states with
/// the most recent last, `future` holds undone states with the next redo last.
pub struct UndoStack {
    past: Vec<Frame>,
    present: Option<Frame>,
    future: Vec<Frame>,
    limit: usize,
}

impl UndoStack {
    /// `limit` counts every retained state, the present one included
    pub fn new(limit: usize) -> Self {
        Self {
            past: Vec::new(),
            present: None,
            future: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Record a new present state, dropping anything that could be redone
    ///
    /// Returns `false` when the snapshot equals the present state.
    pub fn push(&mut self, snapshot: &WorkflowSnapshot) -> Result<bool> {
        let frame = compress(snapshot)?;
        if self.present.as_ref() == Some(&frame) {
            return Ok(false);
        }

        self.future.clear();
        if let Some(previous) = self.present.replace(frame) {
            self.past.push(previous);
        }
        let overflow = self.len().saturating_sub(self.limit);
        if overflow > 0 {
            self.past.drain(..overflow);
        }
        Ok(true)
    }

    /// Step back; `None` when there is no older state
    pub fn undo(&mut self) -> Option<Result<WorkflowSnapshot>> {
        let previous = self.past.pop()?;
        if let Some(present) = self.present.replace(previous) {
            self.future.push(present);
        }
        self.current()
    }

    /// Step forward; `None` when nothing has been undone
    pub fn redo(&mut self) -> Option<Result<WorkflowSnapshot>> {
        let next = self.future.pop()?;
        if let Some(present) = self.present.replace(next) {
            self.past.push(present);
        }
        self.current()
    }

    /// The present state
    pub fn current(&self) -> Option<Result<WorkflowSnapshot>> {
        self.present.as_deref().map(decompress)
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Number of retained states
    pub fn len(&self) -> usize {
        self.past.len() + self.future.len() + usize::from(self.present.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.present.is_none()
    }

    pub fn clear(&mut self) {
        self.past.clear();
        self.present = None;
        self.future.clear();
    }

    /// Bytes held across all retained states
    pub fn compressed_size(&self) -> usize {
        self.past
            .iter()
            .chain(self.present.iter())
            .chain(self.future.iter())
            .map(Vec::len)
            .sum()
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(defaults::HISTORY_LIMIT)
    }
}

fn compress(snapshot: &WorkflowSnapshot) -> Result<Frame> {
    let json = serde_json::to_vec(snapshot)?;
    zstd::encode_all(json.as_slice(), COMPRESSION_LEVEL)
        .map_err(|e| FlowEngineError::Compression(e.to_string()))
}

fn decompress(frame: &[u8]) -> Result<WorkflowSnapshot> {
    let json = zstd::decode_all(frame).map_err(|e| FlowEngineError::Compression(e.to_string()))?;
    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::NodeSettings;
    use crate::types::Node;

    fn prompt_graph(text: &str) -> WorkflowSnapshot {
        WorkflowSnapshot {
            nodes: vec![Node::with_settings("p1", NodeSettings::prompt(text))],
            edges: Vec::new(),
        }
    }

    fn prompt_of(step: Option<Result<WorkflowSnapshot>>) -> NodeSettings {
        step.unwrap().unwrap().nodes[0].data.settings.clone()
    }

    #[test]
    fn test_undo_walks_back_to_oldest() {
        let mut history = UndoStack::new(10);
        for text in ["a cat", "a cat on a roof", "a cat on a roof at night"] {
            assert!(history.push(&prompt_graph(text)).unwrap());
        }

        assert_eq!(prompt_of(history.current()), NodeSettings::prompt("a cat on a roof at night"));
        assert_eq!(prompt_of(history.undo()), NodeSettings::prompt("a cat on a roof"));
        assert_eq!(prompt_of(history.undo()), NodeSettings::prompt("a cat"));
        assert!(history.undo().is_none());
        assert_eq!(prompt_of(history.current()), NodeSettings::prompt("a cat"));
    }

    #[test]
    fn test_new_edit_discards_redo() {
        let mut history = UndoStack::new(10);
        history.push(&prompt_graph("dawn")).unwrap();
        history.push(&prompt_graph("dusk")).unwrap();
        history.undo();

        assert_eq!(prompt_of(history.redo()), NodeSettings::prompt("dusk"));
        assert!(history.redo().is_none());

        history.undo();
        history.push(&prompt_graph("noon")).unwrap();
        assert!(!history.can_redo());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_unchanged_state_is_not_recorded() {
        let mut history = UndoStack::new(10);
        assert!(history.push(&prompt_graph("same")).unwrap());
        assert!(!history.push(&prompt_graph("same")).unwrap());
        assert_eq!(history.len(), 1);
        assert!(!history.can_undo());
    }

    #[test]
    fn test_limit_drops_oldest() {
        let mut history = UndoStack::new(3);
        for i in 0..5 {
            history.push(&prompt_graph(&format!("take {}", i))).unwrap();
        }

        assert_eq!(history.len(), 3);
        assert_eq!(prompt_of(history.undo()), NodeSettings::prompt("take 3"));
        assert_eq!(prompt_of(history.undo()), NodeSettings::prompt("take 2"));
        assert!(!history.can_undo());
        assert!(history.compressed_size() > 0);

        history.clear();
        assert!(history.is_empty());
        assert!(history.current().is_none());
    }
}
