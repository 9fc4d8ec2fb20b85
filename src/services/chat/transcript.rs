//! Message Transcript Model
//!
//! Ordered, mutably-addressable sequence of content nodes composing one chat
//! message's body. Streamed text coalesces into the trailing node of the
//! same kind; every mutation synchronously notifies subscribers with a deep
//! copy of the node sequence, so no consumer ever holds a mutable alias.

use crate::models::chat::{ContentNode, ToolCallStatus};

/// Synchronous transcript-changed subscriber. Receives its own copy of the
/// node sequence on every mutation.
pub type TranscriptListener = Box<dyn Fn(Vec<ContentNode>) + Send + Sync>;

/// The transcript of one in-flight message.
#[derive(Default)]
pub struct MessageTranscript {
    nodes: Vec<ContentNode>,
    listeners: Vec<TranscriptListener>,
}

impl std::fmt::Debug for MessageTranscript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageTranscript")
            .field("nodes", &self.nodes)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl MessageTranscript {
    /// Create an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transcript seeded with existing nodes.
    pub fn from_nodes(nodes: Vec<ContentNode>) -> Self {
        Self {
            nodes,
            listeners: Vec::new(),
        }
    }

    /// Subscribe to transcript changes.
    pub fn on_change(&mut self, listener: TranscriptListener) {
        self.listeners.push(listener);
    }

    /// Node at `index`, if any.
    pub fn get_node(&self, index: usize) -> Option<&ContentNode> {
        self.nodes.get(index)
    }

    /// All nodes, in order.
    pub fn get_nodes(&self) -> &[ContentNode] {
        &self.nodes
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the transcript is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Consume the transcript, returning its nodes.
    pub fn into_nodes(self) -> Vec<ContentNode> {
        self.nodes
    }

    /// Concatenated text of all text-kind nodes.
    pub fn plain_text(&self) -> String {
        self.nodes
            .iter()
            .filter_map(|node| match node {
                ContentNode::Text { text } => Some(text.as_str()),
                ContentNode::Markdown { content } => Some(content.as_str()),
                ContentNode::ToolCall { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Append a node, coalescing streamed text: if `node` and the trailing
    /// node are the same text kind, their content is concatenated instead of
    /// pushing a sibling. Any other node kind always starts a new node.
    pub fn append_node(&mut self, node: ContentNode) {
        match (self.nodes.last_mut(), &node) {
            (Some(ContentNode::Text { text }), ContentNode::Text { text: incoming }) => {
                text.push_str(incoming);
            }
            (
                Some(ContentNode::Markdown { content }),
                ContentNode::Markdown { content: incoming },
            ) => {
                content.push_str(incoming);
            }
            _ => self.nodes.push(node),
        }
        self.notify();
    }

    /// Insert a node at the front.
    pub fn prepend_node(&mut self, node: ContentNode) {
        self.nodes.insert(0, node);
        self.notify();
    }

    /// Replace the node at `index` with one or more nodes. Out-of-range
    /// indices are ignored. Returns whether a replacement happened.
    pub fn replace_node_at(&mut self, index: usize, nodes: Vec<ContentNode>) -> bool {
        if index >= self.nodes.len() {
            return false;
        }
        self.nodes.splice(index..=index, nodes);
        self.notify();
        true
    }

    /// Remove and return the node at `index`, if in range.
    pub fn remove_node_at(&mut self, index: usize) -> Option<ContentNode> {
        if index >= self.nodes.len() {
            return None;
        }
        let removed = self.nodes.remove(index);
        self.notify();
        Some(removed)
    }

    /// Remove the first node equal to `node`. Returns whether one was
    /// removed.
    pub fn remove_node(&mut self, node: &ContentNode) -> bool {
        let Some(index) = self.nodes.iter().position(|n| n == node) else {
            return false;
        };
        self.nodes.remove(index);
        self.notify();
        true
    }

    /// Write a terminal status back into the tool-call node with `call_id`.
    ///
    /// The pending -> terminal transition happens at most once; a node
    /// already finalized is left untouched. Returns whether the node was
    /// updated.
    pub fn finalize_tool_call(
        &mut self,
        call_id: &str,
        status: ToolCallStatus,
        result: Option<String>,
        error: Option<String>,
    ) -> bool {
        let updated = self.nodes.iter_mut().any(|node| match node {
            ContentNode::ToolCall {
                call_id: id,
                status: node_status,
                result: node_result,
                error: node_error,
                ..
            } if id == call_id && *node_status == ToolCallStatus::Pending => {
                *node_status = status;
                *node_result = result.clone();
                *node_error = error.clone();
                true
            }
            _ => false,
        });
        if updated {
            self.notify();
        }
        updated
    }

    fn notify(&self) {
        for listener in &self.listeners {
            listener(self.nodes.clone());
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
