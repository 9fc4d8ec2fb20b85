//! Chat Data Models
//!
//! Message and content-node types composing a chat transcript.
//!
//! ## Key Types
//!
//! - `ChatRecord` - a chat aggregate (id + name)
//! - `ChatMessage` - one user or assistant message with ordered content nodes
//! - `ContentNode` - tagged union of text, markdown, and tool-call nodes
//! - `ToolCallRecord` - a dispatched tool call, finalized exactly once
//! - `ToolCallStatus` - pending -> success | error, never backward

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Chat
// ============================================================================

/// A chat aggregate. Messages reference it by `chat_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRecord {
    /// Unique chat id
    pub id: String,
    /// User-visible chat name
    pub name: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl ChatRecord {
    /// Create a new chat with a generated id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// Message
// ============================================================================

/// Role of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

/// Completion status of an assistant message.
///
/// User messages carry no status; assistant messages are `Pending` while a
/// generation streams into them and `Complete` once finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Complete,
}

/// One message in a chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Unique message id
    pub id: String,
    /// Owning chat
    pub chat_id: String,
    /// Who authored the message
    pub role: ChatRole,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Completion status (assistant messages only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    /// Ordered content nodes composing the message body
    pub content: Vec<ContentNode>,
}

impl ChatMessage {
    /// Create a user message with a single text node.
    pub fn user(chat_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            chat_id: chat_id.into(),
            role: ChatRole::User,
            created_at: Utc::now(),
            status: None,
            content: vec![ContentNode::text(text)],
        }
    }

    /// Create an empty pending assistant message.
    pub fn assistant_pending(chat_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            chat_id: chat_id.into(),
            role: ChatRole::Assistant,
            created_at: Utc::now(),
            status: Some(MessageStatus::Pending),
            content: Vec::new(),
        }
    }

    /// Concatenated text of all text-kind nodes.
    pub fn plain_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|node| match node {
                ContentNode::Text { text } => Some(text.as_str()),
                ContentNode::Markdown { content } => Some(content.as_str()),
                ContentNode::ToolCall { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

// ============================================================================
// Content Nodes
// ============================================================================

/// Terminal status of a tool call embedded in a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Pending,
    Success,
    Error,
}

/// One node in a message transcript.
///
/// Consecutive streamed nodes of the same text kind are merged by the
/// transcript model rather than appended as siblings; a `ToolCall` node
/// always starts a new node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentNode {
    /// Plain text fragment
    Text { text: String },
    /// Markdown fragment
    Markdown { content: String },
    /// An embedded tool call and its (eventual) outcome
    ToolCall {
        /// Namespaced tool id (`plugin:local`)
        tool_id: String,
        /// Unique id of this call
        call_id: String,
        /// Arguments the model supplied
        arguments: serde_json::Value,
        /// pending -> success | error, never backward
        status: ToolCallStatus,
        /// Tool output (success only)
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        /// Failure message (error only)
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl ContentNode {
    /// Create a text node.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create a markdown node.
    pub fn markdown(content: impl Into<String>) -> Self {
        Self::Markdown {
            content: content.into(),
        }
    }

    /// Create a pending tool-call node.
    pub fn tool_call_pending(
        tool_id: impl Into<String>,
        call_id: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self::ToolCall {
            tool_id: tool_id.into(),
            call_id: call_id.into(),
            arguments,
            status: ToolCallStatus::Pending,
            result: None,
            error: None,
        }
    }

    /// Whether this node is a text-kind node (text or markdown).
    pub fn is_text_kind(&self) -> bool {
        matches!(self, Self::Text { .. } | Self::Markdown { .. })
    }
}

// ============================================================================
// Tool Calls
// ============================================================================

/// A dispatched tool call, tracked independently of its transcript node so
/// it can be persisted after finalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRecord {
    /// Unique id of this call
    pub id: String,
    /// Namespaced tool id
    pub tool_id: String,
    /// Arguments the model supplied
    pub arguments: serde_json::Value,
    /// pending -> success | error
    pub status: ToolCallStatus,
    /// Tool output (success only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Failure message (error only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCallRecord {
    /// Create a pending record with a fresh id.
    pub fn pending(tool_id: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tool_id: tool_id.into(),
            arguments,
            status: ToolCallStatus::Pending,
            result: None,
            error: None,
        }
    }

    /// Finalize as a success. Later finalization attempts are ignored.
    pub fn finalize_success(&mut self, result: impl Into<String>) {
        if self.status != ToolCallStatus::Pending {
            return;
        }
        self.status = ToolCallStatus::Success;
        self.result = Some(result.into());
    }

    /// Finalize as an error. Later finalization attempts are ignored.
    pub fn finalize_error(&mut self, error: Option<String>) {
        if self.status != ToolCallStatus::Pending {
            return;
        }
        self.status = ToolCallStatus::Error;
        self.error = error;
    }

    /// Whether this call has reached a terminal status.
    pub fn is_finalized(&self) -> bool {
        self.status != ToolCallStatus::Pending
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_shape() {
        let msg = ChatMessage::user("chat-1", "hello");
        assert_eq!(msg.role, ChatRole::User);
        assert!(msg.status.is_none());
        assert_eq!(msg.content.len(), 1);
        assert_eq!(msg.plain_text(), "hello");
    }

    #[test]
    fn test_assistant_pending_shape() {
        let msg = ChatMessage::assistant_pending("chat-1");
        assert_eq!(msg.role, ChatRole::Assistant);
        assert_eq!(msg.status, Some(MessageStatus::Pending));
        assert!(msg.content.is_empty());
    }

    #[test]
    fn test_plain_text_skips_tool_calls() {
        let mut msg = ChatMessage::assistant_pending("chat-1");
        msg.content.push(ContentNode::text("a"));
        msg.content.push(ContentNode::tool_call_pending(
            "web:search",
            "call-1",
            serde_json::json!({}),
        ));
        msg.content.push(ContentNode::markdown("b"));
        assert_eq!(msg.plain_text(), "ab");
    }

    #[test]
    fn test_content_node_is_text_kind() {
        assert!(ContentNode::text("x").is_text_kind());
        assert!(ContentNode::markdown("x").is_text_kind());
        assert!(
            !ContentNode::tool_call_pending("t", "c", serde_json::json!({})).is_text_kind()
        );
    }

    #[test]
    fn test_tool_call_finalize_success() {
        let mut call = ToolCallRecord::pending("calc:add", serde_json::json!({"a": 1}));
        assert!(!call.is_finalized());

        call.finalize_success("2");
        assert_eq!(call.status, ToolCallStatus::Success);
        assert_eq!(call.result.as_deref(), Some("2"));
        assert!(call.is_finalized());
    }

    #[test]
    fn test_tool_call_finalize_error() {
        let mut call = ToolCallRecord::pending("calc:add", serde_json::json!({}));
        call.finalize_error(Some("Invalid arguments".to_string()));
        assert_eq!(call.status, ToolCallStatus::Error);
        assert_eq!(call.error.as_deref(), Some("Invalid arguments"));
    }

    #[test]
    fn test_tool_call_status_never_moves_backward() {
        let mut call = ToolCallRecord::pending("calc:add", serde_json::json!({}));
        call.finalize_success("done");

        // A second finalization must not overwrite the terminal state.
        call.finalize_error(Some("late failure".to_string()));
        assert_eq!(call.status, ToolCallStatus::Success);
        assert_eq!(call.result.as_deref(), Some("done"));
        assert!(call.error.is_none());
    }

    #[test]
    fn test_content_node_serialization() {
        let node = ContentNode::tool_call_pending("web:search", "call-9", serde_json::json!({"q": "x"}));
        let json = serde_json::to_string(&node).unwrap();
        assert!(json.contains("\"type\":\"tool_call\""));
        assert!(json.contains("\"status\":\"pending\""));
        assert!(!json.contains("\"result\"")); // None skipped

        let parsed: ContentNode = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, node);
    }

    #[test]
    fn test_chat_record_new() {
        let chat = ChatRecord::new("Untitled");
        assert!(!chat.id.is_empty());
        assert_eq!(chat.name, "Untitled");
    }
}
