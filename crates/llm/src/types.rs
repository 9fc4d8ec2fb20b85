//! LLM Request/Response Types
//!
//! Prompt message types, tool definitions, and the LLM error taxonomy shared
//! by every model capability.

use serde::{Deserialize, Serialize};

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A single content block within a prompt message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    /// Plain text content
    Text { text: String },
    /// Tool use request from the assistant
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// Tool result from execution
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender
    pub role: MessageRole,
    /// Message content (can be multiple blocks)
    pub content: Vec<MessageContent>,
}

impl Message {
    /// Create a simple text message
    pub fn text(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![MessageContent::Text { text: text.into() }],
        }
    }

    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::text(MessageRole::User, text)
    }

    /// Create an assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(MessageRole::Assistant, text)
    }

    /// Create a system message
    pub fn system(text: impl Into<String>) -> Self {
        Self::text(MessageRole::System, text)
    }

    /// Create a tool result message
    pub fn tool_result(
        tool_use_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self {
            role: MessageRole::User,
            content: vec![MessageContent::ToolResult {
                tool_use_id: tool_use_id.into(),
                content: content.into(),
                is_error: if is_error { Some(true) } else { None },
            }],
        }
    }

    /// Concatenated text of all `Text` blocks in this message.
    pub fn plain_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                MessageContent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Definition of a tool that can be called by the model.
///
/// `name` carries the namespaced id (`plugin:local`); the schema is an
/// opaque JSON Schema document declared by the contributing plugin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    /// Namespaced tool id
    pub name: String,
    /// Description of what the tool does
    pub description: String,
    /// JSON schema for the tool's input parameters
    pub input_schema: serde_json::Value,
}

/// Error types for model capability operations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LlmError {
    /// Model not found or not available
    ModelNotFound { model: String },
    /// Invalid request (bad parameters)
    InvalidRequest { message: String },
    /// The model capability's implementation failed
    InvocationFailed { message: String },
    /// Response parsing error
    ParseError { message: String },
    /// The turn was cancelled before completing
    Cancelled,
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmError::ModelNotFound { model } => write!(f, "Model not found: {}", model),
            LlmError::InvalidRequest { message } => write!(f, "Invalid request: {}", message),
            LlmError::InvocationFailed { message } => {
                write!(f, "Model invocation failed: {}", message)
            }
            LlmError::ParseError { message } => write!(f, "Parse error: {}", message),
            LlmError::Cancelled => write!(f, "Turn cancelled"),
        }
    }
}

impl std::error::Error for LlmError {}

/// Result type alias for model capability operations
pub type LlmResult<T> = Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let msg = Message::user("hello");
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.plain_text(), "hello");

        let msg = Message::system("you are helpful");
        assert_eq!(msg.role, MessageRole::System);

        let msg = Message::assistant("hi there");
        assert_eq!(msg.role, MessageRole::Assistant);
    }

    #[test]
    fn test_tool_result_message() {
        let msg = Message::tool_result("call-1", "42", false);
        assert_eq!(msg.role, MessageRole::User);
        match &msg.content[0] {
            MessageContent::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                assert_eq!(tool_use_id, "call-1");
                assert_eq!(content, "42");
                assert!(is_error.is_none());
            }
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[test]
    fn test_tool_result_error_flag() {
        let msg = Message::tool_result("call-2", "boom", true);
        match &msg.content[0] {
            MessageContent::ToolResult { is_error, .. } => assert_eq!(*is_error, Some(true)),
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[test]
    fn test_plain_text_skips_non_text_blocks() {
        let msg = Message {
            role: MessageRole::Assistant,
            content: vec![
                MessageContent::Text {
                    text: "before ".to_string(),
                },
                MessageContent::ToolUse {
                    id: "c1".to_string(),
                    name: "web:search".to_string(),
                    input: serde_json::json!({}),
                },
                MessageContent::Text {
                    text: "after".to_string(),
                },
            ],
        };
        assert_eq!(msg.plain_text(), "before after");
    }

    #[test]
    fn test_tool_definition_serialization() {
        let def = ToolDefinition {
            name: "calc:add".to_string(),
            description: "Adds two numbers".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
                "required": ["a", "b"]
            }),
        };
        let json = serde_json::to_string(&def).unwrap();
        let parsed: ToolDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, def);
    }

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::ModelNotFound {
            model: "acme:gpt".to_string(),
        };
        assert_eq!(err.to_string(), "Model not found: acme:gpt");

        let err = LlmError::InvocationFailed {
            message: "connection reset".to_string(),
        };
        assert!(err.to_string().contains("connection reset"));

        assert_eq!(LlmError::Cancelled.to_string(), "Turn cancelled");
    }

    #[test]
    fn test_message_role_serialization() {
        let json = serde_json::to_string(&MessageRole::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }
}
