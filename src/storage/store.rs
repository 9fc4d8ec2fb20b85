//! Chat Store Trait
//!
//! The storage collaborator contract the orchestrator and host bridge call
//! into. Creates must be idempotent-safe against retry of the same id: a
//! duplicate create updates in place and never corrupts message ordering.

use async_trait::async_trait;

use crate::models::chat::{ChatMessage, ChatRecord, ToolCallRecord};
use crate::utils::error::AppResult;

/// Persistent storage for chats, messages, and finalized tool calls.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Create a chat. Upserts by id.
    async fn create_chat(&self, chat: &ChatRecord) -> AppResult<()>;

    /// Fetch a chat by id.
    async fn get_chat(&self, chat_id: &str) -> AppResult<Option<ChatRecord>>;

    /// Rename a chat.
    async fn rename_chat(&self, chat_id: &str, name: &str) -> AppResult<()>;

    /// Persist one message. Upserts by id; retrying the same message never
    /// duplicates it or disturbs ordering.
    async fn create_message(&self, message: &ChatMessage) -> AppResult<()>;

    /// Persist one finalized tool call. Upserts by id.
    async fn create_tool_call(&self, tool_call: &ToolCallRecord) -> AppResult<()>;

    /// Messages of a chat in creation order.
    async fn list_messages(&self, chat_id: &str) -> AppResult<Vec<ChatMessage>>;
}
