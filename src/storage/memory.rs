//! In-Memory Chat Store
//!
//! A `ChatStore` kept entirely in memory. Used by tests and by ephemeral
//! sessions that should leave nothing on disk.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::models::chat::{ChatMessage, ChatRecord, ToolCallRecord};
use crate::storage::store::ChatStore;
use crate::utils::error::{AppError, AppResult};

#[derive(Default)]
struct MemoryState {
    chats: HashMap<String, ChatRecord>,
    /// Messages in creation order; upserts edit in place.
    messages: Vec<ChatMessage>,
    tool_calls: HashMap<String, ToolCallRecord>,
}

/// In-memory chat store.
#[derive(Default)]
pub struct InMemoryChatStore {
    state: Mutex<MemoryState>,
}

impl std::fmt::Debug for InMemoryChatStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().expect("store lock");
        f.debug_struct("InMemoryChatStore")
            .field("chats", &state.chats.len())
            .field("messages", &state.messages.len())
            .field("tool_calls", &state.tool_calls.len())
            .finish()
    }
}

impl InMemoryChatStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted tool calls.
    pub fn tool_call_count(&self) -> usize {
        self.state.lock().expect("store lock").tool_calls.len()
    }

    /// A persisted tool call by id.
    pub fn get_tool_call(&self, id: &str) -> Option<ToolCallRecord> {
        self.state
            .lock()
            .expect("store lock")
            .tool_calls
            .get(id)
            .cloned()
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn create_chat(&self, chat: &ChatRecord) -> AppResult<()> {
        self.state
            .lock()
            .expect("store lock")
            .chats
            .insert(chat.id.clone(), chat.clone());
        Ok(())
    }

    async fn get_chat(&self, chat_id: &str) -> AppResult<Option<ChatRecord>> {
        Ok(self
            .state
            .lock()
            .expect("store lock")
            .chats
            .get(chat_id)
            .cloned())
    }

    async fn rename_chat(&self, chat_id: &str, name: &str) -> AppResult<()> {
        let mut state = self.state.lock().expect("store lock");
        match state.chats.get_mut(chat_id) {
            Some(chat) => {
                chat.name = name.to_string();
                Ok(())
            }
            None => Err(AppError::not_found(format!("chat {chat_id}"))),
        }
    }

    async fn create_message(&self, message: &ChatMessage) -> AppResult<()> {
        let mut state = self.state.lock().expect("store lock");
        // Upsert in place so a retried create keeps its position.
        if let Some(existing) = state.messages.iter_mut().find(|m| m.id == message.id) {
            *existing = message.clone();
        } else {
            state.messages.push(message.clone());
        }
        Ok(())
    }

    async fn create_tool_call(&self, tool_call: &ToolCallRecord) -> AppResult<()> {
        self.state
            .lock()
            .expect("store lock")
            .tool_calls
            .insert(tool_call.id.clone(), tool_call.clone());
        Ok(())
    }

    async fn list_messages(&self, chat_id: &str) -> AppResult<Vec<ChatMessage>> {
        Ok(self
            .state
            .lock()
            .expect("store lock")
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_message_upsert_keeps_order() {
        let store = InMemoryChatStore::new();
        let first = ChatMessage::user("c1", "first");
        let second = ChatMessage::user("c1", "second");
        store.create_message(&first).await.unwrap();
        store.create_message(&second).await.unwrap();
        store.create_message(&first).await.unwrap();

        let messages = store.list_messages("c1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].plain_text(), "first");
    }

    #[tokio::test]
    async fn test_chat_rename() {
        let store = InMemoryChatStore::new();
        let chat = ChatRecord::new("Old");
        store.create_chat(&chat).await.unwrap();
        store.rename_chat(&chat.id, "New").await.unwrap();
        assert_eq!(store.get_chat(&chat.id).await.unwrap().unwrap().name, "New");
        assert!(store.rename_chat("ghost", "x").await.is_err());
    }
}
