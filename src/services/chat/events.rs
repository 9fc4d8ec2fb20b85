//! Chat Events
//!
//! Notifications the orchestrator broadcasts while a generation runs. The
//! UI process subscribes to display optimistic messages, streaming updates,
//! completion, and rollbacks.

use crate::models::chat::{ChatMessage, ContentNode};

/// A change notification from the chat orchestrator.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A message was created (optimistic, before the model responds)
    MessageCreated { message: ChatMessage },
    /// The in-flight assistant transcript changed
    TranscriptUpdated {
        chat_id: String,
        message_id: String,
        nodes: Vec<ContentNode>,
    },
    /// An assistant message reached `complete`
    MessageCompleted { chat_id: String, message_id: String },
    /// Provisional messages were rolled back after a generation failure
    MessagesRetracted {
        chat_id: String,
        message_ids: Vec<String>,
    },
}
