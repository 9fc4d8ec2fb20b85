//! Prompt Assembly
//!
//! Builds the prompt-message sequence for one generation: system prompt
//! first, then prior history, then the new user text.

use colloquy_llm::{Message, MessageRole};

use crate::models::chat::{ChatMessage, ChatRole};

/// System prompt used when the app supplies none.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant inside a desktop chat \
application. Use the provided tools when they help answer the user's request, and reply \
concisely.";

/// Build the full prompt sequence for a new generation.
pub fn build_prompt(system_prompt: &str, history: &[ChatMessage], user_text: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(system_prompt));

    for message in history {
        let text = message.plain_text();
        if text.is_empty() {
            continue;
        }
        let role = match message.role {
            ChatRole::User => MessageRole::User,
            ChatRole::Assistant => MessageRole::Assistant,
        };
        messages.push(Message::text(role, text));
    }

    messages.push(Message::user(user_text));
    messages
}
