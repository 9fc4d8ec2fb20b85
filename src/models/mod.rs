//! Data Models
//!
//! Plain data types shared across the runtime core.

pub mod chat;
pub mod plugin;

pub use chat::{
    ChatMessage, ChatRecord, ChatRole, ContentNode, MessageStatus, ToolCallRecord, ToolCallStatus,
};
pub use plugin::{
    namespaced_id, split_namespaced_id, PluginAuthor, PluginInfo, PluginManifest, PluginRecord,
};
