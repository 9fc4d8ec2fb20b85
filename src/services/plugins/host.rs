//! Host Bridge
//!
//! The capability API surface handed into sandboxed plugin code. Every call
//! that crosses from plugin code into the host is funneled through
//! `dispatch_host_call`, which catches all failures and rethrows them as one
//! fixed, generic message so a failing host call never leaks internal
//! diagnostic detail into plugin code.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{ChatMessage, ChatRecord};

use super::registry::{ModelDeclaration, Registrar};

/// The only error text sandboxed code ever observes from a host call.
pub const HOST_BRIDGE_ERROR: &str = "Host call failed";

// ============================================================================
// Notification Types
// ============================================================================

/// Severity of a UI notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

impl Default for NotificationLevel {
    fn default() -> Self {
        Self::Info
    }
}

/// A notification a plugin asks the host UI to display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Short notification title
    pub title: String,
    /// Optional body text
    #[serde(default)]
    pub body: Option<String>,
    /// Severity level
    #[serde(default)]
    pub level: NotificationLevel,
}

// ============================================================================
// Host Bridge Trait
// ============================================================================

/// Arguments for a chat-messages query from plugin code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagesQuery {
    /// Chat to read
    pub chat_id: String,
    /// Maximum number of messages (most recent first when set)
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Host calls reachable from sandboxed plugin code.
///
/// Implementations return their internal failure detail as `String`; the
/// dispatch layer discards it and plugin code sees only
/// [`HOST_BRIDGE_ERROR`]. The trait is synchronous because it is invoked on
/// a plugin's dedicated interpreter thread.
pub trait HostBridge: Send + Sync {
    /// Resolve a model capability's metadata by namespaced id.
    fn get_llm(&self, namespaced_id: &str) -> Result<ModelDeclaration, String>;

    /// Ask the UI to display a notification.
    fn show_notification(&self, notification: Notification) -> Result<(), String>;

    /// Fetch a chat by id.
    fn get_chat(&self, chat_id: &str) -> Result<ChatRecord, String>;

    /// Rename a chat.
    fn rename_chat(&self, chat_id: &str, name: &str) -> Result<(), String>;

    /// List messages of a chat.
    fn get_chat_messages(&self, query: ChatMessagesQuery) -> Result<Vec<ChatMessage>, String>;
}

// ============================================================================
// Dispatch
// ============================================================================

/// Route one capability-API call to the bridge (or the plugin's own settings
/// cache) and serialize the result for the JS side.
///
/// Any failure - unknown method, malformed payload, bridge error,
/// serialization error - collapses to `Err(())`; the sandbox converts that
/// into a thrown JS error carrying exactly [`HOST_BRIDGE_ERROR`].
pub(crate) fn dispatch_host_call(
    bridge: &dyn HostBridge,
    registrar: &Registrar,
    method: &str,
    payload: &str,
) -> Result<String, ()> {
    let args: Value = serde_json::from_str(payload).map_err(|_| ())?;

    let result: Value = match method {
        "get_llm" => {
            let id = args.get("id").and_then(|v| v.as_str()).ok_or(())?;
            let declaration = bridge.get_llm(id).map_err(|_| ())?;
            serde_json::to_value(declaration).map_err(|_| ())?
        }
        "show_notification" => {
            let notification: Notification = serde_json::from_value(args).map_err(|_| ())?;
            bridge.show_notification(notification).map_err(|_| ())?;
            Value::Null
        }
        "get_chat" => {
            let id = args.get("id").and_then(|v| v.as_str()).ok_or(())?;
            let chat = bridge.get_chat(id).map_err(|_| ())?;
            serde_json::to_value(chat).map_err(|_| ())?
        }
        "rename_chat" => {
            let id = args.get("id").and_then(|v| v.as_str()).ok_or(())?;
            let name = args.get("name").and_then(|v| v.as_str()).ok_or(())?;
            bridge.rename_chat(id, name).map_err(|_| ())?;
            Value::Null
        }
        "get_chat_messages" => {
            let query: ChatMessagesQuery = serde_json::from_value(args).map_err(|_| ())?;
            let messages = bridge.get_chat_messages(query).map_err(|_| ())?;
            serde_json::to_value(messages).map_err(|_| ())?
        }
        "get_setting" => {
            let id = args.get("id").and_then(|v| v.as_str()).ok_or(())?;
            registrar.cached_setting(id).unwrap_or(Value::Null)
        }
        _ => return Err(()),
    };

    serde_json::to_string(&result).map_err(|_| ())
}

// ============================================================================
// Notification Sink
// ============================================================================

/// Where plugin notifications go. The UI process registers a real sink; the
/// default logs through tracing.
pub trait NotificationSink: Send + Sync {
    /// Deliver one notification.
    fn notify(&self, notification: Notification);
}

/// Default sink that records notifications in the log.
#[derive(Debug, Default)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Info => tracing::info!(
                title = %notification.title,
                body = notification.body.as_deref().unwrap_or(""),
                "plugin notification"
            ),
            NotificationLevel::Warning => tracing::warn!(
                title = %notification.title,
                body = notification.body.as_deref().unwrap_or(""),
                "plugin notification"
            ),
            NotificationLevel::Error => tracing::error!(
                title = %notification.title,
                body = notification.body.as_deref().unwrap_or(""),
                "plugin notification"
            ),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
