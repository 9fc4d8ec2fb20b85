//! Application Host Bridge
//!
//! Production `HostBridge` implementation: chats come from the chat store,
//! notifications go to the registered sink, and model lookups read through
//! the plugin manager's aggregate. Internal failure detail stays on this
//! side of the boundary; the dispatch layer reduces every error to the
//! fixed generic message before plugin code sees it.

use std::sync::{Arc, RwLock, Weak};

use crate::models::chat::{ChatMessage, ChatRecord};
use crate::storage::ChatStore;

use super::host::{ChatMessagesQuery, HostBridge, Notification, NotificationSink};
use super::manager::PluginManager;
use super::registry::ModelDeclaration;

/// Host bridge backed by the app's storage and plugin manager.
pub struct AppHostBridge {
    store: Arc<dyn ChatStore>,
    notifications: Arc<dyn NotificationSink>,
    /// Weak backreference; the manager owns contexts that hold this bridge.
    manager: RwLock<Weak<PluginManager>>,
    runtime: tokio::runtime::Handle,
}

impl std::fmt::Debug for AppHostBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppHostBridge").finish()
    }
}

impl AppHostBridge {
    /// Create a bridge. Must be called from within a tokio runtime; bridge
    /// calls arrive on plugin interpreter threads and block on the captured
    /// handle.
    pub fn new(store: Arc<dyn ChatStore>, notifications: Arc<dyn NotificationSink>) -> Self {
        Self {
            store,
            notifications,
            manager: RwLock::new(Weak::new()),
            runtime: tokio::runtime::Handle::current(),
        }
    }

    /// Point model lookups at the manager. Called once after the manager is
    /// constructed with this bridge.
    pub fn attach_manager(&self, manager: &Arc<PluginManager>) {
        *self.manager.write().expect("manager lock") = Arc::downgrade(manager);
    }

    fn manager(&self) -> Result<Arc<PluginManager>, String> {
        self.manager
            .read()
            .expect("manager lock")
            .upgrade()
            .ok_or_else(|| "plugin manager detached".to_string())
    }
}

impl HostBridge for AppHostBridge {
    fn get_llm(&self, namespaced_id: &str) -> Result<ModelDeclaration, String> {
        let manager = self.manager()?;
        let model = manager
            .get_llm(namespaced_id)
            .ok_or_else(|| format!("model not registered: {namespaced_id}"))?;
        Ok(ModelDeclaration {
            id: model.id().to_string(),
            name: model.name().to_string(),
        })
    }

    fn show_notification(&self, notification: Notification) -> Result<(), String> {
        self.notifications.notify(notification);
        Ok(())
    }

    fn get_chat(&self, chat_id: &str) -> Result<ChatRecord, String> {
        self.runtime
            .block_on(self.store.get_chat(chat_id))
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("chat not found: {chat_id}"))
    }

    fn rename_chat(&self, chat_id: &str, name: &str) -> Result<(), String> {
        self.runtime
            .block_on(self.store.rename_chat(chat_id, name))
            .map_err(|e| e.to_string())
    }

    fn get_chat_messages(&self, query: ChatMessagesQuery) -> Result<Vec<ChatMessage>, String> {
        let mut messages = self
            .runtime
            .block_on(self.store.list_messages(&query.chat_id))
            .map_err(|e| e.to_string())?;
        if let Some(limit) = query.limit {
            if messages.len() > limit {
                messages = messages.split_off(messages.len() - limit);
            }
        }
        Ok(messages)
    }
}

// ============================================================================
// Tests
// ============================================================================
