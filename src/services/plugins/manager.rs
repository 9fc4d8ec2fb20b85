//! Plugin Manager
//!
//! Owns the set of all plugin contexts and aggregates their capabilities
//! under namespaced ids. The manager keeps no independent capability state:
//! every aggregate map is re-derived from the owned contexts on demand, so
//! consumers always see the capability set as it exists at the moment of the
//! read. Change notifications (`plugin:added`, `plugin:removed`, and any
//! context's `state:changed`) flow through one shared broadcast channel that
//! the orchestrator and UI subscribe to.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;

use colloquy_llm::{LanguageModel, ToolDefinition};

use crate::models::plugin::{namespaced_id, split_namespaced_id, PluginInfo, PluginRecord};

use super::context::PluginContext;
use super::error::{PluginError, PluginResult};
use super::events::PluginEvent;
use super::host::HostBridge;
use super::registry::{
    RegisteredCommand, RegisteredTool, RendererDeclaration, SettingDeclaration,
};

/// Capacity of the shared plugin event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Aggregator over all loaded plugin contexts.
pub struct PluginManager {
    contexts: RwLock<Vec<Arc<PluginContext>>>,
    events: broadcast::Sender<PluginEvent>,
    bridge: Arc<dyn HostBridge>,
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("plugins", &self.contexts.read().expect("contexts lock").len())
            .finish()
    }
}

impl PluginManager {
    /// Create an empty manager. Plugins are added with `add_plugin`.
    pub fn new(bridge: Arc<dyn HostBridge>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            contexts: RwLock::new(Vec::new()),
            events,
            bridge,
        }
    }

    /// Subscribe to plugin runtime events.
    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.events.subscribe()
    }

    /// Add (or replace) a plugin from its record.
    ///
    /// A load failure is logged and surfaced, and the record is kept as an
    /// unloaded context so the plugin still appears in listings; the host
    /// never crashes on malformed plugin code.
    pub async fn add_plugin(&self, record: PluginRecord) -> PluginResult<()> {
        let plugin_id = record.manifest.id.clone();
        self.remove_existing(&plugin_id).await;

        let (context, load_error) =
            match PluginContext::load(record.clone(), self.bridge.clone(), self.events.clone())
                .await
            {
                Ok(context) => (context, None),
                Err(err) => {
                    tracing::warn!(plugin = %plugin_id, error = %err, "plugin load failed; keeping unloaded record");
                    (
                        PluginContext::unloaded(record, self.events.clone()),
                        Some(err),
                    )
                }
            };

        self.contexts
            .write()
            .expect("contexts lock")
            .push(Arc::new(context));
        let _ = self.events.send(PluginEvent::PluginAdded {
            plugin_id: plugin_id.clone(),
        });

        match load_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Remove a plugin: deactivate it (clearing its capabilities), drop its
    /// context, and notify.
    pub async fn remove_plugin(&self, plugin_id: &str) -> PluginResult<()> {
        let removed = self.take_context(plugin_id);
        let Some(context) = removed else {
            return Err(PluginError::NotFound(plugin_id.to_string()));
        };

        if let Err(err) = context.deactivate().await {
            tracing::warn!(plugin = %plugin_id, error = %err, "deactivate during removal failed");
        }
        context.shutdown();
        let _ = self.events.send(PluginEvent::PluginRemoved {
            plugin_id: plugin_id.to_string(),
        });
        Ok(())
    }

    /// Unload-then-reload one plugin by id with fresh record contents.
    ///
    /// This is the hot-reload entry point: an external file-change
    /// notification hands in the re-read record, the old context is torn
    /// down, and a new one is loaded and activated (when enabled).
    pub async fn reload_plugin(&self, record: PluginRecord) -> PluginResult<()> {
        let plugin_id = record.manifest.id.clone();
        let enabled = record.enabled;
        if let Some(context) = self.take_context(&plugin_id) {
            if let Err(err) = context.deactivate().await {
                tracing::warn!(plugin = %plugin_id, error = %err, "deactivate during reload failed");
            }
            context.shutdown();
            let _ = self.events.send(PluginEvent::PluginRemoved {
                plugin_id: plugin_id.clone(),
            });
        }
        self.add_plugin(record).await?;
        if enabled {
            if let Some(context) = self.get_plugin(&plugin_id) {
                context.activate().await?;
            }
        }
        Ok(())
    }

    /// Activate every loaded, enabled plugin. Individual failures are
    /// logged and skipped.
    pub async fn activate_all(&self) {
        for context in self.context_list() {
            if !context.record().enabled {
                continue;
            }
            if let Err(err) = context.activate().await {
                tracing::warn!(
                    plugin = %context.plugin_id(),
                    error = %err,
                    "plugin activation failed"
                );
            }
        }
    }

    /// Deactivate every plugin. Individual failures are logged and skipped.
    pub async fn deactivate_all(&self) {
        for context in self.context_list() {
            if let Err(err) = context.deactivate().await {
                tracing::warn!(
                    plugin = %context.plugin_id(),
                    error = %err,
                    "plugin deactivation failed"
                );
            }
        }
    }

    /// Deactivate one plugin by id.
    pub async fn deactivate(&self, plugin_id: &str) -> PluginResult<()> {
        let Some(context) = self.get_plugin(plugin_id) else {
            return Err(PluginError::NotFound(plugin_id.to_string()));
        };
        context.deactivate().await
    }

    /// Lightweight listing of all plugins.
    pub fn get_plugins(&self) -> Vec<PluginInfo> {
        self.context_list().iter().map(|c| c.to_info()).collect()
    }

    /// Find one plugin's context by id.
    pub fn get_plugin(&self, plugin_id: &str) -> Option<Arc<PluginContext>> {
        self.context_list()
            .into_iter()
            .find(|c| c.plugin_id() == plugin_id)
    }

    /// Number of plugins tracked.
    pub fn plugin_count(&self) -> usize {
        self.contexts.read().expect("contexts lock").len()
    }

    // ========================================================================
    // Aggregation
    // ========================================================================
    //
    // Aggregates are derived fresh on every call. Callers must re-read at
    // point of use rather than caching across an await that could race a
    // plugin state change.

    /// Resolve a model capability by namespaced id.
    pub fn get_llm(&self, namespaced: &str) -> Option<Arc<dyn LanguageModel>> {
        let (plugin_id, local_id) = split_namespaced_id(namespaced)?;
        let context = self.get_plugin(plugin_id)?;
        if !context.record().enabled {
            return None;
        }
        context
            .capabilities()
            .models()
            .get(local_id)
            .map(|m| m.model.clone())
    }

    /// All tools across enabled plugins, keyed by namespaced id.
    pub fn get_tools(&self) -> HashMap<String, RegisteredTool> {
        let mut tools = HashMap::new();
        for context in self.context_list() {
            if !context.record().enabled {
                continue;
            }
            let plugin_id = context.plugin_id().to_string();
            for (local_id, tool) in context.capabilities().tools() {
                tools.insert(namespaced_id(&plugin_id, local_id), tool.clone());
            }
        }
        tools
    }

    /// Resolve one tool by namespaced id.
    pub fn get_tool(&self, namespaced: &str) -> Option<RegisteredTool> {
        let (plugin_id, local_id) = split_namespaced_id(namespaced)?;
        let context = self.get_plugin(plugin_id)?;
        if !context.record().enabled {
            return None;
        }
        context.capabilities().tools().get(local_id).cloned()
    }

    /// All commands across enabled plugins, keyed by namespaced id.
    pub fn get_commands(&self) -> HashMap<String, RegisteredCommand> {
        let mut commands = HashMap::new();
        for context in self.context_list() {
            if !context.record().enabled {
                continue;
            }
            let plugin_id = context.plugin_id().to_string();
            for (local_id, command) in context.capabilities().commands() {
                commands.insert(namespaced_id(&plugin_id, local_id), command.clone());
            }
        }
        commands
    }

    /// All settings across enabled plugins, keyed by namespaced id.
    pub fn get_settings(&self) -> HashMap<String, SettingDeclaration> {
        let mut settings = HashMap::new();
        for context in self.context_list() {
            if !context.record().enabled {
                continue;
            }
            let plugin_id = context.plugin_id().to_string();
            for (local_id, setting) in context.capabilities().settings() {
                settings.insert(namespaced_id(&plugin_id, local_id), setting.clone());
            }
        }
        settings
    }

    /// All chat-node renderers across enabled plugins, keyed by namespaced
    /// id (`plugin:nodeType`).
    pub fn get_chat_node_renderers(&self) -> HashMap<String, RendererDeclaration> {
        let mut renderers = HashMap::new();
        for context in self.context_list() {
            if !context.record().enabled {
                continue;
            }
            let plugin_id = context.plugin_id().to_string();
            for (node_type, renderer) in context.capabilities().chat_node_renderers() {
                renderers.insert(namespaced_id(&plugin_id, node_type), renderer.clone());
            }
        }
        renderers
    }

    /// Tool definitions for a set of enabled namespaced ids, in input order,
    /// skipping ids that do not resolve at this instant.
    pub fn tool_definitions(&self, enabled_tool_ids: &[String]) -> Vec<ToolDefinition> {
        let tools = self.get_tools();
        enabled_tool_ids
            .iter()
            .filter_map(|id| {
                tools.get(id).map(|tool| ToolDefinition {
                    name: id.clone(),
                    description: tool.declaration.description.clone(),
                    input_schema: tool.declaration.schema.clone(),
                })
            })
            .collect()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn context_list(&self) -> Vec<Arc<PluginContext>> {
        self.contexts.read().expect("contexts lock").clone()
    }

    fn take_context(&self, plugin_id: &str) -> Option<Arc<PluginContext>> {
        let mut contexts = self.contexts.write().expect("contexts lock");
        let index = contexts.iter().position(|c| c.plugin_id() == plugin_id)?;
        Some(contexts.remove(index))
    }

    async fn remove_existing(&self, plugin_id: &str) {
        if let Some(context) = self.take_context(plugin_id) {
            if let Err(err) = context.deactivate().await {
                tracing::warn!(plugin = %plugin_id, error = %err, "deactivate during replace failed");
            }
            context.shutdown();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
