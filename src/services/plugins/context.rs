//! Plugin Context
//!
//! Wraps one loaded plugin module: owns its capability registry, exposes the
//! activate/deactivate state machine, and offers host-side registration
//! methods bound to the same registrar the sandboxed code registers through.
//!
//! State machine: `Inactive` (initial) -> `Active` -> `Inactive`; a context
//! can cycle many times. All registered capabilities are cleared on
//! deactivate (the "reset state" policy), so every map is empty whenever the
//! context is inactive.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use colloquy_core::tool_trait::ToolExecutable;
use colloquy_llm::LanguageModel;

use crate::models::plugin::{PluginInfo, PluginRecord};

use super::error::PluginResult;
use super::events::PluginEvent;
use super::host::HostBridge;
use super::registry::{
    CapabilityRegistry, CommandDeclaration, ModelDeclaration, Registrar, RendererDeclaration,
    SettingDeclaration, ToolDeclaration,
};
use super::sandbox::{PluginSandbox, SandboxServices};

/// Activation status of a plugin context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginStatus {
    Inactive,
    Active,
}

/// Runtime wrapper around one plugin.
pub struct PluginContext {
    record: PluginRecord,
    status: Mutex<PluginStatus>,
    sandbox: Option<PluginSandbox>,
    registrar: Registrar,
    events: broadcast::Sender<PluginEvent>,
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin_id", &self.record.manifest.id)
            .field("status", &*self.status.lock().expect("status lock"))
            .field("loaded", &self.sandbox.is_some())
            .finish()
    }
}

impl PluginContext {
    /// Load a context for `record`, evaluating its source in a fresh
    /// sandbox.
    ///
    /// Load failures are typed; the caller logs and decides whether to keep
    /// an unloaded context around. Disabled records are never evaluated.
    pub async fn load(
        record: PluginRecord,
        bridge: Arc<dyn HostBridge>,
        events: broadcast::Sender<PluginEvent>,
    ) -> PluginResult<Self> {
        let registrar = Registrar::new(record.manifest.id.clone(), events.clone());
        for (id, value) in &record.persisted_settings {
            registrar.set_cached_setting(id.clone(), value.clone());
        }

        let sandbox = if record.enabled {
            let services = SandboxServices {
                registrar: registrar.clone(),
                bridge,
            };
            Some(PluginSandbox::load(&record.manifest, record.source_code.clone(), services).await?)
        } else {
            None
        };

        Ok(Self {
            record,
            status: Mutex::new(PluginStatus::Inactive),
            sandbox,
            registrar,
            events,
        })
    }

    /// Create a context that tracks `record` without a loaded module.
    ///
    /// Used for disabled plugins and for records whose load failed: the
    /// manager still lists them, but activate is a no-op.
    pub fn unloaded(record: PluginRecord, events: broadcast::Sender<PluginEvent>) -> Self {
        let registrar = Registrar::new(record.manifest.id.clone(), events.clone());
        for (id, value) in &record.persisted_settings {
            registrar.set_cached_setting(id.clone(), value.clone());
        }
        Self {
            record,
            status: Mutex::new(PluginStatus::Inactive),
            sandbox: None,
            registrar,
            events,
        }
    }

    /// The owning plugin's id.
    pub fn plugin_id(&self) -> &str {
        &self.record.manifest.id
    }

    /// The record this context was loaded from.
    pub fn record(&self) -> &PluginRecord {
        &self.record
    }

    /// Whether a module is loaded.
    pub fn is_loaded(&self) -> bool {
        self.sandbox.is_some()
    }

    /// Current activation status.
    pub fn status(&self) -> PluginStatus {
        *self.status.lock().expect("status lock")
    }

    /// Whether the context is active.
    pub fn is_active(&self) -> bool {
        self.status() == PluginStatus::Active
    }

    /// Activate the context.
    ///
    /// No-op if already active or no module is loaded. Otherwise the context
    /// is marked active and `Activated` is emitted *before* the module's own
    /// `activate` runs; an exception from the module is surfaced to the
    /// caller but the context stays active (the host does not retry).
    pub async fn activate(&self) -> PluginResult<()> {
        let Some(sandbox) = self.sandbox.as_ref() else {
            return Ok(());
        };
        {
            let mut status = self.status.lock().expect("status lock");
            if *status == PluginStatus::Active {
                return Ok(());
            }
            *status = PluginStatus::Active;
        }
        let _ = self.events.send(PluginEvent::Activated {
            plugin_id: self.plugin_id().to_string(),
        });

        sandbox.activate().await
    }

    /// Deactivate the context.
    ///
    /// No-op if already inactive. Otherwise clears every registered
    /// capability, emits `Deactivated`, marks the context inactive, then
    /// awaits the module's `deactivate` if one was exported.
    pub async fn deactivate(&self) -> PluginResult<()> {
        {
            let status = self.status.lock().expect("status lock");
            if *status == PluginStatus::Inactive {
                return Ok(());
            }
        }

        self.registrar.clear();
        let _ = self.events.send(PluginEvent::Deactivated {
            plugin_id: self.plugin_id().to_string(),
        });
        *self.status.lock().expect("status lock") = PluginStatus::Inactive;

        match self.sandbox.as_ref() {
            Some(sandbox) => sandbox.deactivate().await,
            None => Ok(()),
        }
    }

    /// Stop the interpreter thread. The context is unusable afterwards.
    pub fn shutdown(&self) {
        if let Some(sandbox) = self.sandbox.as_ref() {
            sandbox.shutdown();
        }
    }

    // ========================================================================
    // Registration Methods
    // ========================================================================
    //
    // Registration is accepted regardless of activation status; each call
    // emits `StateChanged` so aggregators resync.

    /// Register a setting.
    pub fn register_setting(&self, declaration: SettingDeclaration) {
        self.registrar.register_setting(declaration);
    }

    /// Register a tool.
    pub fn register_tool(&self, declaration: ToolDeclaration, execute: Arc<dyn ToolExecutable>) {
        self.registrar.register_tool(declaration, execute);
    }

    /// Register a model capability.
    pub fn register_model(&self, declaration: ModelDeclaration, model: Arc<dyn LanguageModel>) {
        self.registrar.register_model(declaration, model);
    }

    /// Register a command.
    pub fn register_command(&self, declaration: CommandDeclaration, run: Arc<dyn ToolExecutable>) {
        self.registrar.register_command(declaration, run);
    }

    /// Register a chat-node renderer.
    pub fn register_chat_node_renderer(&self, declaration: RendererDeclaration) {
        self.registrar.register_chat_node_renderer(declaration);
    }

    // ========================================================================
    // Settings Cache
    // ========================================================================

    /// Read a cached setting value. Works in any activation state, so
    /// settings UIs can pre-populate before activation completes.
    pub fn get_cached_setting(&self, id: &str) -> Option<serde_json::Value> {
        self.registrar.cached_setting(id)
    }

    /// Write a cached setting value. Works in any activation state.
    pub fn set_cached_setting(&self, id: impl Into<String>, value: serde_json::Value) {
        self.registrar.set_cached_setting(id, value);
    }

    // ========================================================================
    // Capability Access
    // ========================================================================

    /// Snapshot of this plugin's current capability registry.
    pub fn capabilities(&self) -> CapabilityRegistry {
        self.registrar.snapshot()
    }

    /// Lightweight listing shape.
    pub fn to_info(&self) -> PluginInfo {
        PluginInfo {
            id: self.record.manifest.id.clone(),
            name: self.record.manifest.name.clone(),
            version: self.record.manifest.version.clone(),
            description: self.record.manifest.description.clone(),
            author: self.record.manifest.author.name.clone(),
            enabled: self.record.enabled,
            active: self.is_active(),
        }
    }
}

impl Drop for PluginContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Tests
// ============================================================================
