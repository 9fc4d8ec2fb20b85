//! Capability Registry
//!
//! Per-plugin registry of contributed capabilities. Exclusively owned by one
//! `PluginContext`; the manager's aggregation pass only reads snapshots.
//!
//! ## Key Types
//!
//! - `CapabilityRegistry` - the per-plugin capability maps
//! - `SettingDeclaration` / `ToolDeclaration` / `ModelDeclaration` /
//!   `CommandDeclaration` / `RendererDeclaration` - capability metadata
//! - `RegisteredTool` / `RegisteredModel` / `RegisteredCommand` - metadata
//!   plus the executable handle resolved through the owning plugin's sandbox
//! - `Registrar` - shared write handle used by both the context's
//!   registration methods and the sandbox's capability API

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use colloquy_core::tool_trait::ToolExecutable;
use colloquy_llm::LanguageModel;

use super::events::PluginEvent;

// ============================================================================
// Capability Declarations
// ============================================================================

/// Kind of a contributed setting's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKind {
    Text,
    Number,
    Toggle,
    Select,
}

/// A setting contributed by a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingDeclaration {
    /// Local setting id
    pub id: String,
    /// User-visible title
    pub title: String,
    /// Value kind
    #[serde(default = "default_setting_kind")]
    pub kind: SettingKind,
    /// Default value
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

fn default_setting_kind() -> SettingKind {
    SettingKind::Text
}

/// Metadata of a tool contributed by a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Local tool id
    pub id: String,
    /// Description shown to the model
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the tool's arguments
    #[serde(default = "default_tool_schema")]
    pub schema: serde_json::Value,
}

fn default_tool_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object" })
}

/// Metadata of a model capability contributed by a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDeclaration {
    /// Local model id
    pub id: String,
    /// Human-readable model name
    #[serde(default)]
    pub name: String,
}

/// Metadata of a command contributed by a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDeclaration {
    /// Local command id
    pub id: String,
    /// Description shown in command palettes
    #[serde(default)]
    pub description: String,
}

/// Metadata of a chat-node renderer contributed by a plugin.
///
/// Renderers are metadata-only in the runtime core: the UI layer consults
/// the aggregate map to pick a renderer for a node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RendererDeclaration {
    /// Content-node type this renderer handles
    pub node_type: String,
}

// ============================================================================
// Registered Capabilities (metadata + executable handle)
// ============================================================================

/// A tool registration: declaration plus its execution handle.
#[derive(Clone)]
pub struct RegisteredTool {
    /// Tool metadata
    pub declaration: ToolDeclaration,
    /// Execution seam (sandbox-backed for plugin tools, mock in tests)
    pub execute: Arc<dyn ToolExecutable>,
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("declaration", &self.declaration)
            .finish()
    }
}

/// A model registration: declaration plus the capability handle.
#[derive(Clone)]
pub struct RegisteredModel {
    /// Model metadata
    pub declaration: ModelDeclaration,
    /// The model capability itself
    pub model: Arc<dyn LanguageModel>,
}

impl std::fmt::Debug for RegisteredModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredModel")
            .field("declaration", &self.declaration)
            .finish()
    }
}

/// A command registration: declaration plus its execution handle.
#[derive(Clone)]
pub struct RegisteredCommand {
    /// Command metadata
    pub declaration: CommandDeclaration,
    /// Execution seam (commands share the tool execution shape)
    pub run: Arc<dyn ToolExecutable>,
}

impl std::fmt::Debug for RegisteredCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredCommand")
            .field("declaration", &self.declaration)
            .finish()
    }
}

// ============================================================================
// CapabilityRegistry
// ============================================================================

/// The capability maps of one plugin, keyed by local id.
///
/// Invariant: all maps are empty while the owning context is inactive
/// (cleared on deactivate - the "reset state" policy).
#[derive(Debug, Default, Clone)]
pub struct CapabilityRegistry {
    settings: HashMap<String, SettingDeclaration>,
    tools: HashMap<String, RegisteredTool>,
    models: HashMap<String, RegisteredModel>,
    commands: HashMap<String, RegisteredCommand>,
    chat_node_renderers: HashMap<String, RendererDeclaration>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a setting. Replaces any existing setting with the same id.
    pub fn register_setting(&mut self, declaration: SettingDeclaration) {
        self.settings.insert(declaration.id.clone(), declaration);
    }

    /// Register a tool. Replaces any existing tool with the same id.
    pub fn register_tool(&mut self, declaration: ToolDeclaration, execute: Arc<dyn ToolExecutable>) {
        self.tools.insert(
            declaration.id.clone(),
            RegisteredTool {
                declaration,
                execute,
            },
        );
    }

    /// Register a model. Replaces any existing model with the same id.
    pub fn register_model(&mut self, declaration: ModelDeclaration, model: Arc<dyn LanguageModel>) {
        self.models.insert(
            declaration.id.clone(),
            RegisteredModel { declaration, model },
        );
    }

    /// Register a command. Replaces any existing command with the same id.
    pub fn register_command(
        &mut self,
        declaration: CommandDeclaration,
        run: Arc<dyn ToolExecutable>,
    ) {
        self.commands
            .insert(declaration.id.clone(), RegisteredCommand { declaration, run });
    }

    /// Register a chat-node renderer keyed by node type.
    pub fn register_chat_node_renderer(&mut self, declaration: RendererDeclaration) {
        self.chat_node_renderers
            .insert(declaration.node_type.clone(), declaration);
    }

    /// Clear every capability map (the deactivate reset).
    pub fn clear(&mut self) {
        self.settings.clear();
        self.tools.clear();
        self.models.clear();
        self.commands.clear();
        self.chat_node_renderers.clear();
    }

    /// Whether no capabilities are registered.
    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
            && self.tools.is_empty()
            && self.models.is_empty()
            && self.commands.is_empty()
            && self.chat_node_renderers.is_empty()
    }

    /// Registered settings, keyed by local id.
    pub fn settings(&self) -> &HashMap<String, SettingDeclaration> {
        &self.settings
    }

    /// Registered tools, keyed by local id.
    pub fn tools(&self) -> &HashMap<String, RegisteredTool> {
        &self.tools
    }

    /// Registered models, keyed by local id.
    pub fn models(&self) -> &HashMap<String, RegisteredModel> {
        &self.models
    }

    /// Registered commands, keyed by local id.
    pub fn commands(&self) -> &HashMap<String, RegisteredCommand> {
        &self.commands
    }

    /// Registered chat-node renderers, keyed by node type.
    pub fn chat_node_renderers(&self) -> &HashMap<String, RendererDeclaration> {
        &self.chat_node_renderers
    }
}

// ============================================================================
// Registrar
// ============================================================================

/// Shared write handle to one plugin's registry and settings cache.
///
/// Both the context's registration methods and the sandbox's capability API
/// funnel through this, so every registration emits `StateChanged` on the
/// shared event channel regardless of which side made the call.
#[derive(Clone)]
pub struct Registrar {
    plugin_id: String,
    registry: Arc<Mutex<CapabilityRegistry>>,
    settings_cache: Arc<Mutex<HashMap<String, serde_json::Value>>>,
    events: broadcast::Sender<PluginEvent>,
}

impl Registrar {
    /// Create a registrar for one plugin.
    pub fn new(plugin_id: impl Into<String>, events: broadcast::Sender<PluginEvent>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            registry: Arc::new(Mutex::new(CapabilityRegistry::new())),
            settings_cache: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    /// The owning plugin's id.
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Snapshot the current registry contents.
    pub fn snapshot(&self) -> CapabilityRegistry {
        self.registry.lock().expect("registry lock").clone()
    }

    /// Register a setting and notify aggregators.
    pub fn register_setting(&self, declaration: SettingDeclaration) {
        self.registry
            .lock()
            .expect("registry lock")
            .register_setting(declaration);
        self.emit_state_changed();
    }

    /// Register a tool and notify aggregators.
    pub fn register_tool(&self, declaration: ToolDeclaration, execute: Arc<dyn ToolExecutable>) {
        self.registry
            .lock()
            .expect("registry lock")
            .register_tool(declaration, execute);
        self.emit_state_changed();
    }

    /// Register a model and notify aggregators.
    pub fn register_model(&self, declaration: ModelDeclaration, model: Arc<dyn LanguageModel>) {
        self.registry
            .lock()
            .expect("registry lock")
            .register_model(declaration, model);
        self.emit_state_changed();
    }

    /// Register a command and notify aggregators.
    pub fn register_command(&self, declaration: CommandDeclaration, run: Arc<dyn ToolExecutable>) {
        self.registry
            .lock()
            .expect("registry lock")
            .register_command(declaration, run);
        self.emit_state_changed();
    }

    /// Register a chat-node renderer and notify aggregators.
    pub fn register_chat_node_renderer(&self, declaration: RendererDeclaration) {
        self.registry
            .lock()
            .expect("registry lock")
            .register_chat_node_renderer(declaration);
        self.emit_state_changed();
    }

    /// Clear the registry (deactivate reset) and notify aggregators.
    pub fn clear(&self) {
        self.registry.lock().expect("registry lock").clear();
        self.emit_state_changed();
    }

    /// Read a cached setting value. Independent of activation status.
    pub fn cached_setting(&self, id: &str) -> Option<serde_json::Value> {
        self.settings_cache
            .lock()
            .expect("settings cache lock")
            .get(id)
            .cloned()
    }

    /// Write a cached setting value. Independent of activation status.
    pub fn set_cached_setting(&self, id: impl Into<String>, value: serde_json::Value) {
        self.settings_cache
            .lock()
            .expect("settings cache lock")
            .insert(id.into(), value);
    }

    fn emit_state_changed(&self) {
        let _ = self.events.send(PluginEvent::StateChanged {
            plugin_id: self.plugin_id.clone(),
        });
    }
}

impl std::fmt::Debug for Registrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registrar")
            .field("plugin_id", &self.plugin_id)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
