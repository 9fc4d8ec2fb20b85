//! Plugin Runtime
//!
//! Loads untrusted extension code into isolated QuickJS interpreters and
//! exposes each plugin only a capability-scoped API. Capabilities (settings,
//! tools, models, commands, chat-node renderers) land in per-plugin
//! registries; the manager aggregates them under namespaced ids for the
//! rest of the app.

pub mod backend;
pub mod bridge;
pub mod context;
pub mod error;
pub mod events;
pub mod host;
pub mod manager;
pub mod registry;
pub mod sandbox;
pub mod settings;
pub mod watcher;

pub use backend::{FsPluginBackend, PluginBackend};
pub use bridge::AppHostBridge;
pub use context::{PluginContext, PluginStatus};
pub use error::{PluginError, PluginResult};
pub use events::PluginEvent;
pub use host::{
    ChatMessagesQuery, HostBridge, Notification, NotificationLevel, NotificationSink,
    TracingNotificationSink, HOST_BRIDGE_ERROR,
};
pub use manager::PluginManager;
pub use registry::{
    CapabilityRegistry, CommandDeclaration, ModelDeclaration, RegisteredCommand, RegisteredModel,
    RegisteredTool, Registrar, RendererDeclaration, SettingDeclaration, SettingKind,
    ToolDeclaration,
};
pub use sandbox::{PluginSandbox, SandboxServices, CAPABILITY_MODULE};
pub use settings::{
    default_settings_path, load_plugin_settings, save_plugin_settings, PluginSettings,
};
pub use watcher::PluginWatcher;
