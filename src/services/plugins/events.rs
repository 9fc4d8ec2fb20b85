//! Plugin Events
//!
//! Change notifications broadcast by the plugin runtime. The manager and
//! every owned context share one broadcast channel; aggregate consumers
//! (UI, orchestrator) subscribe and re-read the aggregate maps at point of
//! use rather than caching them across the notification.

use serde::{Deserialize, Serialize};

/// A change notification from the plugin runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PluginEvent {
    /// A plugin was added to the manager
    PluginAdded { plugin_id: String },
    /// A plugin was removed from the manager
    PluginRemoved { plugin_id: String },
    /// A plugin context transitioned to active
    Activated { plugin_id: String },
    /// A plugin context transitioned to inactive
    Deactivated { plugin_id: String },
    /// A registration call changed a plugin's capability set
    StateChanged { plugin_id: String },
}

impl PluginEvent {
    /// The plugin this event concerns.
    pub fn plugin_id(&self) -> &str {
        match self {
            Self::PluginAdded { plugin_id }
            | Self::PluginRemoved { plugin_id }
            | Self::Activated { plugin_id }
            | Self::Deactivated { plugin_id }
            | Self::StateChanged { plugin_id } => plugin_id,
        }
    }
}
