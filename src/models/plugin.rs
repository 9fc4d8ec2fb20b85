//! Plugin Data Models
//!
//! Data types describing installed plugins before any code is evaluated.
//!
//! ## Key Types
//!
//! - `PluginManifest` - parsed from plugin.json (id, version, entry file, ...)
//! - `PluginAuthor` - author block within a manifest
//! - `PluginRecord` - manifest + source + enabled flag + persisted settings
//! - `PluginInfo` - lightweight listing shape for UI consumers

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// Plugin Manifest
// ============================================================================

/// Author block of a plugin manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginAuthor {
    /// Author name
    pub name: String,
    /// Contact email
    #[serde(default)]
    pub email: Option<String>,
}

/// Plugin manifest parsed from plugin.json. Loaded once per plugin and
/// never mutated.
///
/// ```json
/// {
///   "id": "acme-tools",
///   "name": "Acme Tools",
///   "description": "Handy tools",
///   "version": "1.2.0",
///   "apiVersion": ">=0.3",
///   "author": { "name": "Acme", "email": "dev@acme.io" },
///   "entryFile": "index.js"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    /// Plugin id (global namespace key, kebab-case)
    pub id: String,
    /// Human-readable plugin name
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Semver range string of the plugin itself
    #[serde(default)]
    pub version: String,
    /// Semver range of the host API the plugin targets
    #[serde(default)]
    pub api_version: Option<String>,
    /// Author block
    pub author: PluginAuthor,
    /// Entry file within the plugin directory (the module that is evaluated)
    pub entry_file: String,
}

impl Default for PluginManifest {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            description: String::new(),
            version: "0.0.0".to_string(),
            api_version: None,
            author: PluginAuthor {
                name: String::new(),
                email: None,
            },
            entry_file: "index.js".to_string(),
        }
    }
}

// ============================================================================
// Plugin Record
// ============================================================================

/// A discovered/installed plugin: manifest plus the source code of its entry
/// module and the user-facing toggles that survive restarts.
///
/// Created when a plugin is discovered or installed, `enabled` toggled by
/// the user, destroyed on uninstall.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRecord {
    /// Immutable manifest
    pub manifest: PluginManifest,
    /// Source code of the entry module
    pub source_code: String,
    /// Whether the user has the plugin enabled
    pub enabled: bool,
    /// Persisted setting values keyed by local setting id
    #[serde(default)]
    pub persisted_settings: HashMap<String, serde_json::Value>,
}

impl PluginRecord {
    /// Create an enabled record with no persisted settings.
    pub fn new(manifest: PluginManifest, source_code: impl Into<String>) -> Self {
        Self {
            manifest,
            source_code: source_code.into(),
            enabled: true,
            persisted_settings: HashMap::new(),
        }
    }
}

// ============================================================================
// Frontend Response Types
// ============================================================================

/// Lightweight plugin info for listing in the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Plugin id
    pub id: String,
    /// Plugin name
    pub name: String,
    /// Plugin version
    pub version: String,
    /// Plugin description
    pub description: String,
    /// Author name
    pub author: String,
    /// Whether enabled
    pub enabled: bool,
    /// Whether the plugin's context is currently active
    pub active: bool,
}

// ============================================================================
// Namespacing
// ============================================================================

/// Build the composite key `"<plugin_id>:<local_id>"`.
///
/// All aggregate registries key plugin-contributed resources by this id,
/// guaranteeing no cross-plugin collision even if two plugins pick the same
/// local id.
pub fn namespaced_id(plugin_id: &str, local_id: &str) -> String {
    format!("{}:{}", plugin_id, local_id)
}

/// Split a namespaced id back into `(plugin_id, local_id)`.
///
/// Returns `None` when the separator is missing. Local ids may themselves
/// contain `:`; the split is on the first separator only.
pub fn split_namespaced_id(id: &str) -> Option<(&str, &str)> {
    id.split_once(':')
}

// ============================================================================
// Tests
// ============================================================================
