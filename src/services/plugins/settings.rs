//! Plugin Settings Persistence
//!
//! Persists plugin enabled/disabled state and per-plugin setting values to
//! disk so they survive app restarts. Settings are stored as one JSON file,
//! by default at `~/.colloquy/plugin-settings.json`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::PluginResult;

/// Persistent plugin settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginSettings {
    /// Plugin ids the user has disabled
    #[serde(default)]
    pub disabled_plugins: Vec<String>,
    /// Persisted setting values: plugin id -> (local setting id -> value)
    #[serde(default)]
    pub plugin_settings: HashMap<String, HashMap<String, serde_json::Value>>,
}

impl PluginSettings {
    /// Whether a plugin is disabled.
    pub fn is_disabled(&self, plugin_id: &str) -> bool {
        self.disabled_plugins.iter().any(|id| id == plugin_id)
    }

    /// Mark a plugin enabled or disabled.
    pub fn set_enabled(&mut self, plugin_id: &str, enabled: bool) {
        if enabled {
            self.disabled_plugins.retain(|id| id != plugin_id);
        } else if !self.is_disabled(plugin_id) {
            self.disabled_plugins.push(plugin_id.to_string());
        }
    }

    /// Setting values persisted for one plugin.
    pub fn settings_for(&self, plugin_id: &str) -> HashMap<String, serde_json::Value> {
        self.plugin_settings
            .get(plugin_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Store one setting value for a plugin.
    pub fn set_setting(
        &mut self,
        plugin_id: &str,
        setting_id: impl Into<String>,
        value: serde_json::Value,
    ) {
        self.plugin_settings
            .entry(plugin_id.to_string())
            .or_default()
            .insert(setting_id.into(), value);
    }

    /// Drop everything persisted for a plugin (uninstall cleanup).
    pub fn forget(&mut self, plugin_id: &str) {
        self.disabled_plugins.retain(|id| id != plugin_id);
        self.plugin_settings.remove(plugin_id);
    }
}

/// Default settings file path, `~/.colloquy/plugin-settings.json`.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".colloquy").join("plugin-settings.json"))
}

/// Load plugin settings from disk.
///
/// Returns default settings if the file doesn't exist or can't be parsed.
pub fn load_plugin_settings(path: &Path) -> PluginSettings {
    if !path.exists() {
        return PluginSettings::default();
    }
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to read plugin settings");
            PluginSettings::default()
        }
    }
}

/// Save plugin settings to disk, creating the parent directory if needed.
pub fn save_plugin_settings(path: &Path, settings: &PluginSettings) -> PluginResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, content)?;
    Ok(())
}
