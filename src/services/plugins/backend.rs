//! Plugin Backend
//!
//! Supplies plugin records (manifest + source + persisted settings) to the
//! manager. The filesystem implementation discovers plugins as directories
//! containing a `plugin.json` manifest next to the entry file named by it:
//!
//! ```text
//! <plugins_dir>/
//!   acme-tools/
//!     plugin.json
//!     index.js
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::models::plugin::{PluginManifest, PluginRecord};

use super::error::{PluginError, PluginResult};
use super::settings::{load_plugin_settings, save_plugin_settings};

/// Manifest file name inside each plugin directory.
const MANIFEST_FILE: &str = "plugin.json";

/// Source of plugin records.
#[async_trait]
pub trait PluginBackend: Send + Sync {
    /// Fetch one plugin by id.
    async fn get_plugin(&self, plugin_id: &str) -> PluginResult<PluginRecord>;

    /// Fetch all installed plugins.
    async fn get_all_plugins(&self) -> PluginResult<Vec<PluginRecord>>;

    /// Mark a plugin enabled.
    async fn enable_plugin(&self, plugin_id: &str) -> PluginResult<()>;

    /// Mark a plugin disabled.
    async fn disable_plugin(&self, plugin_id: &str) -> PluginResult<()>;

    /// Remove a plugin from disk and forget its persisted state.
    async fn uninstall_plugin(&self, plugin_id: &str) -> PluginResult<()>;
}

/// Filesystem-backed plugin store.
#[derive(Debug, Clone)]
pub struct FsPluginBackend {
    plugins_dir: PathBuf,
    settings_path: PathBuf,
}

impl FsPluginBackend {
    /// Create a backend rooted at `plugins_dir`, persisting toggles and
    /// settings to `settings_path`.
    pub fn new(plugins_dir: impl Into<PathBuf>, settings_path: impl Into<PathBuf>) -> Self {
        Self {
            plugins_dir: plugins_dir.into(),
            settings_path: settings_path.into(),
        }
    }

    /// The directory plugins are discovered under.
    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    fn plugin_dir(&self, plugin_id: &str) -> PathBuf {
        self.plugins_dir.join(plugin_id)
    }

    fn read_record(&self, dir: &Path) -> PluginResult<PluginRecord> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest_raw = std::fs::read_to_string(&manifest_path)?;
        let manifest: PluginManifest = serde_json::from_str(&manifest_raw)
            .map_err(|e| PluginError::InvalidManifest(format!("{}: {e}", manifest_path.display())))?;
        if manifest.id.is_empty() {
            return Err(PluginError::InvalidManifest(format!(
                "{}: empty plugin id",
                manifest_path.display()
            )));
        }

        let source_code = std::fs::read_to_string(dir.join(&manifest.entry_file))?;

        let settings = load_plugin_settings(&self.settings_path);
        let enabled = !settings.is_disabled(&manifest.id);
        let persisted_settings = settings.settings_for(&manifest.id);

        Ok(PluginRecord {
            manifest,
            source_code,
            enabled,
            persisted_settings,
        })
    }

    /// Resolve the plugin id owning a changed path, if the path lies inside
    /// a plugin directory. Used by the hot-reload watcher.
    pub fn plugin_id_for_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.plugins_dir).ok()?;
        relative
            .components()
            .next()
            .and_then(|c| c.as_os_str().to_str())
            .map(|s| s.to_string())
    }
}

#[async_trait]
impl PluginBackend for FsPluginBackend {
    async fn get_plugin(&self, plugin_id: &str) -> PluginResult<PluginRecord> {
        let dir = self.plugin_dir(plugin_id);
        if !dir.join(MANIFEST_FILE).exists() {
            return Err(PluginError::NotFound(plugin_id.to_string()));
        }
        self.read_record(&dir)
    }

    async fn get_all_plugins(&self) -> PluginResult<Vec<PluginRecord>> {
        let mut records = Vec::new();
        if !self.plugins_dir.exists() {
            return Ok(records);
        }
        let mut entries: Vec<_> = std::fs::read_dir(&self.plugins_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir() && path.join(MANIFEST_FILE).exists())
            .collect();
        entries.sort();

        for dir in entries {
            match self.read_record(&dir) {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!(
                        dir = %dir.display(),
                        error = %err,
                        "skipping plugin with unreadable manifest or source"
                    );
                }
            }
        }
        Ok(records)
    }

    async fn enable_plugin(&self, plugin_id: &str) -> PluginResult<()> {
        let mut settings = load_plugin_settings(&self.settings_path);
        settings.set_enabled(plugin_id, true);
        save_plugin_settings(&self.settings_path, &settings)
    }

    async fn disable_plugin(&self, plugin_id: &str) -> PluginResult<()> {
        let mut settings = load_plugin_settings(&self.settings_path);
        settings.set_enabled(plugin_id, false);
        save_plugin_settings(&self.settings_path, &settings)
    }

    async fn uninstall_plugin(&self, plugin_id: &str) -> PluginResult<()> {
        let dir = self.plugin_dir(plugin_id);
        if !dir.exists() {
            return Err(PluginError::NotFound(plugin_id.to_string()));
        }
        std::fs::remove_dir_all(&dir)?;

        let mut settings = load_plugin_settings(&self.settings_path);
        settings.forget(plugin_id);
        save_plugin_settings(&self.settings_path, &settings)
    }
}

// ============================================================================
// Tests
// ============================================================================
