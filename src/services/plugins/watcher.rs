//! Plugin Hot-Reload Watcher
//!
//! Watches the plugins directory for file changes and maps each debounced
//! change to the owning plugin id. The watcher itself only reports ids; the
//! app wires the callback to re-read the record through the backend and call
//! `PluginManager::reload_plugin`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind, Debouncer};

use super::error::{PluginError, PluginResult};

/// Default debounce duration for plugin file watching.
const PLUGIN_WATCH_DEBOUNCE_MS: u64 = 300;

/// Watches a plugins directory and reports changed plugin ids.
pub struct PluginWatcher {
    /// Active debounced watcher (None if stopped).
    _watcher: Option<Debouncer<RecommendedWatcher>>,
    /// Directory being watched.
    plugins_dir: PathBuf,
}

impl PluginWatcher {
    /// Create a watcher for `plugins_dir` (not yet started).
    pub fn new(plugins_dir: impl Into<PathBuf>) -> Self {
        Self {
            _watcher: None,
            plugins_dir: plugins_dir.into(),
        }
    }

    /// The directory this watcher covers.
    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    /// Start watching. `on_change` receives the plugin id owning each
    /// changed path; repeated edits within the debounce window collapse
    /// into one notification per event batch.
    pub fn start<F>(&mut self, on_change: F) -> PluginResult<()>
    where
        F: Fn(String) + Send + 'static,
    {
        let plugins_dir = self.plugins_dir.clone();

        let mut debouncer = new_debouncer(
            Duration::from_millis(PLUGIN_WATCH_DEBOUNCE_MS),
            move |events: Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>| {
                let events = match events {
                    Ok(events) => events,
                    Err(_) => return,
                };

                let mut reported: Vec<String> = Vec::new();
                for event in events {
                    if event.kind != DebouncedEventKind::Any {
                        continue;
                    }
                    let Some(plugin_id) = plugin_id_for_path(&plugins_dir, &event.path) else {
                        continue;
                    };
                    if reported.contains(&plugin_id) {
                        continue;
                    }
                    reported.push(plugin_id.clone());
                    on_change(plugin_id);
                }
            },
        )
        .map_err(|e| PluginError::Runtime(format!("failed to create plugin watcher: {e}")))?;

        debouncer
            .watcher()
            .watch(&self.plugins_dir, RecursiveMode::Recursive)
            .map_err(|e| PluginError::Runtime(format!("failed to watch plugins dir: {e}")))?;

        self._watcher = Some(debouncer);
        tracing::info!(dir = %self.plugins_dir.display(), "plugin hot-reload watcher started");
        Ok(())
    }

    /// Stop watching.
    pub fn stop(&mut self) {
        self._watcher = None;
    }

    /// Whether the watcher is running.
    pub fn is_running(&self) -> bool {
        self._watcher.is_some()
    }
}

/// First path component under the plugins directory is the plugin id.
fn plugin_id_for_path(plugins_dir: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(plugins_dir).ok()?;
    relative
        .components()
        .next()
        .and_then(|c| c.as_os_str().to_str())
        .map(|s| s.to_string())
}
