//! Application State
//!
//! Composition root of the runtime core: builds the database, plugin
//! runtime, and chat orchestrator against one data directory, and wires the
//! hot-reload watcher to the plugin backend.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::services::chat::ChatService;
use crate::services::plugins::{
    AppHostBridge, FsPluginBackend, PluginBackend, PluginError, PluginManager, PluginWatcher,
    TracingNotificationSink,
};
use crate::storage::{ChatStore, Database};
use crate::utils::error::AppResult;

/// Assembled runtime core.
pub struct AppState {
    database: Arc<Database>,
    backend: Arc<FsPluginBackend>,
    plugins: Arc<PluginManager>,
    chat: Arc<ChatService>,
    watcher: Mutex<PluginWatcher>,
    data_dir: PathBuf,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

impl AppState {
    /// Build the runtime core over `data_dir`. Must run inside a tokio
    /// runtime (the host bridge captures the handle for plugin-thread
    /// calls).
    pub fn initialize(data_dir: &Path) -> AppResult<Self> {
        let database = Arc::new(Database::open(&data_dir.join("colloquy.db"))?);

        let bridge = Arc::new(AppHostBridge::new(
            database.clone() as Arc<dyn ChatStore>,
            Arc::new(TracingNotificationSink),
        ));
        let plugins = Arc::new(PluginManager::new(bridge.clone()));
        bridge.attach_manager(&plugins);

        let plugins_dir = data_dir.join("plugins");
        let backend = Arc::new(FsPluginBackend::new(
            plugins_dir.clone(),
            data_dir.join("plugin-settings.json"),
        ));
        let chat = Arc::new(ChatService::new(
            plugins.clone(),
            database.clone() as Arc<dyn ChatStore>,
        ));

        Ok(Self {
            database,
            backend,
            plugins,
            chat,
            watcher: Mutex::new(PluginWatcher::new(plugins_dir)),
            data_dir: data_dir.to_path_buf(),
        })
    }

    /// Discover, load, and activate all installed plugins. Individual
    /// plugin failures are logged and skipped.
    pub async fn load_plugins(&self) -> AppResult<()> {
        let records = self.backend.get_all_plugins().await?;
        for record in records {
            let plugin_id = record.manifest.id.clone();
            if let Err(err) = self.plugins.add_plugin(record).await {
                tracing::warn!(plugin = %plugin_id, error = %err, "plugin skipped");
            }
        }
        self.plugins.activate_all().await;
        Ok(())
    }

    /// Start hot reload: file changes under the plugins directory trigger
    /// unload-then-reload of the touched plugin; a removed plugin is
    /// unloaded.
    pub fn start_hot_reload(self: &Arc<Self>) -> AppResult<()> {
        let weak = Arc::downgrade(self);
        let handle = tokio::runtime::Handle::current();
        self.watcher
            .lock()
            .expect("watcher lock")
            .start(move |plugin_id| {
                let Some(state) = weak.upgrade() else {
                    return;
                };
                handle.spawn(async move {
                    match state.backend.get_plugin(&plugin_id).await {
                        Ok(record) => {
                            if let Err(err) = state.plugins.reload_plugin(record).await {
                                tracing::warn!(plugin = %plugin_id, error = %err, "hot reload failed");
                            }
                        }
                        Err(PluginError::NotFound(_)) => {
                            let _ = state.plugins.remove_plugin(&plugin_id).await;
                        }
                        Err(err) => {
                            tracing::warn!(plugin = %plugin_id, error = %err, "hot reload read failed");
                        }
                    }
                });
            })?;
        Ok(())
    }

    /// Stop the hot-reload watcher.
    pub fn stop_hot_reload(&self) {
        self.watcher.lock().expect("watcher lock").stop();
    }

    /// The chat store.
    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    /// The plugin backend.
    pub fn backend(&self) -> &Arc<FsPluginBackend> {
        &self.backend
    }

    /// The plugin manager.
    pub fn plugins(&self) -> &Arc<PluginManager> {
        &self.plugins
    }

    /// The chat orchestrator.
    pub fn chat(&self) -> &Arc<ChatService> {
        &self.chat
    }
}
