//! Integration tests for the runtime core.
//!
//! These exercise the real stack end to end: plugins discovered from disk,
//! evaluated in QuickJS sandboxes, aggregated by the manager, driven by the
//! chat orchestrator, and persisted through SQLite.

use std::path::Path;

mod generation_test;
mod plugin_runtime_test;

/// Install a tracing subscriber once for the whole test binary.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Write a plugin directory (`plugin.json` + entry file) under `plugins_dir`.
pub fn write_plugin(plugins_dir: &Path, id: &str, source: &str) {
    let dir = plugins_dir.join(id);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("plugin.json"),
        serde_json::json!({
            "id": id,
            "name": format!("Plugin {id}"),
            "version": "0.1.0",
            "author": { "name": "integration-tests" },
            "entryFile": "index.js",
        })
        .to_string(),
    )
    .unwrap();
    std::fs::write(dir.join("index.js"), source).unwrap();
}
