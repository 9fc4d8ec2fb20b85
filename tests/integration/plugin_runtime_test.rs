//! Plugin runtime integration: discovery from disk, sandbox isolation,
//! namespacing, the host bridge against real storage, and enable/disable
//! flows through the backend.

use std::sync::Arc;

use colloquy_desktop::models::ChatRecord;
use colloquy_desktop::services::plugins::PluginBackend;
use colloquy_desktop::storage::ChatStore;
use colloquy_desktop::AppState;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::{init_tracing, write_plugin};

async fn empty_state() -> (TempDir, Arc<AppState>) {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let state = Arc::new(AppState::initialize(dir.path()).unwrap());
    (dir, state)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_two_plugins_same_local_tool_id_stay_isolated() {
    let (dir, state) = empty_state().await;
    let plugins_dir = dir.path().join("plugins");
    for (id, reply) in [("north", "from-north"), ("south", "from-south")] {
        write_plugin(
            &plugins_dir,
            id,
            &format!(
                r#"
                import {{ registerTool }} from "colloquy";
                export function activate() {{
                    registerTool({{ id: "search", execute() {{ return "{reply}"; }} }});
                }}
                "#
            ),
        );
    }
    state.load_plugins().await.unwrap();

    let tools = state.plugins().get_tools();
    assert_eq!(tools.len(), 2);
    let north = tools["north:search"]
        .execute
        .execute(serde_json::json!({}), CancellationToken::new())
        .await
        .unwrap();
    let south = tools["south:search"]
        .execute
        .execute(serde_json::json!({}), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(north, "from-north");
    assert_eq!(south, "from-south");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_plugin_renames_chat_through_host_bridge() {
    let (dir, state) = empty_state().await;

    let chat = ChatRecord::new("Before");
    state.database().create_chat(&chat).await.unwrap();

    write_plugin(
        &dir.path().join("plugins"),
        "renamer",
        &format!(
            r#"
            import {{ renameChat, getChat }} from "colloquy";
            export function activate() {{
                const chat = getChat("{id}");
                renameChat("{id}", chat.name + " / After");
            }}
            "#,
            id = chat.id
        ),
    );
    state.load_plugins().await.unwrap();

    let renamed = state.database().get_chat(&chat.id).await.unwrap().unwrap();
    assert_eq!(renamed.name, "Before / After");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_disabled_plugin_not_loaded_until_enabled() {
    let (dir, state) = empty_state().await;
    write_plugin(
        &dir.path().join("plugins"),
        "sleeper",
        r#"
        import { registerTool } from "colloquy";
        export function activate() {
            registerTool({ id: "wake", execute() { return "awake"; } });
        }
        "#,
    );
    state.backend().disable_plugin("sleeper").await.unwrap();
    state.load_plugins().await.unwrap();

    assert!(state.plugins().get_tools().is_empty());

    // Enable and reload through the backend-supplied record.
    state.backend().enable_plugin("sleeper").await.unwrap();
    let record = state.backend().get_plugin("sleeper").await.unwrap();
    state.plugins().reload_plugin(record).await.unwrap();

    assert!(state.plugins().get_tools().contains_key("sleeper:wake"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_uninstall_plugin_removes_everything() {
    let (dir, state) = empty_state().await;
    write_plugin(
        &dir.path().join("plugins"),
        "doomed",
        r#"
        import { registerTool } from "colloquy";
        export function activate() {
            registerTool({ id: "t", execute() { return "x"; } });
        }
        "#,
    );
    state.load_plugins().await.unwrap();
    assert_eq!(state.plugins().plugin_count(), 1);

    state.backend().uninstall_plugin("doomed").await.unwrap();
    state.plugins().remove_plugin("doomed").await.unwrap();

    assert_eq!(state.plugins().plugin_count(), 0);
    assert!(state.plugins().get_tools().is_empty());
    assert!(state.backend().get_plugin("doomed").await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_persisted_settings_reach_plugin_code() {
    let (dir, state) = empty_state().await;
    write_plugin(
        &dir.path().join("plugins"),
        "configured",
        r#"
        import { registerTool, getSetting } from "colloquy";
        export function activate() {
            const key = getSetting("api_key");
            registerTool({ id: "probe", description: String(key) });
        }
        "#,
    );

    // Persist a setting before the plugin ever runs.
    let settings_path = dir.path().join("plugin-settings.json");
    let mut settings = colloquy_desktop::services::plugins::load_plugin_settings(&settings_path);
    settings.set_setting("configured", "api_key", serde_json::json!("sk-42"));
    colloquy_desktop::services::plugins::save_plugin_settings(&settings_path, &settings).unwrap();

    state.load_plugins().await.unwrap();

    let tools = state.plugins().get_tools();
    assert_eq!(tools["configured:probe"].declaration.description, "sk-42");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sandbox_has_no_ambient_imports() {
    let (dir, state) = empty_state().await;
    for (id, source) in [
        ("wants-fs", "import fs from \"fs\";\nexport function activate() {}"),
        (
            "wants-http",
            "import http from \"node:http\";\nexport function activate() {}",
        ),
    ] {
        write_plugin(&dir.path().join("plugins"), id, source);
    }
    state.load_plugins().await.unwrap();

    // Both plugins are listed but neither loaded nor contributing.
    assert_eq!(state.plugins().plugin_count(), 2);
    assert!(state.plugins().get_tools().is_empty());
    for info in state.plugins().get_plugins() {
        assert!(!info.active);
    }
}
