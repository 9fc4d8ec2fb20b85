//! End-to-end generation: a plugin contributes both the model and the tool,
//! the orchestrator loops through tool dispatch, and the result lands in
//! SQLite.

use std::sync::Arc;

use colloquy_desktop::models::chat::{ChatRole, ContentNode, MessageStatus, ToolCallStatus};
use colloquy_desktop::models::ChatRecord;
use colloquy_desktop::services::chat::{SendMessageParams, StopReason};
use colloquy_desktop::storage::ChatStore;
use colloquy_desktop::AppState;
use tempfile::TempDir;

use super::{init_tracing, write_plugin};

/// A plugin whose model requests one tool call, then summarizes the result
/// on its second turn. The model decides by looking for a tool_result block
/// in the prompt, so the flow is deterministic.
const CALC_PLUGIN: &str = r#"
import { registerModel, registerTool } from "colloquy";

export function activate() {
    registerTool({
        id: "add",
        description: "Adds two numbers",
        schema: {
            type: "object",
            properties: { a: { type: "number" }, b: { type: "number" } },
            required: ["a", "b"]
        },
        execute(args) { return String(args.a + args.b); }
    });

    registerModel({
        id: "calc",
        name: "Calc Model",
        chat(request) {
            let lastResult = null;
            for (const message of request.messages) {
                for (const block of message.content) {
                    if (block.type === "tool_result") {
                        lastResult = block.content;
                    }
                }
            }
            if (lastResult !== null) {
                return { text: "The answer is " + lastResult + "." };
            }
            return {
                text: "Let me compute that.",
                toolCalls: [
                    { toolId: "calc-plugin:add", arguments: { a: 2, b: 2 } }
                ]
            };
        }
    });
}
"#;

async fn harness(plugin_source: &str) -> (TempDir, Arc<AppState>) {
    init_tracing();
    let dir = TempDir::new().unwrap();
    write_plugin(&dir.path().join("plugins"), "calc-plugin", plugin_source);
    let state = Arc::new(AppState::initialize(dir.path()).unwrap());
    state.load_plugins().await.unwrap();
    (dir, state)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_generation_with_tool_roundtrip() {
    let (_dir, state) = harness(CALC_PLUGIN).await;

    let chat = ChatRecord::new("Math");
    state.database().create_chat(&chat).await.unwrap();

    let outcome = state
        .chat()
        .send_message(SendMessageParams {
            chat_id: chat.id.clone(),
            text: "What's 2+2?".to_string(),
            model_id: "calc-plugin:calc".to_string(),
            enabled_tools: vec!["calc-plugin:add".to_string()],
        })
        .await
        .unwrap()
        .expect("generation ran");

    assert_eq!(outcome.stop_reason, StopReason::Exhausted);
    assert_eq!(outcome.iterations, 2);
    assert_eq!(
        outcome.assistant_message.status,
        Some(MessageStatus::Complete)
    );

    // Transcript: first-turn text, the tool call, second-turn text (the two
    // text fragments are separated by the tool node, so they stay apart).
    let nodes = &outcome.assistant_message.content;
    assert_eq!(nodes.len(), 3);
    assert_eq!(nodes[0], ContentNode::text("Let me compute that."));
    match &nodes[1] {
        ContentNode::ToolCall {
            tool_id,
            status,
            result,
            ..
        } => {
            assert_eq!(tool_id, "calc-plugin:add");
            assert_eq!(*status, ToolCallStatus::Success);
            assert_eq!(result.as_deref(), Some("4"));
        }
        other => panic!("expected tool call node, got {other:?}"),
    }
    assert_eq!(nodes[2], ContentNode::text("The answer is 4."));

    // Persisted: user + assistant messages in order, plus the tool call.
    let messages = state.database().list_messages(&chat.id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, ChatRole::User);
    assert_eq!(messages[0].plain_text(), "What's 2+2?");
    assert_eq!(messages[1].role, ChatRole::Assistant);
    assert_eq!(messages[1].content, outcome.assistant_message.content);
    assert_eq!(state.database().tool_call_count().unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_generation_without_tools_single_turn() {
    const PLAIN_PLUGIN: &str = r#"
    import { registerModel } from "colloquy";
    export function activate() {
        registerModel({
            id: "plain",
            chat() { return { text: "Just text." }; }
        });
    }
    "#;
    let (_dir, state) = harness(PLAIN_PLUGIN).await;

    let chat = ChatRecord::new("Plain");
    state.database().create_chat(&chat).await.unwrap();

    let outcome = state
        .chat()
        .send_message(SendMessageParams {
            chat_id: chat.id.clone(),
            text: "Say something".to_string(),
            model_id: "calc-plugin:plain".to_string(),
            enabled_tools: vec![],
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.iterations, 1);
    assert_eq!(outcome.assistant_message.content.len(), 1);
    assert_eq!(
        outcome.assistant_message.content[0],
        ContentNode::text("Just text.")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_generation_with_unregistered_tool_id() {
    const MISFIRE_PLUGIN: &str = r#"
    import { registerModel } from "colloquy";
    export function activate() {
        registerModel({
            id: "misfire",
            chat(request) {
                for (const message of request.messages) {
                    for (const block of message.content) {
                        if (block.type === "tool_result") {
                            return { text: "saw result: " + block.content };
                        }
                    }
                }
                return {
                    text: "Trying a tool that does not exist.",
                    toolCalls: [ { toolId: "nowhere:tool", arguments: {} } ]
                };
            }
        });
    }
    "#;
    let (_dir, state) = harness(MISFIRE_PLUGIN).await;

    let chat = ChatRecord::new("Misfire");
    state.database().create_chat(&chat).await.unwrap();

    let outcome = state
        .chat()
        .send_message(SendMessageParams {
            chat_id: chat.id.clone(),
            text: "go".to_string(),
            model_id: "calc-plugin:misfire".to_string(),
            enabled_tools: vec![],
        })
        .await
        .unwrap()
        .unwrap();

    // The unknown tool finalizes as an error without invoking anything, and
    // its result still feeds the next model turn.
    assert_eq!(outcome.tool_calls.len(), 1);
    assert_eq!(outcome.tool_calls[0].status, ToolCallStatus::Error);
    assert_eq!(outcome.tool_calls[0].error.as_deref(), Some("Tool not found"));
    assert!(outcome
        .assistant_message
        .plain_text()
        .contains("saw result: Tool not found"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_history_flows_into_next_generation() {
    let (_dir, state) = harness(CALC_PLUGIN).await;

    let chat = ChatRecord::new("History");
    state.database().create_chat(&chat).await.unwrap();

    state
        .chat()
        .send_message(SendMessageParams {
            chat_id: chat.id.clone(),
            text: "What's 2+2?".to_string(),
            model_id: "calc-plugin:calc".to_string(),
            enabled_tools: vec!["calc-plugin:add".to_string()],
        })
        .await
        .unwrap()
        .unwrap();

    // Second generation in the same chat sees four persisted messages after
    // it completes.
    state
        .chat()
        .send_message(SendMessageParams {
            chat_id: chat.id.clone(),
            text: "And again?".to_string(),
            model_id: "calc-plugin:calc".to_string(),
            enabled_tools: vec!["calc-plugin:add".to_string()],
        })
        .await
        .unwrap()
        .unwrap();

    let messages = state.database().list_messages(&chat.id).await.unwrap();
    assert_eq!(messages.len(), 4);
}
