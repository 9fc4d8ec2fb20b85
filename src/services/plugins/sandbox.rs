//! Sandboxed Module Loader
//!
//! Evaluates untrusted plugin source inside an embedded QuickJS interpreter
//! (`rquickjs`). Each plugin gets its own interpreter on a dedicated OS
//! thread; the host talks to it over a command channel with oneshot replies,
//! so the `!Send` interpreter state never crosses the async runtime.
//!
//! ## Sandbox Shape
//!
//! - The only resolvable import is the capability module `"colloquy"`; any
//!   other specifier fails the load with `PluginError::UnknownImport`.
//! - The capability module is JS glue over a single `__colloquy` host object
//!   exposing three functions: `register` (capability metadata into the
//!   Rust registry), `call` (host bridge), and `log` (tracing).
//! - Executable capability halves (tool `execute`, command `run`, model
//!   `chat`) stay on the JS side in `globalThis.__capabilities`; the host
//!   invokes them by id through `__capability_invoke`, which always returns
//!   a Promise resolving to a JSON string.
//! - The loaded module must export an `activate` function; `deactivate` is
//!   optional but must be callable if present.
//!
//! All interpreter failures are converted to typed `PluginError` values;
//! nothing panics across the loader boundary.

use std::sync::{Arc, Mutex};
use std::thread;

use async_trait::async_trait;
use rquickjs::function::Func;
use rquickjs::loader::{Loader, Resolver};
use rquickjs::module::Declared;
use rquickjs::{
    Context, Ctx, Error as JsError, Function, IntoJs, Module, Object, Promise, Runtime,
    Value as JsValue,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use colloquy_core::error::{CoreError, CoreResult};
use colloquy_core::streaming::TurnEvent;
use colloquy_core::tool_trait::ToolExecutable;
use colloquy_llm::{LanguageModel, LlmError, LlmResult, TurnRequest};

use crate::models::plugin::{namespaced_id, PluginManifest};

use super::error::{PluginError, PluginResult};
use super::host::{dispatch_host_call, HostBridge, HOST_BRIDGE_ERROR};
use super::registry::{
    CommandDeclaration, ModelDeclaration, Registrar, RendererDeclaration, SettingDeclaration,
    ToolDeclaration,
};

/// The only module specifier the sandbox resolves.
pub const CAPABILITY_MODULE: &str = "colloquy";

/// JS glue served when plugin code imports the capability module.
const CAPABILITY_MODULE_SOURCE: &str = r#"
const host = globalThis.__colloquy;

function storeCallable(kind, id, fn) {
  if (typeof fn === "function") {
    globalThis.__capabilities[kind][id] = fn;
  }
}

export function registerSetting(declaration) {
  host.register("setting", JSON.stringify({
    id: declaration.id,
    title: declaration.title || declaration.id,
    kind: declaration.kind || "text",
    default: declaration.default === undefined ? null : declaration.default,
  }));
}

export function registerTool(declaration) {
  storeCallable("tool", declaration.id, declaration.execute);
  host.register("tool", JSON.stringify({
    id: declaration.id,
    description: declaration.description || "",
    schema: declaration.schema || { type: "object" },
  }));
}

export function registerCommand(declaration) {
  storeCallable("command", declaration.id, declaration.run);
  host.register("command", JSON.stringify({
    id: declaration.id,
    description: declaration.description || "",
  }));
}

export function registerModel(declaration) {
  storeCallable("model", declaration.id, declaration.chat);
  host.register("model", JSON.stringify({
    id: declaration.id,
    name: declaration.name || declaration.id,
  }));
}

export function registerChatNodeRenderer(declaration) {
  host.register("chat_node_renderer", JSON.stringify({ nodeType: declaration.nodeType }));
}

export function getLLM(id) {
  return JSON.parse(host.call("get_llm", JSON.stringify({ id: id })));
}

export function showNotification(notification) {
  host.call("show_notification", JSON.stringify(notification));
}

export function getChat(id) {
  return JSON.parse(host.call("get_chat", JSON.stringify({ id: id })));
}

export function renameChat(id, name) {
  host.call("rename_chat", JSON.stringify({ id: id, name: name }));
}

export function getChatMessages(query) {
  return JSON.parse(host.call("get_chat_messages", JSON.stringify(query || {})));
}

export function getSetting(id) {
  return JSON.parse(host.call("get_setting", JSON.stringify({ id: id })));
}

export function log(message) {
  host.log("info", String(message));
}
"#;

/// Prelude evaluated before the plugin module. Holds the executable
/// capability store and the helpers the host drives calls through.
const BOOTSTRAP_SOURCE: &str = r#"
globalThis.__capabilities = { tool: {}, command: {}, model: {} };

globalThis.__capability_invoke = function (kind, id, payloadJson) {
  const entry = globalThis.__capabilities[kind][id];
  if (typeof entry !== "function") {
    throw new Error("unregistered " + kind + ": " + id);
  }
  return Promise.resolve(entry(JSON.parse(payloadJson))).then(function (result) {
    return JSON.stringify(result === undefined ? null : result);
  });
};

globalThis.__lifecycle_invoke = function (name) {
  const fn = globalThis[name];
  if (typeof fn !== "function") {
    return Promise.resolve(null);
  }
  return Promise.resolve(fn()).then(function () { return null; });
};
"#;

// ============================================================================
// Commands
// ============================================================================

/// Which executable capability store a call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    Tool,
    Command,
    Model,
}

impl CapabilityKind {
    fn store_key(self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Command => "command",
            Self::Model => "model",
        }
    }
}

enum SandboxCommand {
    Activate {
        reply: oneshot::Sender<PluginResult<()>>,
    },
    Deactivate {
        reply: oneshot::Sender<PluginResult<()>>,
    },
    ExecuteCapability {
        kind: CapabilityKind,
        local_id: String,
        payload: String,
        reply: oneshot::Sender<PluginResult<serde_json::Value>>,
    },
    Shutdown,
}

/// Host-side services wired into a sandbox at load time.
pub struct SandboxServices {
    /// Write handle to the owning plugin's capability registry
    pub registrar: Registrar,
    /// Host bridge reachable from plugin code
    pub bridge: Arc<dyn HostBridge>,
}

// ============================================================================
// PluginSandbox
// ============================================================================

/// Handle to one plugin's interpreter thread.
///
/// The thread exits when `Shutdown` is sent (also from `Drop`) or when every
/// sender clone is gone. Capability handles cloned into aggregate maps keep
/// their own senders; calls after shutdown fail with a runtime error rather
/// than panicking.
pub struct PluginSandbox {
    plugin_id: String,
    tx: UnboundedSender<SandboxCommand>,
}

impl std::fmt::Debug for PluginSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginSandbox")
            .field("plugin_id", &self.plugin_id)
            .finish()
    }
}

impl PluginSandbox {
    /// Evaluate `source_code` in a fresh interpreter and validate the
    /// lifecycle contract.
    ///
    /// The plugin's top-level initialization code runs exactly once, during
    /// this call. All failures come back as typed `PluginError`s.
    pub async fn load(
        manifest: &PluginManifest,
        source_code: String,
        services: SandboxServices,
    ) -> PluginResult<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (load_tx, load_rx) = oneshot::channel();

        let plugin_id = manifest.id.clone();
        let entry_file = manifest.entry_file.clone();
        let thread_tx = tx.clone();

        thread::Builder::new()
            .name(format!("plugin-{}", plugin_id))
            .spawn(move || {
                interpreter_main(
                    plugin_id,
                    entry_file,
                    source_code,
                    services,
                    thread_tx,
                    rx,
                    load_tx,
                );
            })?;

        load_rx
            .await
            .map_err(|_| PluginError::Runtime("interpreter thread exited during load".into()))??;

        Ok(Self {
            plugin_id: manifest.id.clone(),
            tx,
        })
    }

    /// The owning plugin's id.
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Invoke the module's `activate` export, if any.
    pub async fn activate(&self) -> PluginResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SandboxCommand::Activate { reply: reply_tx })?;
        reply_rx
            .await
            .map_err(|_| PluginError::Runtime("interpreter dropped the activate call".into()))?
    }

    /// Invoke the module's `deactivate` export, if any.
    pub async fn deactivate(&self) -> PluginResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SandboxCommand::Deactivate { reply: reply_tx })?;
        reply_rx
            .await
            .map_err(|_| PluginError::Runtime("interpreter dropped the deactivate call".into()))?
    }

    /// Stop the interpreter thread. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.tx.send(SandboxCommand::Shutdown);
    }

    fn send(&self, command: SandboxCommand) -> PluginResult<()> {
        self.tx
            .send(command)
            .map_err(|_| PluginError::Runtime("plugin interpreter terminated".into()))
    }
}

impl Drop for PluginSandbox {
    fn drop(&mut self) {
        let _ = self.tx.send(SandboxCommand::Shutdown);
    }
}

// ============================================================================
// Sandbox-backed capability handles
// ============================================================================

/// Executable half of a sandboxed tool or command.
struct SandboxCapability {
    kind: CapabilityKind,
    local_id: String,
    tx: UnboundedSender<SandboxCommand>,
}

#[async_trait]
impl ToolExecutable for SandboxCapability {
    async fn execute(&self, arguments: serde_json::Value, cancel: CancellationToken) -> CoreResult<String> {
        let payload = serde_json::to_string(&arguments)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SandboxCommand::ExecuteCapability {
                kind: self.kind,
                local_id: self.local_id.clone(),
                payload,
                reply: reply_tx,
            })
            .map_err(|_| CoreError::execution("plugin interpreter terminated"))?;

        // The script has no view of the token; once cancellation fires we
        // stop waiting on it and let the interpreter finish on its own.
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(CoreError::execution("cancelled"));
            }
            result = reply_rx => {
                result.map_err(|_| CoreError::execution("plugin interpreter dropped the call"))?
            }
        };

        match result {
            Ok(value) => Ok(stringify_output(&value)),
            Err(err) => Err(CoreError::execution(err.to_string())),
        }
    }
}

/// Model capability backed by a plugin's registered `chat` function.
///
/// The script returns one whole turn (`{ text, toolCalls }`); the adapter
/// unfolds it into the unified event stream the orchestrator consumes.
struct SandboxModel {
    namespaced_id: String,
    display_name: String,
    local_id: String,
    tx: UnboundedSender<SandboxCommand>,
}

#[async_trait]
impl LanguageModel for SandboxModel {
    fn id(&self) -> &str {
        &self.namespaced_id
    }

    fn name(&self) -> &str {
        &self.display_name
    }

    async fn chat_turn(
        &self,
        request: TurnRequest,
        tx: tokio::sync::mpsc::Sender<TurnEvent>,
        cancel: CancellationToken,
    ) -> LlmResult<()> {
        let payload = serde_json::to_string(&serde_json::json!({
            "messages": request.messages,
            "tools": request.tools,
        }))
        .map_err(|e| LlmError::InvalidRequest {
            message: e.to_string(),
        })?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SandboxCommand::ExecuteCapability {
                kind: CapabilityKind::Model,
                local_id: self.local_id.clone(),
                payload,
                reply: reply_tx,
            })
            .map_err(|_| LlmError::InvocationFailed {
                message: "plugin interpreter terminated".into(),
            })?;

        let value = tokio::select! {
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            result = reply_rx => {
                result
                    .map_err(|_| LlmError::InvocationFailed {
                        message: "plugin interpreter dropped the call".into(),
                    })?
                    .map_err(|e| LlmError::InvocationFailed {
                        message: e.to_string(),
                    })?
            }
        };

        if let Some(text) = value.get("text").and_then(|v| v.as_str()) {
            if !text.is_empty() {
                let _ = tx
                    .send(TurnEvent::TextDelta {
                        content: text.to_string(),
                    })
                    .await;
            }
        }
        if let Some(calls) = value.get("toolCalls").and_then(|v| v.as_array()) {
            for call in calls {
                let tool_id = call
                    .get("toolId")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let arguments = call.get("arguments").cloned().unwrap_or(serde_json::Value::Null);
                let _ = tx
                    .send(TurnEvent::ToolCallRequested { tool_id, arguments })
                    .await;
            }
        }
        let _ = tx.send(TurnEvent::TurnComplete { stop_reason: None }).await;
        Ok(())
    }
}

fn stringify_output(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Interpreter thread
// ============================================================================

#[allow(clippy::too_many_arguments)]
fn interpreter_main(
    plugin_id: String,
    entry_file: String,
    source_code: String,
    services: SandboxServices,
    command_tx: UnboundedSender<SandboxCommand>,
    mut command_rx: UnboundedReceiver<SandboxCommand>,
    load_reply: oneshot::Sender<PluginResult<()>>,
) {
    let runtime = match Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            let _ = load_reply.send(Err(PluginError::Runtime(format!(
                "interpreter init failed: {err}"
            ))));
            return;
        }
    };

    let failed_import: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    runtime.set_loader(
        CapabilityResolver {
            failed_import: failed_import.clone(),
        },
        CapabilityLoader,
    );

    let context = match Context::full(&runtime) {
        Ok(context) => context,
        Err(err) => {
            let _ = load_reply.send(Err(PluginError::Runtime(format!(
                "interpreter context failed: {err}"
            ))));
            return;
        }
    };

    let setup = context.with(|ctx| -> PluginResult<()> {
        install_host_api(&ctx, &plugin_id, &services, &command_tx)?;
        ctx.eval::<(), _>(BOOTSTRAP_SOURCE)
            .map_err(|err| PluginError::Runtime(describe_js_error(&ctx, err)))?;
        evaluate_plugin_module(&ctx, &entry_file, &source_code, &failed_import)
    });

    match setup {
        Ok(()) => {
            if load_reply.send(Ok(())).is_err() {
                return;
            }
        }
        Err(err) => {
            let _ = load_reply.send(Err(err));
            return;
        }
    }

    tracing::debug!(plugin = %plugin_id, "plugin interpreter ready");

    while let Some(command) = command_rx.blocking_recv() {
        match command {
            SandboxCommand::Activate { reply } => {
                let result = context.with(|ctx| invoke_lifecycle(&ctx, "__plugin_activate"));
                let _ = reply.send(result);
            }
            SandboxCommand::Deactivate { reply } => {
                let result = context.with(|ctx| invoke_lifecycle(&ctx, "__plugin_deactivate"));
                let _ = reply.send(result);
            }
            SandboxCommand::ExecuteCapability {
                kind,
                local_id,
                payload,
                reply,
            } => {
                let result =
                    context.with(|ctx| invoke_capability(&ctx, kind, &local_id, &payload));
                let _ = reply.send(result);
            }
            SandboxCommand::Shutdown => break,
        }
    }

    tracing::debug!(plugin = %plugin_id, "plugin interpreter stopped");
}

/// Restricted resolver: only the capability module resolves. The failed
/// specifier is recorded so load errors classify as `UnknownImport`.
struct CapabilityResolver {
    failed_import: Arc<Mutex<Option<String>>>,
}

impl Resolver for CapabilityResolver {
    fn resolve(&mut self, _ctx: &Ctx<'_>, base: &str, name: &str) -> rquickjs::Result<String> {
        if name == CAPABILITY_MODULE {
            Ok(name.to_string())
        } else {
            *self.failed_import.lock().expect("failed import lock") = Some(name.to_string());
            Err(JsError::new_resolving(base, name))
        }
    }
}

struct CapabilityLoader;

impl Loader for CapabilityLoader {
    fn load<'js>(&mut self, ctx: &Ctx<'js>, name: &str) -> rquickjs::Result<Module<'js, Declared>> {
        if name == CAPABILITY_MODULE {
            Module::declare(ctx.clone(), name, CAPABILITY_MODULE_SOURCE)
        } else {
            Err(JsError::new_loading(name))
        }
    }
}

fn install_host_api(
    ctx: &Ctx<'_>,
    plugin_id: &str,
    services: &SandboxServices,
    command_tx: &UnboundedSender<SandboxCommand>,
) -> PluginResult<()> {
    let host = Object::new(ctx.clone())
        .map_err(|err| PluginError::Runtime(describe_js_error(ctx, err)))?;

    {
        let registrar = services.registrar.clone();
        let tx = command_tx.clone();
        host.set(
            "register",
            Func::from(move |ctx: Ctx<'_>, kind: String, meta: String| -> rquickjs::Result<()> {
                register_capability(&registrar, &tx, &kind, &meta)
                    .map_err(|message| throw_message(&ctx, &message))
            }),
        )
        .map_err(|err| PluginError::Runtime(describe_js_error(ctx, err)))?;
    }

    {
        let registrar = services.registrar.clone();
        let bridge = services.bridge.clone();
        host.set(
            "call",
            Func::from(
                move |ctx: Ctx<'_>, method: String, payload: String| -> rquickjs::Result<String> {
                    dispatch_host_call(bridge.as_ref(), &registrar, &method, &payload)
                        .map_err(|()| throw_message(&ctx, HOST_BRIDGE_ERROR))
                },
            ),
        )
        .map_err(|err| PluginError::Runtime(describe_js_error(ctx, err)))?;
    }

    {
        let plugin = plugin_id.to_string();
        host.set(
            "log",
            Func::from(move |_ctx: Ctx<'_>, level: String, message: String| -> rquickjs::Result<()> {
                match level.as_str() {
                    "debug" => tracing::debug!(plugin = %plugin, "{}", message),
                    "warn" => tracing::warn!(plugin = %plugin, "{}", message),
                    "error" => tracing::error!(plugin = %plugin, "{}", message),
                    _ => tracing::info!(plugin = %plugin, "{}", message),
                }
                Ok(())
            }),
        )
        .map_err(|err| PluginError::Runtime(describe_js_error(ctx, err)))?;
    }

    ctx.globals()
        .set("__colloquy", host)
        .map_err(|err| PluginError::Runtime(describe_js_error(ctx, err)))
}

/// Parse one registration from the capability module and store it.
fn register_capability(
    registrar: &Registrar,
    tx: &UnboundedSender<SandboxCommand>,
    kind: &str,
    meta: &str,
) -> Result<(), String> {
    match kind {
        "setting" => {
            let declaration: SettingDeclaration = serde_json::from_str(meta)
                .map_err(|e| format!("invalid setting declaration: {e}"))?;
            registrar.register_setting(declaration);
        }
        "tool" => {
            let declaration: ToolDeclaration =
                serde_json::from_str(meta).map_err(|e| format!("invalid tool declaration: {e}"))?;
            let execute = Arc::new(SandboxCapability {
                kind: CapabilityKind::Tool,
                local_id: declaration.id.clone(),
                tx: tx.clone(),
            });
            registrar.register_tool(declaration, execute);
        }
        "command" => {
            let declaration: CommandDeclaration = serde_json::from_str(meta)
                .map_err(|e| format!("invalid command declaration: {e}"))?;
            let run = Arc::new(SandboxCapability {
                kind: CapabilityKind::Command,
                local_id: declaration.id.clone(),
                tx: tx.clone(),
            });
            registrar.register_command(declaration, run);
        }
        "model" => {
            let declaration: ModelDeclaration = serde_json::from_str(meta)
                .map_err(|e| format!("invalid model declaration: {e}"))?;
            let model = Arc::new(SandboxModel {
                namespaced_id: namespaced_id(registrar.plugin_id(), &declaration.id),
                display_name: if declaration.name.is_empty() {
                    declaration.id.clone()
                } else {
                    declaration.name.clone()
                },
                local_id: declaration.id.clone(),
                tx: tx.clone(),
            });
            registrar.register_model(declaration, model);
        }
        "chat_node_renderer" => {
            let declaration: RendererDeclaration = serde_json::from_str(meta)
                .map_err(|e| format!("invalid renderer declaration: {e}"))?;
            registrar.register_chat_node_renderer(declaration);
        }
        other => return Err(format!("unknown capability kind: {other}")),
    }
    Ok(())
}

/// Evaluate the plugin entry module and validate the lifecycle contract.
fn evaluate_plugin_module(
    ctx: &Ctx<'_>,
    entry_file: &str,
    source_code: &str,
    failed_import: &Arc<Mutex<Option<String>>>,
) -> PluginResult<()> {
    let declared = Module::declare(ctx.clone(), entry_file, source_code)
        .map_err(|err| classify_load_error(ctx, err, failed_import))?;
    let (module, promise) = declared
        .eval()
        .map_err(|err| classify_load_error(ctx, err, failed_import))?;
    promise
        .finish::<JsValue>()
        .map_err(|err| classify_load_error(ctx, err, failed_import))?;

    let namespace = module
        .namespace()
        .map_err(|err| PluginError::Evaluation(describe_js_error(ctx, err)))?;

    let activate: JsValue = namespace
        .get("activate")
        .map_err(|err| PluginError::Evaluation(describe_js_error(ctx, err)))?;
    if !activate.is_function() {
        return Err(PluginError::InvalidPluginContract(
            "module does not export an `activate` function".into(),
        ));
    }

    let globals = ctx.globals();
    globals
        .set("__plugin_activate", activate)
        .map_err(|err| PluginError::Runtime(describe_js_error(ctx, err)))?;

    let deactivate: JsValue = namespace
        .get("deactivate")
        .map_err(|err| PluginError::Evaluation(describe_js_error(ctx, err)))?;
    if deactivate.is_undefined() || deactivate.is_null() {
        return Ok(());
    }
    if !deactivate.is_function() {
        return Err(PluginError::InvalidPluginContract(
            "`deactivate` export is not callable".into(),
        ));
    }
    globals
        .set("__plugin_deactivate", deactivate)
        .map_err(|err| PluginError::Runtime(describe_js_error(ctx, err)))
}

/// A load failure is an `UnknownImport` when the resolver recorded one;
/// everything else is an evaluation failure.
fn classify_load_error(
    ctx: &Ctx<'_>,
    err: JsError,
    failed_import: &Arc<Mutex<Option<String>>>,
) -> PluginError {
    if let Some(name) = failed_import.lock().expect("failed import lock").take() {
        return PluginError::UnknownImport(name);
    }
    PluginError::Evaluation(describe_js_error(ctx, err))
}

/// Call `__plugin_activate` / `__plugin_deactivate` through the lifecycle
/// helper, driving any returned promise to completion.
fn invoke_lifecycle(ctx: &Ctx<'_>, slot: &str) -> PluginResult<()> {
    let helper: Function = ctx
        .globals()
        .get("__lifecycle_invoke")
        .map_err(|err| PluginError::Runtime(describe_js_error(ctx, err)))?;
    let promise: Promise = helper
        .call((slot,))
        .map_err(|err| PluginError::Runtime(describe_js_error(ctx, err)))?;
    promise
        .finish::<JsValue>()
        .map_err(|err| PluginError::Runtime(describe_js_error(ctx, err)))?;
    Ok(())
}

/// Invoke a registered capability function by id and parse its JSON result.
fn invoke_capability(
    ctx: &Ctx<'_>,
    kind: CapabilityKind,
    local_id: &str,
    payload: &str,
) -> PluginResult<serde_json::Value> {
    let helper: Function = ctx
        .globals()
        .get("__capability_invoke")
        .map_err(|err| PluginError::Runtime(describe_js_error(ctx, err)))?;
    let promise: Promise = helper
        .call((kind.store_key(), local_id, payload))
        .map_err(|err| PluginError::Runtime(describe_js_error(ctx, err)))?;
    let raw: String = promise
        .finish()
        .map_err(|err| PluginError::Runtime(describe_js_error(ctx, err)))?;
    serde_json::from_str(&raw)
        .map_err(|err| PluginError::Runtime(format!("capability returned invalid JSON: {err}")))
}

/// Turn a message into a thrown JS error.
fn throw_message(ctx: &Ctx<'_>, message: &str) -> JsError {
    match message.to_string().into_js(ctx) {
        Ok(value) => ctx.throw(value),
        Err(err) => err,
    }
}

/// Best-effort description of a JS-side failure.
fn describe_js_error(ctx: &Ctx<'_>, err: JsError) -> String {
    if matches!(err, JsError::Exception) {
        let caught = ctx.catch();
        if let Some(obj) = caught.as_object() {
            if let Ok(message) = obj.get::<_, String>("message") {
                return message;
            }
        }
        if let Some(s) = caught.as_string() {
            if let Ok(s) = s.to_string() {
                return s;
            }
        }
        return "uncaught exception".to_string();
    }
    err.to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatMessage, ChatRecord};
    use crate::services::plugins::host::{ChatMessagesQuery, Notification};
    use tokio::sync::broadcast;

    fn manifest(id: &str) -> PluginManifest {
        PluginManifest {
            id: id.to_string(),
            name: id.to_string(),
            entry_file: "index.js".to_string(),
            ..PluginManifest::default()
        }
    }

    struct OkBridge;

    impl HostBridge for OkBridge {
        fn get_llm(&self, namespaced_id: &str) -> Result<ModelDeclaration, String> {
            Ok(ModelDeclaration {
                id: namespaced_id.to_string(),
                name: "ok".to_string(),
            })
        }

        fn show_notification(&self, _notification: Notification) -> Result<(), String> {
            Ok(())
        }

        fn get_chat(&self, chat_id: &str) -> Result<ChatRecord, String> {
            Ok(ChatRecord {
                id: chat_id.to_string(),
                name: "Chat".to_string(),
                created_at: chrono::Utc::now(),
            })
        }

        fn rename_chat(&self, _chat_id: &str, _name: &str) -> Result<(), String> {
            Ok(())
        }

        fn get_chat_messages(&self, _query: ChatMessagesQuery) -> Result<Vec<ChatMessage>, String> {
            Ok(vec![])
        }
    }

    struct BrokenBridge;

    impl HostBridge for BrokenBridge {
        fn get_llm(&self, _namespaced_id: &str) -> Result<ModelDeclaration, String> {
            Err("internal: registry poisoned".to_string())
        }

        fn show_notification(&self, _notification: Notification) -> Result<(), String> {
            Err("internal: window gone".to_string())
        }

        fn get_chat(&self, _chat_id: &str) -> Result<ChatRecord, String> {
            Err("internal: sqlite locked at /tmp/db".to_string())
        }

        fn rename_chat(&self, _chat_id: &str, _name: &str) -> Result<(), String> {
            Err("internal".to_string())
        }

        fn get_chat_messages(&self, _query: ChatMessagesQuery) -> Result<Vec<ChatMessage>, String> {
            Err("internal".to_string())
        }
    }

    fn services_with(bridge: Arc<dyn HostBridge>) -> (Registrar, SandboxServices) {
        let (events, _) = broadcast::channel(32);
        let registrar = Registrar::new("acme", events);
        let services = SandboxServices {
            registrar: registrar.clone(),
            bridge,
        };
        (registrar, services)
    }

    async fn load(source: &str) -> (Registrar, PluginResult<PluginSandbox>) {
        let (registrar, services) = services_with(Arc::new(OkBridge));
        let sandbox = PluginSandbox::load(&manifest("acme"), source.to_string(), services).await;
        (registrar, sandbox)
    }

    #[tokio::test]
    async fn test_load_minimal_plugin() {
        let (_registrar, sandbox) = load("export function activate() {}").await;
        let sandbox = sandbox.unwrap();
        sandbox.activate().await.unwrap();
        sandbox.deactivate().await.unwrap();
    }

    #[tokio::test]
    async fn test_load_missing_activate_is_contract_error() {
        let (_registrar, sandbox) = load("export const x = 1;").await;
        match sandbox {
            Err(PluginError::InvalidPluginContract(msg)) => {
                assert!(msg.contains("activate"));
            }
            other => panic!("expected contract error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_load_non_callable_deactivate_is_contract_error() {
        let (_registrar, sandbox) =
            load("export function activate() {}\nexport const deactivate = 42;").await;
        assert!(matches!(
            sandbox,
            Err(PluginError::InvalidPluginContract(_))
        ));
    }

    #[tokio::test]
    async fn test_load_unknown_import() {
        let (_registrar, sandbox) =
            load("import fs from \"fs\";\nexport function activate() {}").await;
        match sandbox {
            Err(PluginError::UnknownImport(name)) => assert_eq!(name, "fs"),
            other => panic!("expected UnknownImport, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_load_syntax_error_is_evaluation_error() {
        let (_registrar, sandbox) = load("export function activate( {").await;
        assert!(matches!(sandbox, Err(PluginError::Evaluation(_))));
    }

    #[tokio::test]
    async fn test_load_top_level_throw_is_evaluation_error() {
        let (_registrar, sandbox) =
            load("throw new Error(\"boom\");\nexport function activate() {}").await;
        match sandbox {
            Err(PluginError::Evaluation(msg)) => assert!(msg.contains("boom"), "got {msg}"),
            other => panic!("expected Evaluation, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_activate_registers_tool() {
        let source = r#"
            import { registerTool } from "colloquy";
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
            }
        "#;
        let (registrar, sandbox) = load(source).await;
        let sandbox = sandbox.unwrap();
        sandbox.activate().await.unwrap();

        let snapshot = registrar.snapshot();
        let tool = snapshot.tools().get("add").expect("tool registered");
        assert_eq!(tool.declaration.description, "Adds two numbers");

        let output = tool
            .execute
            .execute(
                serde_json::json!({"a": 2, "b": 2}),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(output, "4");
    }

    #[tokio::test]
    async fn test_async_tool_execution() {
        let source = r#"
            import { registerTool } from "colloquy";
            export function activate() {
                registerTool({
                    id: "later",
                    async execute(args) { return "done:" + args.tag; }
                });
            }
        "#;
        let (registrar, sandbox) = load(source).await;
        let sandbox = sandbox.unwrap();
        sandbox.activate().await.unwrap();

        let snapshot = registrar.snapshot();
        let tool = snapshot.tools().get("later").unwrap();
        let output = tool
            .execute
            .execute(serde_json::json!({"tag": "x"}), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output, "done:x");
    }

    #[tokio::test]
    async fn test_tool_throw_surfaces_as_execution_error() {
        let source = r#"
            import { registerTool } from "colloquy";
            export function activate() {
                registerTool({
                    id: "bad",
                    execute() { throw new Error("tool exploded"); }
                });
            }
        "#;
        let (registrar, sandbox) = load(source).await;
        let sandbox = sandbox.unwrap();
        sandbox.activate().await.unwrap();

        let snapshot = registrar.snapshot();
        let tool = snapshot.tools().get("bad").unwrap();
        let result = tool
            .execute
            .execute(serde_json::json!({}), CancellationToken::new())
            .await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("tool exploded"), "got {err}");
    }

    #[tokio::test]
    async fn test_activate_throw_surfaces_but_load_succeeded() {
        let source = r#"
            export function activate() { throw new Error("activate failed"); }
        "#;
        let (_registrar, sandbox) = load(source).await;
        let sandbox = sandbox.unwrap();
        let err = sandbox.activate().await.unwrap_err();
        assert!(err.to_string().contains("activate failed"));
    }

    #[tokio::test]
    async fn test_host_bridge_failure_is_generic_in_plugin_code() {
        let source = r#"
            import { registerTool, getChat } from "colloquy";
            export function activate() {
                let observed = "no error";
                try {
                    getChat("some-chat");
                } catch (err) {
                    observed = String(err);
                }
                registerTool({ id: "probe", description: observed });
            }
        "#;
        let (events, _) = broadcast::channel(32);
        let registrar = Registrar::new("acme", events);
        let services = SandboxServices {
            registrar: registrar.clone(),
            bridge: Arc::new(BrokenBridge),
        };
        let sandbox = PluginSandbox::load(&manifest("acme"), source.to_string(), services)
            .await
            .unwrap();
        sandbox.activate().await.unwrap();

        let snapshot = registrar.snapshot();
        let description = &snapshot.tools().get("probe").unwrap().declaration.description;
        assert!(
            description.contains(HOST_BRIDGE_ERROR),
            "plugin saw: {description}"
        );
        assert!(
            !description.contains("sqlite"),
            "internal detail leaked: {description}"
        );
    }

    #[tokio::test]
    async fn test_host_bridge_success_roundtrip() {
        let source = r#"
            import { registerTool, getChat } from "colloquy";
            export function activate() {
                const chat = getChat("chat-7");
                registerTool({ id: "probe", description: chat.id + "/" + chat.name });
            }
        "#;
        let (registrar, sandbox) = load(source).await;
        sandbox.unwrap().activate().await.unwrap();

        let snapshot = registrar.snapshot();
        assert_eq!(
            snapshot.tools().get("probe").unwrap().declaration.description,
            "chat-7/Chat"
        );
    }

    #[tokio::test]
    async fn test_registered_model_turn() {
        let source = r#"
            import { registerModel } from "colloquy";
            export function activate() {
                registerModel({
                    id: "echo",
                    name: "Echo Model",
                    chat(request) {
                        const last = request.messages[request.messages.length - 1];
                        return {
                            text: "echo: " + last.content[0].text,
                            toolCalls: []
                        };
                    }
                });
            }
        "#;
        let (registrar, sandbox) = load(source).await;
        let sandbox = sandbox.unwrap();
        sandbox.activate().await.unwrap();

        let snapshot = registrar.snapshot();
        let model = snapshot.models().get("echo").unwrap().model.clone();
        assert_eq!(model.id(), "acme:echo");
        assert_eq!(model.name(), "Echo Model");

        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        model
            .chat_turn(
                TurnRequest {
                    messages: vec![colloquy_llm::Message::user("hi")],
                    tools: vec![],
                },
                tx,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(
            first,
            TurnEvent::TextDelta {
                content: "echo: hi".to_string()
            }
        );
        assert!(matches!(
            rx.recv().await.unwrap(),
            TurnEvent::TurnComplete { .. }
        ));
    }

    #[tokio::test]
    async fn test_settings_and_renderer_registration() {
        let source = r#"
            import { registerSetting, registerChatNodeRenderer } from "colloquy";
            export function activate() {
                registerSetting({ id: "api_key", title: "API Key" });
                registerSetting({ id: "depth", title: "Depth", kind: "number", default: 3 });
                registerChatNodeRenderer({ nodeType: "chart" });
            }
        "#;
        let (registrar, sandbox) = load(source).await;
        sandbox.unwrap().activate().await.unwrap();

        let snapshot = registrar.snapshot();
        assert_eq!(snapshot.settings().len(), 2);
        assert_eq!(
            snapshot.settings().get("depth").unwrap().default,
            Some(serde_json::json!(3))
        );
        assert!(snapshot.chat_node_renderers().contains_key("chart"));
    }

    #[tokio::test]
    async fn test_deactivate_export_runs() {
        let source = r#"
            import { registerTool } from "colloquy";
            let active = false;
            export function activate() { active = true; }
            export function deactivate() {
                registerTool({ id: "was_active", description: String(active) });
            }
        "#;
        let (registrar, sandbox) = load(source).await;
        let sandbox = sandbox.unwrap();
        sandbox.activate().await.unwrap();
        sandbox.deactivate().await.unwrap();

        let snapshot = registrar.snapshot();
        assert_eq!(
            snapshot.tools().get("was_active").unwrap().declaration.description,
            "true"
        );
    }

    #[tokio::test]
    async fn test_shutdown_then_call_fails_cleanly() {
        let (_registrar, sandbox) = load("export function activate() {}").await;
        let sandbox = sandbox.unwrap();
        sandbox.shutdown();
        // Give the interpreter thread a moment to drain the queue.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let result = sandbox.activate().await;
        assert!(result.is_err());
    }
}
