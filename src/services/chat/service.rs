//! Chat Orchestrator
//!
//! Drives the generation loop: prompt assembly, model invocation, streaming
//! event consumption, concurrent tool dispatch, iteration bounding,
//! cancellation, and persistence handoff.
//!
//! One generation per chat at a time: a per-chat pending map holds the
//! cancellation controller, and a second `send_message` while one is
//! pending is a no-op. Within a turn, tool calls resolve concurrently; their
//! transcript nodes appear in emission order while terminal statuses are
//! written back in completion order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use colloquy_core::streaming::TurnEvent;
use colloquy_llm::{LanguageModel, LlmError, Message, MessageContent, TurnRequest};

use crate::models::chat::{
    ChatMessage, ContentNode, MessageStatus, ToolCallRecord, ToolCallStatus,
};
use crate::services::plugins::PluginManager;
use crate::storage::ChatStore;

use super::events::ChatEvent;
use super::executor::{ToolCallExecutor, ToolOutcome, TOOL_NOT_FOUND};
use super::prompt::{build_prompt, DEFAULT_SYSTEM_PROMPT};
use super::transcript::MessageTranscript;

/// Hard bound on model invocations within one generation.
pub const MAX_GENERATION_ITERATIONS: usize = 25;

/// Capacity of the chat event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the per-turn model event channel.
const TURN_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// Request / Outcome Types
// ============================================================================

/// One `send_message` request.
#[derive(Debug, Clone)]
pub struct SendMessageParams {
    /// Target chat
    pub chat_id: String,
    /// The user's message text
    pub text: String,
    /// Namespaced id of the model capability to drive
    pub model_id: String,
    /// Namespaced ids of the tools enabled for this generation
    pub enabled_tools: Vec<String>,
}

/// Why a generation loop stopped.
///
/// The iteration cap is deliberately a reported condition rather than a
/// silent stop or an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model produced a turn with no tool calls
    Exhausted,
    /// The generation was cancelled cooperatively
    Cancelled,
    /// The loop hit `MAX_GENERATION_ITERATIONS`
    IterationCap,
}

/// Result of one completed generation.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    /// The persisted user message
    pub user_message: ChatMessage,
    /// The persisted assistant message (`status = complete`)
    pub assistant_message: ChatMessage,
    /// Why the loop stopped
    pub stop_reason: StopReason,
    /// Number of model invocations performed
    pub iterations: usize,
    /// Every tool call dispatched during the generation
    pub tool_calls: Vec<ToolCallRecord>,
}

/// Failures that abort a generation.
///
/// Cancellation is not an error: a cancelled generation completes with
/// `StopReason::Cancelled` and keeps its partial transcript.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// The requested model capability does not exist
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// The model capability failed mid-generation
    #[error("Model invocation failed: {0}")]
    Model(LlmError),

    /// The storage collaborator failed
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type alias for generation operations
pub type GenerationResult<T> = Result<T, GenerationError>;

// ============================================================================
// ChatService
// ============================================================================

/// The chat orchestrator.
pub struct ChatService {
    plugins: Arc<PluginManager>,
    store: Arc<dyn ChatStore>,
    events: broadcast::Sender<ChatEvent>,
    /// Per-chat cancellation controllers; presence marks a pending generation.
    pending: Mutex<HashMap<String, CancellationToken>>,
    system_prompt: String,
}

impl std::fmt::Debug for ChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatService")
            .field("pending", &self.pending.lock().expect("pending lock").len())
            .finish()
    }
}

impl ChatService {
    /// Create an orchestrator over the given capability source and store.
    pub fn new(plugins: Arc<PluginManager>, store: Arc<dyn ChatStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            plugins,
            store,
            events,
            pending: Mutex::new(HashMap::new()),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Override the system prompt.
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    /// Subscribe to generation events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    /// Whether a generation is pending for `chat_id`.
    pub fn is_pending(&self, chat_id: &str) -> bool {
        self.pending
            .lock()
            .expect("pending lock")
            .contains_key(chat_id)
    }

    /// Signal the stored cancellation controller for a chat, if any.
    /// Idempotent when none exists.
    pub fn cancel_response(&self, chat_id: &str) {
        if let Some(token) = self.pending.lock().expect("pending lock").get(chat_id) {
            tracing::debug!(chat = %chat_id, "cancelling in-flight generation");
            token.cancel();
        }
    }

    /// Run one full generation for a user message.
    ///
    /// Returns `Ok(None)` without doing anything when a generation is
    /// already pending for the chat (callers must cancel first). On any
    /// failure other than cancellation, both provisional messages are
    /// retracted and the error is re-raised.
    pub async fn send_message(
        &self,
        params: SendMessageParams,
    ) -> GenerationResult<Option<GenerationOutcome>> {
        let chat_id = params.chat_id.clone();
        let cancel = {
            let mut pending = self.pending.lock().expect("pending lock");
            if pending.contains_key(&chat_id) {
                tracing::debug!(chat = %chat_id, "generation already pending; ignoring send");
                return Ok(None);
            }
            let token = CancellationToken::new();
            pending.insert(chat_id.clone(), token.clone());
            token
        };

        let result = self.run_generation(&params, cancel).await;

        // The pending flag clears on every exit path; the controller is
        // discarded with it.
        self.pending.lock().expect("pending lock").remove(&chat_id);

        result.map(Some)
    }

    async fn run_generation(
        &self,
        params: &SendMessageParams,
        cancel: CancellationToken,
    ) -> GenerationResult<GenerationOutcome> {
        let model = self
            .plugins
            .get_llm(&params.model_id)
            .ok_or_else(|| GenerationError::ModelNotFound(params.model_id.clone()))?;

        let history = self
            .store
            .list_messages(&params.chat_id)
            .await
            .map_err(|e| GenerationError::Storage(e.to_string()))?;

        // Both messages surface to observers immediately, before the model
        // produces anything.
        let user_message = ChatMessage::user(&params.chat_id, &params.text);
        let mut assistant_message = ChatMessage::assistant_pending(&params.chat_id);
        let _ = self.events.send(ChatEvent::MessageCreated {
            message: user_message.clone(),
        });
        let _ = self.events.send(ChatEvent::MessageCreated {
            message: assistant_message.clone(),
        });

        let loop_result = self
            .generation_loop(params, &model, &history, &assistant_message, cancel)
            .await;

        match loop_result {
            Ok(turn) => {
                assistant_message.content = turn.nodes;
                assistant_message.status = Some(MessageStatus::Complete);
                let _ = self.events.send(ChatEvent::MessageCompleted {
                    chat_id: params.chat_id.clone(),
                    message_id: assistant_message.id.clone(),
                });

                for call in turn.tool_calls.iter().filter(|c| c.is_finalized()) {
                    self.store
                        .create_tool_call(call)
                        .await
                        .map_err(|e| GenerationError::Storage(e.to_string()))?;
                }
                self.store
                    .create_message(&user_message)
                    .await
                    .map_err(|e| GenerationError::Storage(e.to_string()))?;
                self.store
                    .create_message(&assistant_message)
                    .await
                    .map_err(|e| GenerationError::Storage(e.to_string()))?;

                Ok(GenerationOutcome {
                    user_message,
                    assistant_message,
                    stop_reason: turn.stop_reason,
                    iterations: turn.iterations,
                    tool_calls: turn.tool_calls,
                })
            }
            Err(err) => {
                // Non-cancellation failure: both provisional messages are
                // retracted entirely, then the failure re-raises.
                let _ = self.events.send(ChatEvent::MessagesRetracted {
                    chat_id: params.chat_id.clone(),
                    message_ids: vec![user_message.id.clone(), assistant_message.id.clone()],
                });
                Err(err)
            }
        }
    }

    async fn generation_loop(
        &self,
        params: &SendMessageParams,
        model: &Arc<dyn LanguageModel>,
        history: &[ChatMessage],
        assistant: &ChatMessage,
        cancel: CancellationToken,
    ) -> GenerationResult<FinishedLoop> {
        let mut transcript = MessageTranscript::new();
        {
            let events = self.events.clone();
            let chat_id = params.chat_id.clone();
            let message_id = assistant.id.clone();
            transcript.on_change(Box::new(move |nodes| {
                let _ = events.send(ChatEvent::TranscriptUpdated {
                    chat_id: chat_id.clone(),
                    message_id: message_id.clone(),
                    nodes,
                });
            }));
        }

        // Tool definitions are built once, from the aggregate as it exists
        // right now; per-call resolution below re-reads at dispatch time.
        let tool_definitions = self.plugins.tool_definitions(&params.enabled_tools);
        let mut messages = build_prompt(&self.system_prompt, history, &params.text);
        let mut assistant_prompt_index: Option<usize> = None;
        let mut all_tool_calls: Vec<ToolCallRecord> = Vec::new();
        let mut iterations = 0usize;

        let stop_reason = loop {
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if iterations == MAX_GENERATION_ITERATIONS {
                tracing::warn!(
                    chat = %params.chat_id,
                    iterations,
                    "generation stopped at the iteration cap"
                );
                break StopReason::IterationCap;
            }
            iterations += 1;

            let (event_tx, mut event_rx) = mpsc::channel::<TurnEvent>(TURN_CHANNEL_CAPACITY);
            let turn_task = {
                let model = model.clone();
                let request = TurnRequest {
                    messages: messages.clone(),
                    tools: tool_definitions.clone(),
                };
                let cancel = cancel.clone();
                tokio::spawn(async move { model.chat_turn(request, event_tx, cancel).await })
            };

            let mut resolutions: JoinSet<(String, ToolOutcome)> = JoinSet::new();
            let mut turn_calls: Vec<ToolCallRecord> = Vec::new();
            let mut cancelled_mid_turn = false;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        cancelled_mid_turn = true;
                        break;
                    }
                    event = event_rx.recv() => {
                        let Some(event) = event else { break };
                        match event {
                            TurnEvent::TextDelta { content } => {
                                transcript.append_node(ContentNode::text(content));
                            }
                            TurnEvent::ToolCallRequested { tool_id, arguments } => {
                                let mut record = ToolCallRecord::pending(&tool_id, arguments.clone());
                                transcript.append_node(ContentNode::tool_call_pending(
                                    &tool_id,
                                    &record.id,
                                    arguments.clone(),
                                ));

                                // Resolve against the aggregate at dispatch
                                // time, not against a snapshot.
                                match self.plugins.get_tool(&tool_id) {
                                    Some(tool) => {
                                        let call_id = record.id.clone();
                                        let cancel = cancel.clone();
                                        resolutions.spawn(async move {
                                            let outcome = ToolCallExecutor::execute(
                                                &tool, &arguments, cancel,
                                            )
                                            .await;
                                            (call_id, outcome)
                                        });
                                    }
                                    None => {
                                        record.finalize_error(Some(TOOL_NOT_FOUND.to_string()));
                                        transcript.finalize_tool_call(
                                            &record.id,
                                            ToolCallStatus::Error,
                                            None,
                                            Some(TOOL_NOT_FOUND.to_string()),
                                        );
                                    }
                                }
                                turn_calls.push(record);
                            }
                            TurnEvent::TurnComplete { .. } => break,
                        }
                    }
                }
            }
            drop(event_rx);

            if cancelled_mid_turn {
                // Stop acting on further callbacks; in-flight work is left
                // to observe the shared signal on its own.
                turn_task.abort();
                resolutions.abort_all();
                all_tool_calls.extend(turn_calls);
                break StopReason::Cancelled;
            }

            match turn_task.await {
                Ok(Ok(())) => {}
                Ok(Err(LlmError::Cancelled)) => {
                    all_tool_calls.extend(turn_calls);
                    break StopReason::Cancelled;
                }
                Ok(Err(err)) => return Err(GenerationError::Model(err)),
                Err(join_err) => {
                    return Err(GenerationError::Model(LlmError::InvocationFailed {
                        message: join_err.to_string(),
                    }))
                }
            }

            // All tool calls from this turn resolve jointly; completion
            // order is not guaranteed and does not matter here.
            while let Some(joined) = resolutions.join_next().await {
                match joined {
                    Ok((call_id, outcome)) => {
                        apply_outcome(&mut transcript, &mut turn_calls, &call_id, outcome);
                    }
                    Err(join_err) => {
                        tracing::warn!(error = %join_err, "tool resolution task panicked");
                    }
                }
            }

            // The assistant message joins the prompt history once after the
            // first invocation and is kept current afterwards.
            let assistant_text = transcript.plain_text();
            match assistant_prompt_index {
                None => {
                    messages.push(Message::assistant(assistant_text));
                    assistant_prompt_index = Some(messages.len() - 1);
                }
                Some(index) => {
                    if let Some(MessageContent::Text { text }) = messages[index].content.first_mut()
                    {
                        *text = assistant_text;
                    }
                }
            }
            if let Some(index) = assistant_prompt_index {
                for call in &turn_calls {
                    messages[index].content.push(MessageContent::ToolUse {
                        id: call.id.clone(),
                        name: call.tool_id.clone(),
                        input: call.arguments.clone(),
                    });
                }
            }
            for call in &turn_calls {
                let (content, is_error) = match call.status {
                    ToolCallStatus::Success => {
                        (call.result.clone().unwrap_or_default(), false)
                    }
                    _ => (
                        call.error.clone().unwrap_or_else(|| "Unknown error".to_string()),
                        true,
                    ),
                };
                messages.push(Message::tool_result(&call.id, content, is_error));
            }

            let had_tool_calls = !turn_calls.is_empty();
            all_tool_calls.extend(turn_calls);

            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            // A turn with text but no tool calls ends the loop.
            if !had_tool_calls {
                break StopReason::Exhausted;
            }
        };

        Ok(FinishedLoop {
            nodes: transcript.into_nodes(),
            stop_reason,
            iterations,
            tool_calls: all_tool_calls,
        })
    }
}

/// What the generation loop hands back to the persistence stage.
struct FinishedLoop {
    nodes: Vec<ContentNode>,
    stop_reason: StopReason,
    iterations: usize,
    tool_calls: Vec<ToolCallRecord>,
}

/// Write one resolution back into the matching record and transcript node.
fn apply_outcome(
    transcript: &mut MessageTranscript,
    turn_calls: &mut [ToolCallRecord],
    call_id: &str,
    outcome: ToolOutcome,
) {
    if let Some(record) = turn_calls.iter_mut().find(|c| c.id == call_id) {
        match outcome.status {
            ToolCallStatus::Success => {
                record.finalize_success(outcome.result.clone().unwrap_or_default())
            }
            _ => record.finalize_error(outcome.error.clone()),
        }
    }
    transcript.finalize_tool_call(call_id, outcome.status, outcome.result, outcome.error);
}

// ============================================================================
// Tests
// ============================================================================
