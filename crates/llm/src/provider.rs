//! Language Model Capability Trait
//!
//! Defines the common interface every model capability implements, whether
//! contributed by a plugin or built as a test double.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::types::{LlmResult, Message, ToolDefinition};
use colloquy_core::streaming::TurnEvent;

/// Everything one model turn needs: the prompt so far and the tools the
/// model may call this turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// Full prompt message sequence, system prompt first
    pub messages: Vec<Message>,
    /// Tool definitions available to the model this turn
    pub tools: Vec<ToolDefinition>,
}

/// Trait that all model capabilities implement.
///
/// One call to `chat_turn` produces one assistant response: the
/// implementation streams `TurnEvent`s into `tx` (text deltas and tool-call
/// requests in emission order) and finishes with `TurnComplete`. Events for
/// a single invocation are delivered sequentially; the consumer needs no
/// additional locking.
///
/// Implementations observe `cancel` cooperatively: once it fires they stop
/// emitting events and return. The caller never forcibly terminates a turn.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Namespaced capability id (`plugin:local`).
    fn id(&self) -> &str;

    /// Human-readable model name.
    fn name(&self) -> &str;

    /// Run one streamed turn.
    async fn chat_turn(
        &self,
        request: TurnRequest,
        tx: mpsc::Sender<TurnEvent>,
        cancel: CancellationToken,
    ) -> LlmResult<()>;
}
