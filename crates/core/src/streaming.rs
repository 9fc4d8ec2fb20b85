//! Unified Turn Event Types
//!
//! Provider-agnostic events describing one streamed model turn. Every model
//! capability (plugin-contributed or built for tests) converts its own wire
//! format into this sequence, and the chat orchestrator is the single
//! consumer that folds the events into the message transcript.

use serde::{Deserialize, Serialize};

/// Unified streaming event emitted during a single model turn.
///
/// A well-formed turn is any number of `TextDelta` / `ToolCallRequested`
/// events followed by exactly one `TurnComplete`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Text content delta from the model
    TextDelta { content: String },

    /// The model requests a tool invocation
    ToolCallRequested {
        /// Namespaced tool id (`plugin:local`)
        tool_id: String,
        /// Arguments the model supplied for the call
        arguments: serde_json::Value,
    },

    /// The turn finished (all deltas and tool-call requests emitted)
    TurnComplete {
        #[serde(skip_serializing_if = "Option::is_none")]
        stop_reason: Option<String>,
    },
}
