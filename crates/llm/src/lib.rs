//! Colloquy LLM
//!
//! Model-capability abstraction for Colloquy Desktop. Models are contributed
//! by plugins at runtime; this crate defines the interface the chat
//! orchestrator drives them through, plus the prompt message types that
//! travel across it.
//!
//! ## Module Organization
//!
//! - `types` - Prompt messages, tool definitions, error taxonomy
//! - `provider` - The `LanguageModel` streaming trait

pub mod provider;
pub mod types;

// ── Provider Trait ─────────────────────────────────────────────────────
pub use provider::{LanguageModel, TurnRequest};

// ── Types ──────────────────────────────────────────────────────────────
pub use types::{LlmError, LlmResult, Message, MessageContent, MessageRole, ToolDefinition};
