//! Chat Orchestration
//!
//! The generation side of the runtime core: transcript model, tool call
//! executor, prompt assembly, and the orchestrator service that drives
//! multi-turn generations against plugin-contributed capabilities.

pub mod events;
pub mod executor;
pub mod prompt;
pub mod service;
pub mod transcript;

pub use events::ChatEvent;
pub use executor::{ToolCallExecutor, ToolOutcome, INVALID_ARGUMENTS, TOOL_NOT_FOUND};
pub use prompt::{build_prompt, DEFAULT_SYSTEM_PROMPT};
pub use service::{
    ChatService, GenerationError, GenerationOutcome, GenerationResult, SendMessageParams,
    StopReason, MAX_GENERATION_ITERATIONS,
};
pub use transcript::{MessageTranscript, TranscriptListener};
