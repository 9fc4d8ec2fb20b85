//! Colloquy Core
//!
//! Foundational traits and types for the Colloquy Desktop workspace. This
//! crate has zero dependencies on application-level code (plugin runtime,
//! database, LLM capabilities, etc.).
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `streaming` - Unified turn event types (`TurnEvent`)
//! - `tool_trait` - Tool execution seam (`ToolExecutable`)
//!
//! ## Design Principles
//!
//! 1. **Minimal dependencies** - serde, thiserror, async-trait, and the
//!    cancellation primitive from tokio-util; nothing heavier
//! 2. **Trait-based abstractions** - enables mocking and testing
//! 3. **Unidirectional dependency** - this crate depends on nothing else in
//!    the workspace

pub mod error;
pub mod streaming;
pub mod tool_trait;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Streaming Types ────────────────────────────────────────────────────
pub use streaming::TurnEvent;

// ── Tool Trait ─────────────────────────────────────────────────────────
pub use tool_trait::ToolExecutable;
