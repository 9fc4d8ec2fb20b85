//! Colloquy Desktop — runtime core
//!
//! The two tightly-coupled subsystems behind the Colloquy chat app:
//!
//! - a **plugin runtime** (`services::plugins`) that evaluates untrusted
//!   extension code in isolated QuickJS interpreters and exposes it only a
//!   capability-scoped API, aggregating contributed settings, tools,
//!   models, commands, and chat-node renderers under namespaced ids; and
//! - a **chat orchestrator** (`services::chat`) that drives multi-turn
//!   generations against plugin-contributed models, dispatches tool calls
//!   concurrently, and streams structured content into a message
//!   transcript.
//!
//! Everything UI-facing is an external collaborator reached through traits:
//! storage (`storage::ChatStore`), notifications
//! (`services::plugins::NotificationSink`), and the plugin backend
//! (`services::plugins::PluginBackend`). `state::AppState` is the
//! composition root that assembles the pieces over one data directory.

pub mod models;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

pub use state::AppState;
pub use utils::error::{AppError, AppResult};
