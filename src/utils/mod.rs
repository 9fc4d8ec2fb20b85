//! Utilities
//!
//! Cross-cutting helpers for the application crate.

pub mod error;

pub use error::{AppError, AppResult};
