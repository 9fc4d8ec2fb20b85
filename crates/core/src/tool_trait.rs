//! Tool Execution Trait
//!
//! Defines the execution seam between the chat orchestrator and
//! plugin-contributed tools. Tool *definitions* (id, description, schema)
//! travel as plain data in the registries; only the executable half needs a
//! trait, because implementations range from sandboxed script functions to
//! test doubles.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::CoreResult;

/// Execution capability of a registered tool.
///
/// The executor validates arguments against the tool's declared schema
/// before this is invoked, so implementations may assume shape-valid input.
/// Implementations are responsible for honoring `cancel` cooperatively; the
/// caller never forcibly aborts a running tool.
#[async_trait]
pub trait ToolExecutable: Send + Sync {
    /// Run the tool with schema-valid `arguments`.
    ///
    /// Returns the tool's output as a string suitable for feeding back into
    /// the model conversation.
    async fn execute(&self, arguments: Value, cancel: CancellationToken) -> CoreResult<String>;
}
