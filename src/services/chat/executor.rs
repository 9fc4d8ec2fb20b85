//! Tool Call Executor
//!
//! Validates model-supplied arguments against a tool's declared JSON schema
//! and executes the tool with cancellation support. Every outcome, including
//! a thrown tool failure, is normalized into a non-exceptional
//! success/error result; a tool implementation's failure never propagates
//! to the orchestrator as an unhandled fault.

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::models::chat::ToolCallStatus;
use crate::services::plugins::registry::RegisteredTool;

/// Error text for arguments that fail the tool's schema.
pub const INVALID_ARGUMENTS: &str = "Invalid arguments";

/// Error text for a dispatch against an unregistered tool id.
pub const TOOL_NOT_FOUND: &str = "Tool not found";

/// Normalized result of one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    /// `Success` or `Error`; never `Pending`
    pub status: ToolCallStatus,
    /// Tool output (success only)
    pub result: Option<String>,
    /// Failure message (error only; may be absent)
    pub error: Option<String>,
}

impl ToolOutcome {
    /// A successful outcome.
    pub fn success(result: impl Into<String>) -> Self {
        Self {
            status: ToolCallStatus::Success,
            result: Some(result.into()),
            error: None,
        }
    }

    /// A failed outcome.
    pub fn error(message: Option<String>) -> Self {
        Self {
            status: ToolCallStatus::Error,
            result: None,
            error: message,
        }
    }

    /// Whether the call succeeded.
    pub fn is_success(&self) -> bool {
        self.status == ToolCallStatus::Success
    }

    /// The string fed back into the model conversation.
    pub fn to_content(&self) -> String {
        if self.is_success() {
            self.result.clone().unwrap_or_default()
        } else {
            format!("Error: {}", self.error.as_deref().unwrap_or("Unknown error"))
        }
    }
}

/// Stateless executor for registered tools.
pub struct ToolCallExecutor;

impl ToolCallExecutor {
    /// Execute one tool call.
    ///
    /// Step 1 validates `arguments` against the declared schema; failures
    /// return `Invalid arguments` without invoking the tool (a schema that
    /// itself fails to compile counts as a validation failure - nothing runs
    /// unvalidated). Step 2 invokes the tool; a thrown failure is folded
    /// into an error outcome. The tool is responsible for honoring `cancel`;
    /// the executor does not forcibly abort it.
    pub async fn execute(
        tool: &RegisteredTool,
        arguments: &Value,
        cancel: CancellationToken,
    ) -> ToolOutcome {
        match jsonschema::validator_for(&tool.declaration.schema) {
            Ok(validator) => {
                if !validator.is_valid(arguments) {
                    return ToolOutcome::error(Some(INVALID_ARGUMENTS.to_string()));
                }
            }
            Err(err) => {
                tracing::warn!(
                    tool = %tool.declaration.id,
                    error = %err,
                    "tool schema failed to compile; rejecting arguments"
                );
                return ToolOutcome::error(Some(INVALID_ARGUMENTS.to_string()));
            }
        }

        match tool.execute.execute(arguments.clone(), cancel).await {
            Ok(result) => ToolOutcome::success(result),
            Err(err) => ToolOutcome::error(Some(err.to_string())),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
