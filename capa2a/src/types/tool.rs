//! Tool call records and approval types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle of a single tool call.
///
/// `validating → scheduled → (awaiting-approval →)? executing → {success, error, cancelled}`.
/// Lookup and validation failures jump straight to `error`; a rejected approval
/// jumps straight to `cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolStatus {
    /// Looking up the tool and checking input.
    Validating,
    /// Input accepted.
    Scheduled,
    /// Suspended until `approve_tool_call`.
    AwaitingApproval,
    /// Tool function running.
    Executing,
    /// Finished with a result.
    Success,
    /// Failed.
    Error,
    /// Rejected or canceled before running.
    Cancelled,
}

impl ToolStatus {
    /// Returns true for `success`, `error` and `cancelled`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Cancelled)
    }
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Validating => "validating",
            Self::Scheduled => "scheduled",
            Self::AwaitingApproval => "awaiting-approval",
            Self::Executing => "executing",
            Self::Success => "success",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One invocation of a registered tool, owned by exactly one task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Unique call identifier.
    pub call_id: String,
    /// Registered tool name.
    pub name: String,
    /// Input as supplied by the caller.
    pub input: Value,
    /// Current status.
    pub status: ToolStatus,
    /// Output on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure or rejection reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Time of the last status change.
    pub timestamp: DateTime<Utc>,
}

impl ToolCall {
    /// Creates a call in `validating` with a generated ID.
    pub fn new(name: impl Into<String>, input: Value) -> Self {
        Self {
            call_id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            input,
            status: ToolStatus::Validating,
            result: None,
            error: None,
            timestamp: Utc::now(),
        }
    }
}

/// Catalog entry returned by `list_tools`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the input.
    pub input_schema: Value,
    /// Whether each call must be approved before it runs.
    pub requires_approval: bool,
}

/// Outcome of validating input against a tool's schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ValidationResult {
    /// True if the input conforms.
    pub valid: bool,
    /// One entry per failed field.
    pub errors: Vec<String>,
}

impl ValidationResult {
    /// A passing result.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    /// A failing result.
    #[must_use]
    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }
}

/// A tool call suspended in `awaiting-approval`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingApproval {
    /// Owning task.
    pub task_id: String,
    /// The suspended call.
    pub call_id: String,
    /// Tool name.
    pub tool_name: String,
    /// Validated input.
    pub input: Value,
    /// When approval was requested.
    pub requested_at: DateTime<Utc>,
}

/// Parameters for `execute_tool`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteToolParams {
    /// Owning task.
    pub task_id: String,
    /// Registered tool name.
    pub tool_name: String,
    /// Tool input.
    #[serde(default)]
    pub input: Value,
}

impl ExecuteToolParams {
    /// Creates parameters for a tool call.
    pub fn new(task_id: impl Into<String>, tool_name: impl Into<String>, input: Value) -> Self {
        Self {
            task_id: task_id.into(),
            tool_name: tool_name.into(),
            input,
        }
    }
}

/// Parameters for `approve_tool_call`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApproveToolCallParams {
    /// The suspended call.
    pub call_id: String,
    /// Grant or reject.
    pub approved: bool,
    /// Recorded as the call's `error` on rejection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ApproveToolCallParams {
    /// Approves a call.
    pub fn approve(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            approved: true,
            reason: None,
        }
    }

    /// Rejects a call with a reason.
    pub fn reject(call_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            approved: false,
            reason: Some(reason.into()),
        }
    }
}
