//! Task types: the task record, its status, artifacts, and stream events.
//!
//! Tasks move through the lifecycle
//! `submitted → working → {input-required, auth-required} ⇄ working → {completed, canceled, failed, rejected}`.
//! The store does not hard-block other jumps; see [`TaskState::is_expected_transition`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use super::{Message, Metadata, Part, ToolCall, ToolStatus};

/// Metadata key carrying the owning user's identity.
pub const USER_ID_METADATA_KEY: &str = "userId";

/// Helper for serde: skip serializing boolean fields when false.
#[must_use]
pub fn is_false(v: &bool) -> bool {
    !v
}

/// Lifecycle states of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    /// Accepted, not yet started.
    #[default]
    Submitted,
    /// Being processed.
    Working,
    /// Paused until the client provides more input (or approves a tool call).
    InputRequired,
    /// Finished successfully.
    Completed,
    /// Canceled by the client.
    Canceled,
    /// Processing failed.
    Failed,
    /// Rejected by the agent.
    Rejected,
    /// Paused until the client authenticates.
    AuthRequired,
    /// Defensive sentinel, never assigned by normal flow.
    Unknown,
}

impl TaskState {
    /// Returns true for `completed`, `canceled`, `failed` and `rejected`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Canceled | Self::Failed | Self::Rejected
        )
    }

    /// Returns true if `self → next` follows the documented lifecycle.
    ///
    /// Re-asserting the current state is always expected.
    #[must_use]
    pub const fn is_expected_transition(&self, next: Self) -> bool {
        if self.is_terminal() || matches!(next, Self::Unknown) {
            return false;
        }
        match (self, next) {
            (Self::Submitted, Self::Submitted) => true,
            (_, Self::Submitted) => false,
            (Self::Submitted, Self::InputRequired | Self::AuthRequired) => false,
            _ => true,
        }
    }

    /// The wire string of this state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Working => "working",
            Self::InputRequired => "input-required",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
            Self::AuthRequired => "auth-required",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The status of a task at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskStatus {
    /// Current lifecycle position.
    pub state: TaskState,
    /// Optional detail, usually an agent message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    /// When this status was recorded.
    pub timestamp: DateTime<Utc>,
}

impl TaskStatus {
    /// Creates a status stamped with the current time.
    #[must_use]
    pub fn new(state: TaskState) -> Self {
        Self {
            state,
            message: None,
            timestamp: Utc::now(),
        }
    }

    /// Creates a status with an attached message.
    #[must_use]
    pub fn with_message(state: TaskState, message: Message) -> Self {
        Self {
            message: Some(message),
            ..Self::new(state)
        }
    }
}

/// One unit of conversational work.
///
/// `history` and `artifacts` only grow; history-length limiting is applied to
/// read views, never to the stored record. `kind: "task"` is injected on
/// serialization.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique task identifier.
    pub id: String,
    /// Groups related tasks across a conversation.
    pub context_id: String,
    /// Current status.
    pub status: TaskStatus,
    /// Chronological messages.
    #[serde(default)]
    pub history: Vec<Message>,
    /// Outputs, in the order they were attached.
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    /// Tool invocations made on behalf of this task.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// Opaque metadata; may carry `userId`.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Serialize for Task {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct TaskWithKind<'a> {
            kind: &'static str,
            id: &'a str,
            context_id: &'a str,
            status: &'a TaskStatus,
            history: &'a [Message],
            artifacts: &'a [Artifact],
            tool_calls: &'a [ToolCall],
            #[serde(skip_serializing_if = "metadata_is_empty")]
            metadata: &'a Metadata,
        }
        TaskWithKind {
            kind: "task",
            id: &self.id,
            context_id: &self.context_id,
            status: &self.status,
            history: &self.history,
            artifacts: &self.artifacts,
            tool_calls: &self.tool_calls,
            metadata: &self.metadata,
        }
        .serialize(serializer)
    }
}

fn metadata_is_empty(metadata: &&Metadata) -> bool {
    metadata.is_empty()
}

impl Task {
    /// Creates an empty `submitted` task.
    pub fn new(id: impl Into<String>, context_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            context_id: context_id.into(),
            status: TaskStatus::new(TaskState::Submitted),
            history: Vec::new(),
            artifacts: Vec::new(),
            tool_calls: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> TaskState {
        self.status.state
    }

    /// Returns true if the task is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.state.is_terminal()
    }

    /// Returns the owning user recorded in metadata, if any.
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.metadata
            .get(USER_ID_METADATA_KEY)
            .and_then(serde_json::Value::as_str)
    }

    /// Looks up a tool call by ID.
    #[must_use]
    pub fn tool_call(&self, call_id: &str) -> Option<&ToolCall> {
        self.tool_calls.iter().find(|c| c.call_id == call_id)
    }

    /// Returns true if any tool call is still waiting for approval.
    #[must_use]
    pub fn has_pending_approvals(&self) -> bool {
        self.tool_calls
            .iter()
            .any(|c| c.status == ToolStatus::AwaitingApproval)
    }

    /// Keeps only the last `len` history entries.
    ///
    /// Intended for read views; `None` leaves the history untouched.
    pub fn truncate_history(&mut self, len: Option<usize>) {
        if let Some(max) = len
            && self.history.len() > max
        {
            let start = self.history.len() - max;
            self.history.drain(..start);
        }
    }

    /// Builds a status event from the current status.
    #[must_use]
    pub fn status_update_event(&self, is_final: bool) -> TaskStatusUpdateEvent {
        TaskStatusUpdateEvent::new(&self.id, &self.context_id, self.status.clone(), is_final)
    }
}

/// A named bundle of output parts attached to a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Unique within the task.
    pub artifact_id: String,
    /// Content.
    pub parts: Vec<Part>,
    /// Optional display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Optional description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Artifact {
    /// Creates an artifact with a generated ID.
    #[must_use]
    pub fn new(parts: Vec<Part>) -> Self {
        Self {
            artifact_id: uuid::Uuid::new_v4().to_string(),
            parts,
            name: None,
            description: None,
            metadata: None,
        }
    }

    /// Creates a named single-part text artifact.
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(vec![Part::text(text)]).with_name(name)
    }

    /// Sets the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Notifies a subscriber of a task status change.
///
/// `final` is true exactly when the status is terminal. `kind: "status-update"`
/// is injected on serialization.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusUpdateEvent {
    /// The task that changed.
    pub task_id: String,
    /// The task's context.
    pub context_id: String,
    /// The new status.
    pub status: TaskStatus,
    /// True on the last event of a stream.
    pub r#final: bool,
}

impl Serialize for TaskStatusUpdateEvent {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Helper<'a> {
            kind: &'static str,
            task_id: &'a str,
            context_id: &'a str,
            status: &'a TaskStatus,
            r#final: bool,
        }
        Helper {
            kind: "status-update",
            task_id: &self.task_id,
            context_id: &self.context_id,
            status: &self.status,
            r#final: self.r#final,
        }
        .serialize(serializer)
    }
}

impl TaskStatusUpdateEvent {
    /// Creates a status update event.
    pub fn new(
        task_id: impl Into<String>,
        context_id: impl Into<String>,
        status: TaskStatus,
        r#final: bool,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            context_id: context_id.into(),
            status,
            r#final,
        }
    }
}

/// Notifies a subscriber that an artifact was attached.
///
/// `kind: "artifact-update"` is injected on serialization.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskArtifactUpdateEvent {
    /// The task the artifact belongs to.
    pub task_id: String,
    /// The task's context.
    pub context_id: String,
    /// The artifact.
    pub artifact: Artifact,
    /// True if the parts extend a previously sent artifact.
    #[serde(default)]
    pub append: bool,
    /// True if this is the last chunk of the artifact.
    #[serde(default)]
    pub last_chunk: bool,
}

impl Serialize for TaskArtifactUpdateEvent {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Helper<'a> {
            kind: &'static str,
            task_id: &'a str,
            context_id: &'a str,
            artifact: &'a Artifact,
            #[serde(skip_serializing_if = "crate::types::task::is_false")]
            append: bool,
            #[serde(skip_serializing_if = "crate::types::task::is_false")]
            last_chunk: bool,
        }
        Helper {
            kind: "artifact-update",
            task_id: &self.task_id,
            context_id: &self.context_id,
            artifact: &self.artifact,
            append: self.append,
            last_chunk: self.last_chunk,
        }
        .serialize(serializer)
    }
}

impl TaskArtifactUpdateEvent {
    /// Creates an event for a complete, non-appended artifact.
    pub fn new(task_id: impl Into<String>, context_id: impl Into<String>, artifact: Artifact) -> Self {
        Self {
            task_id: task_id.into(),
            context_id: context_id.into(),
            artifact,
            append: false,
            last_chunk: true,
        }
    }
}
