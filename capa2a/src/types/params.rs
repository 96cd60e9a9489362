//! Request and response parameter types for the service operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Message, Metadata, Task, TaskState};

/// Parameters for `send_message` and `send_message_streaming`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageSendParams {
    /// The incoming message. A `taskId` continues an existing task.
    pub message: Message,
    /// Optional request configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<MessageSendConfiguration>,
    /// Merged into the metadata of a newly created task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl MessageSendParams {
    /// Creates parameters for a message.
    #[must_use]
    pub const fn new(message: Message) -> Self {
        Self {
            message,
            configuration: None,
            metadata: None,
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_configuration(mut self, configuration: MessageSendConfiguration) -> Self {
        self.configuration = Some(configuration);
        self
    }

    /// Sets the metadata for a new task.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub(crate) fn history_length(&self) -> Option<usize> {
        self.configuration.as_ref().and_then(|c| c.history_length)
    }
}

/// Per-request options.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageSendConfiguration {
    /// Output MIME types the client accepts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_output_modes: Option<Vec<String>>,
    /// Number of trailing history entries to include in the returned task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_length: Option<usize>,
}

/// The result of `send_message`: a task, or a direct reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SendMessageResponse {
    /// A task was created or continued.
    Task(Task),
    /// A reply without a task.
    Message(Message),
}

impl SendMessageResponse {
    /// Returns the task, if this response carries one.
    #[must_use]
    pub fn into_task(self) -> Option<Task> {
        match self {
            Self::Task(task) => Some(task),
            Self::Message(_) => None,
        }
    }
}

/// Parameters for `get_task`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskQueryParams {
    /// Task ID.
    pub id: String,
    /// Number of trailing history entries to return.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_length: Option<usize>,
}

impl TaskQueryParams {
    /// Queries a task with its full history.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            history_length: None,
        }
    }

    /// Limits the returned history.
    #[must_use]
    pub const fn with_history_length(mut self, len: usize) -> Self {
        self.history_length = Some(len);
        self
    }
}

/// Parameters naming a single task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskIdParams {
    /// Task ID.
    pub id: String,
}

impl TaskIdParams {
    /// Creates parameters for a task ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Filter and page for `list_tasks`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ListTasksParams {
    /// Only tasks in this context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    /// Only tasks whose state is in this set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub states: Option<Vec<TaskState>>,
    /// Only tasks created at or after this instant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_after: Option<DateTime<Utc>>,
    /// Only tasks created at or before this instant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_before: Option<DateTime<Utc>>,
    /// Only tasks owned by this user (`metadata.userId`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Number of matching tasks to skip.
    pub offset: usize,
    /// Page size; defaults to the configured page size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Number of trailing history entries per returned task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_length: Option<usize>,
}

impl ListTasksParams {
    /// Restricts to a context.
    #[must_use]
    pub fn in_context(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    /// Restricts to a set of states.
    #[must_use]
    pub fn in_states(mut self, states: impl IntoIterator<Item = TaskState>) -> Self {
        self.states = Some(states.into_iter().collect());
        self
    }

    /// Restricts to an owner.
    #[must_use]
    pub fn owned_by(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the page window.
    #[must_use]
    pub const fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }
}

/// One page of `list_tasks` results, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListTasksResult {
    /// The page.
    pub tasks: Vec<Task>,
    /// Number of tasks matching the filter.
    pub total: usize,
    /// True if more matches follow this page.
    pub has_more: bool,
}
