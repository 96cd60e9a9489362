//! Task updater utility for message processors.
//!
//! Provides a convenient API for updating one task's status, artifacts, and
//! history. Every call goes through the [`TaskStore`], so subscribers see the
//! same events they would for any other mutation.

use std::sync::Arc;

use crate::error::Result;
use crate::types::{Artifact, Message, Task, TaskState};

use super::task_store::TaskStore;

/// A handle for updating a single task.
#[derive(Clone)]
pub struct TaskUpdater {
    task_id: String,
    context_id: String,
    store: Arc<TaskStore>,
}

impl std::fmt::Debug for TaskUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskUpdater")
            .field("task_id", &self.task_id)
            .field("context_id", &self.context_id)
            .finish_non_exhaustive()
    }
}

impl TaskUpdater {
    /// Creates an updater for an existing task.
    pub fn new(
        task_id: impl Into<String>,
        context_id: impl Into<String>,
        store: Arc<TaskStore>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            context_id: context_id.into(),
            store,
        }
    }

    /// Returns the task ID.
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Returns the context ID.
    #[must_use]
    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    /// Returns the current task.
    pub async fn task(&self) -> Result<Task> {
        self.store.get_task(&self.task_id, None).await
    }

    /// Updates the task state.
    pub async fn set_state(&self, state: TaskState) -> Result<Task> {
        self.store.update_task_status(&self.task_id, state, None).await
    }

    /// Updates the task state with a message.
    pub async fn set_state_with_message(&self, state: TaskState, message: Message) -> Result<Task> {
        self.store
            .update_task_status(&self.task_id, state, Some(message))
            .await
    }

    /// Sets the task to working state.
    pub async fn start_working(&self) -> Result<Task> {
        self.set_state(TaskState::Working).await
    }

    /// Sets the task to completed state.
    pub async fn complete(&self) -> Result<Task> {
        self.set_state(TaskState::Completed).await
    }

    /// Sets the task to completed state with a message.
    pub async fn complete_with_message(&self, message: Message) -> Result<Task> {
        self.set_state_with_message(TaskState::Completed, message)
            .await
    }

    /// Sets the task to failed state.
    pub async fn fail(&self, error_message: impl Into<String>) -> Result<Task> {
        let message = Message::agent_text(error_message);
        self.set_state_with_message(TaskState::Failed, message)
            .await
    }

    /// Sets the task to input required state.
    pub async fn require_input(&self, prompt: impl Into<String>) -> Result<Task> {
        let message = Message::agent_text(prompt);
        self.set_state_with_message(TaskState::InputRequired, message)
            .await
    }

    /// Adds a message to the history without changing state.
    pub async fn add_message(&self, message: Message) -> Result<Task> {
        self.store
            .add_message_to_history(&self.task_id, message)
            .await
    }

    /// Adds a text message from the agent.
    pub async fn add_agent_message(&self, text: impl Into<String>) -> Result<Task> {
        self.add_message(Message::agent_text(text)).await
    }

    /// Adds an artifact to the task.
    pub async fn add_artifact(&self, artifact: Artifact) -> Result<Task> {
        self.store.add_artifact(&self.task_id, artifact).await
    }

    /// Adds a text artifact.
    pub async fn add_text_artifact(
        &self,
        name: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<Task> {
        self.add_artifact(Artifact::text(name, text)).await
    }
}
