//! Events flowing from the task store to stream subscribers.
//!
//! The store emits [`TaskUpdate`]s and knows nothing about finality; the
//! streaming layer translates them into [`StreamEvent`]s.

use serde::Serialize;

use crate::types::{Artifact, Task, TaskArtifactUpdateEvent, TaskStatusUpdateEvent};

/// A snapshot emitted by the task store after a status or artifact change.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskUpdate {
    /// The task as stored after the mutation.
    pub task: Task,
    /// The artifact that accompanied the mutation, if any.
    pub artifact: Option<Artifact>,
}

impl TaskUpdate {
    /// An update caused by a status change.
    #[must_use]
    pub const fn status(task: Task) -> Self {
        Self {
            task,
            artifact: None,
        }
    }

    /// An update caused by an artifact being attached.
    #[must_use]
    pub const fn artifact(task: Task, artifact: Artifact) -> Self {
        Self {
            task,
            artifact: Some(artifact),
        }
    }

    /// Translates the update into stream events.
    ///
    /// The status event's `final` flag is set iff the state is terminal. A
    /// final status event is always ordered last.
    #[must_use]
    pub fn to_stream_events(&self) -> Vec<StreamEvent> {
        let is_final = self.task.is_terminal();
        let status = StreamEvent::StatusUpdate(self.task.status_update_event(is_final));
        let artifact = self.artifact.as_ref().map(|a| {
            StreamEvent::ArtifactUpdate(TaskArtifactUpdateEvent::new(
                &self.task.id,
                &self.task.context_id,
                a.clone(),
            ))
        });
        match artifact {
            Some(artifact) if is_final => vec![artifact, status],
            Some(artifact) => vec![status, artifact],
            None => vec![status],
        }
    }
}

/// A transient notification pushed to subscribers. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StreamEvent {
    /// The task's status changed.
    StatusUpdate(TaskStatusUpdateEvent),
    /// An artifact was attached.
    ArtifactUpdate(TaskArtifactUpdateEvent),
}

impl StreamEvent {
    /// The task this event belongs to.
    #[must_use]
    pub fn task_id(&self) -> &str {
        match self {
            Self::StatusUpdate(e) => &e.task_id,
            Self::ArtifactUpdate(e) => &e.task_id,
        }
    }

    /// The context of the task.
    #[must_use]
    pub fn context_id(&self) -> &str {
        match self {
            Self::StatusUpdate(e) => &e.context_id,
            Self::ArtifactUpdate(e) => &e.context_id,
        }
    }

    /// True for a status update flagged `final`.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        match self {
            Self::StatusUpdate(e) => e.r#final,
            Self::ArtifactUpdate(_) => false,
        }
    }
}
