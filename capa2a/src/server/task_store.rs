//! Task storage: lifecycle state machine, CRUD and per-task update listeners.
//!
//! [`TaskStore`] owns every task record. Other components hold only task IDs
//! and call back into the store for reads and writes. Mutations are
//! serialized, so update events reach listeners in mutation order.
//!
//! Persistence is delegated to a [`TaskRepository`]; the default
//! [`InMemoryTaskRepository`] keeps records in a map.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::events::TaskUpdate;
use super::lock;
use crate::config::ServiceConfig;
use crate::error::{A2AError, Result};
use crate::types::{
    Artifact, ListTasksParams, ListTasksResult, Message, Metadata, Task, TaskState, TaskStatus,
    ToolCall,
};

/// A task plus the bookkeeping the store needs for listing.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTask {
    /// The task record.
    pub task: Task,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// Creation order, used to break timestamp ties.
    pub sequence: u64,
}

/// Persistence seam behind [`TaskStore`].
///
/// Implementations only store and return records; ordering, events and the
/// state machine live in the store.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Inserts or replaces a record.
    async fn save(&self, record: &StoredTask) -> Result<()>;

    /// Fetches a record by task ID.
    async fn get(&self, task_id: &str) -> Result<Option<StoredTask>>;

    /// Returns every record, in no particular order.
    async fn list(&self) -> Result<Vec<StoredTask>>;

    /// Removes every record.
    async fn clear(&self) -> Result<()>;

    /// Number of stored records.
    async fn len(&self) -> Result<usize> {
        Ok(self.list().await?.len())
    }
}

/// In-memory implementation of [`TaskRepository`].
#[derive(Debug, Default)]
pub struct InMemoryTaskRepository {
    tasks: Arc<RwLock<HashMap<String, StoredTask>>>,
}

impl InMemoryTaskRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn save(&self, record: &StoredTask) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        tasks.insert(record.task.id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, task_id: &str) -> Result<Option<StoredTask>> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(task_id).cloned())
    }

    async fn list(&self) -> Result<Vec<StoredTask>> {
        let tasks = self.tasks.read().await;
        Ok(tasks.values().cloned().collect())
    }

    async fn clear(&self) -> Result<()> {
        self.tasks.write().await.clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.tasks.read().await.len())
    }
}

/// Callback invoked synchronously for each update of one task.
pub type TaskListener = Arc<dyn Fn(&TaskUpdate) + Send + Sync>;

type ListenerMap = Mutex<HashMap<String, Vec<(u64, TaskListener)>>>;

/// Registration returned by [`TaskStore::on_task_update`].
///
/// Calling [`ListenerHandle::unsubscribe`] removes exactly this listener.
/// Dropping the handle leaves the listener registered.
#[derive(Debug)]
#[must_use = "dropping the handle keeps the listener registered forever"]
pub struct ListenerHandle {
    task_id: String,
    id: u64,
    listeners: Weak<ListenerMap>,
}

impl ListenerHandle {
    /// The task this listener observes.
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Removes the listener.
    pub fn unsubscribe(self) {
        let Some(listeners) = self.listeners.upgrade() else {
            return;
        };
        let mut map = lock(&listeners);
        if let Some(list) = map.get_mut(&self.task_id) {
            list.retain(|(id, _)| *id != self.id);
            if list.is_empty() {
                map.remove(&self.task_id);
            }
        }
        debug!(task_id = %self.task_id, listener = self.id, "Task listener removed");
    }
}

enum Emit {
    Nothing,
    Status,
    Artifact(Artifact),
}

/// Owner of all task state.
pub struct TaskStore {
    repository: Arc<dyn TaskRepository>,
    listeners: Arc<ListenerMap>,
    write_lock: tokio::sync::Mutex<()>,
    next_sequence: AtomicU64,
    next_listener_id: AtomicU64,
    default_page_size: usize,
    max_page_size: usize,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    /// Creates an in-memory store with default page sizes.
    #[must_use]
    pub fn new() -> Self {
        Self::with_repository(Arc::new(InMemoryTaskRepository::new()))
    }

    /// Creates a store backed by the given repository.
    #[must_use]
    pub fn with_repository(repository: Arc<dyn TaskRepository>) -> Self {
        let defaults = ServiceConfig::default();
        Self {
            repository,
            listeners: Arc::new(Mutex::new(HashMap::new())),
            write_lock: tokio::sync::Mutex::new(()),
            next_sequence: AtomicU64::new(0),
            next_listener_id: AtomicU64::new(0),
            default_page_size: defaults.default_page_size,
            max_page_size: defaults.max_page_size,
        }
    }

    /// Applies the page sizes from a service configuration.
    #[must_use]
    pub const fn with_config(mut self, config: &ServiceConfig) -> Self {
        self.default_page_size = config.default_page_size;
        self.max_page_size = config.max_page_size;
        self
    }

    /// Creates a task from its first message.
    ///
    /// Emits `submitted` and then `working` before returning; the returned
    /// task is `working`.
    pub async fn create_task(&self, message: Message, metadata: Option<Metadata>) -> Result<Task> {
        self.create_task_with_id(uuid::Uuid::new_v4().to_string(), message, metadata)
            .await
    }

    /// Like [`TaskStore::create_task`] with a caller-chosen task ID.
    ///
    /// Listeners registered for `task_id` beforehand observe both creation
    /// events. Fails with `InvalidRequest` if the ID is taken.
    pub async fn create_task_with_id(
        &self,
        task_id: String,
        message: Message,
        metadata: Option<Metadata>,
    ) -> Result<Task> {
        let _guard = self.write_lock.lock().await;
        if self.repository.get(&task_id).await?.is_some() {
            return Err(A2AError::InvalidRequest(format!(
                "Task {task_id} already exists"
            )));
        }

        let context_id = message
            .context_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut task = Task::new(&task_id, &context_id);
        task.history.push(attach(message, &task_id, &context_id));
        if let Some(metadata) = metadata {
            task.metadata.extend(metadata);
        }

        let mut record = StoredTask {
            task,
            created_at: Utc::now(),
            sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
        };
        self.repository.save(&record).await?;
        self.emit(&TaskUpdate::status(record.task.clone()));

        record.task.status = TaskStatus::new(TaskState::Working);
        self.repository.save(&record).await?;
        self.emit(&TaskUpdate::status(record.task.clone()));

        info!(task_id = %task_id, context_id = %context_id, "Task created");
        Ok(record.task)
    }

    /// Returns a copy of a task.
    ///
    /// `history_length` limits the history of the returned copy only.
    pub async fn get_task(&self, task_id: &str, history_length: Option<usize>) -> Result<Task> {
        let mut task = self
            .repository
            .get(task_id)
            .await?
            .ok_or_else(|| A2AError::task_not_found(task_id))?
            .task;
        task.truncate_history(history_length);
        Ok(task)
    }

    /// Lists tasks matching the filter, newest status first.
    pub async fn list_tasks(&self, params: &ListTasksParams) -> Result<ListTasksResult> {
        let mut records: Vec<StoredTask> = self
            .repository
            .list()
            .await?
            .into_iter()
            .filter(|record| matches_filter(record, params))
            .collect();
        records.sort_by(|a, b| {
            b.task
                .status
                .timestamp
                .cmp(&a.task.status.timestamp)
                .then_with(|| b.sequence.cmp(&a.sequence))
        });

        let total = records.len();
        let limit = params
            .limit
            .unwrap_or(self.default_page_size)
            .min(self.max_page_size);
        let tasks: Vec<Task> = records
            .into_iter()
            .skip(params.offset)
            .take(limit)
            .map(|record| {
                let mut task = record.task;
                task.truncate_history(params.history_length);
                task
            })
            .collect();
        let has_more = params.offset.saturating_add(tasks.len()) < total;

        Ok(ListTasksResult {
            tasks,
            total,
            has_more,
        })
    }

    /// Overwrites the task's status and emits an update.
    ///
    /// Any state may follow any other; transitions outside the documented
    /// lifecycle are logged at `warn`. A status message is also appended to
    /// the history.
    pub async fn update_task_status(
        &self,
        task_id: &str,
        state: TaskState,
        message: Option<Message>,
    ) -> Result<Task> {
        self.mutate(task_id, |task| {
            let previous = task.status.state;
            if !previous.is_expected_transition(state) {
                warn!(
                    task_id = %task.id,
                    from = %previous,
                    to = %state,
                    "Unexpected task state transition"
                );
            }
            task.status = match message {
                Some(message) => {
                    let message = attach(message, &task.id, &task.context_id);
                    task.history.push(message.clone());
                    TaskStatus::with_message(state, message)
                }
                None => TaskStatus::new(state),
            };
            debug!(task_id = %task.id, from = %previous, to = %state, "Task status updated");
            Ok(Emit::Status)
        })
        .await
    }

    /// Moves a non-terminal task to `canceled`.
    ///
    /// Fails with `InvalidRequest`, leaving the task untouched, when the task
    /// is already terminal.
    pub async fn cancel_task(&self, task_id: &str) -> Result<Task> {
        let task = self
            .mutate(task_id, |task| {
                let state = task.status.state;
                if state.is_terminal() {
                    return Err(A2AError::InvalidRequest(format!(
                        "Task {} is already {state} and cannot be canceled",
                        task.id
                    )));
                }
                task.status = TaskStatus::new(TaskState::Canceled);
                Ok(Emit::Status)
            })
            .await?;
        info!(task_id = %task_id, "Task canceled");
        Ok(task)
    }

    /// Appends an artifact and emits an update carrying it.
    pub async fn add_artifact(&self, task_id: &str, artifact: Artifact) -> Result<Task> {
        self.mutate(task_id, |task| {
            task.artifacts.push(artifact.clone());
            debug!(task_id = %task.id, artifact_id = %artifact.artifact_id, "Artifact added");
            Ok(Emit::Artifact(artifact))
        })
        .await
    }

    /// Appends a message to the history.
    pub async fn add_message_to_history(&self, task_id: &str, message: Message) -> Result<Task> {
        self.mutate(task_id, |task| {
            let message = attach(message, &task.id, &task.context_id);
            task.history.push(message);
            Ok(Emit::Nothing)
        })
        .await
    }

    /// Attaches a tool call to the task.
    pub async fn add_tool_call(&self, task_id: &str, call: ToolCall) -> Result<Task> {
        self.mutate(task_id, |task| {
            task.tool_calls.push(call);
            Ok(Emit::Nothing)
        })
        .await
    }

    /// Mutates an attached tool call in place.
    ///
    /// Fails with `InvalidParams` if the task has no such call.
    pub async fn update_tool_call<F>(&self, task_id: &str, call_id: &str, update: F) -> Result<Task>
    where
        F: FnOnce(&mut ToolCall) + Send,
    {
        self.mutate(task_id, |task| {
            let call = task
                .tool_calls
                .iter_mut()
                .find(|c| c.call_id == call_id)
                .ok_or_else(|| {
                    A2AError::InvalidParams(format!(
                        "Tool call {call_id} not found on task {task_id}"
                    ))
                })?;
            update(call);
            Ok(Emit::Nothing)
        })
        .await
    }

    /// Registers a listener for one task's updates.
    ///
    /// Listeners run synchronously inside the mutating call and must not
    /// block. The task does not need to exist yet.
    pub fn on_task_update<F>(&self, task_id: impl Into<String>, listener: F) -> ListenerHandle
    where
        F: Fn(&TaskUpdate) + Send + Sync + 'static,
    {
        let task_id = task_id.into();
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners)
            .entry(task_id.clone())
            .or_default()
            .push((id, Arc::new(listener)));
        debug!(task_id = %task_id, listener = id, "Task listener added");
        ListenerHandle {
            task_id,
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Number of listeners registered for a task.
    #[must_use]
    pub fn listener_count(&self, task_id: &str) -> usize {
        lock(&self.listeners).get(task_id).map_or(0, Vec::len)
    }

    /// Number of stored tasks.
    pub async fn len(&self) -> Result<usize> {
        self.repository.len().await
    }

    /// Returns true if no tasks are stored.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Removes every task. Intended for tests.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.repository.clear().await
    }

    async fn mutate<F>(&self, task_id: &str, f: F) -> Result<Task>
    where
        F: FnOnce(&mut Task) -> Result<Emit> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut record = self
            .repository
            .get(task_id)
            .await?
            .ok_or_else(|| A2AError::task_not_found(task_id))?;
        let emit = f(&mut record.task)?;
        self.repository.save(&record).await?;
        match emit {
            Emit::Nothing => {}
            Emit::Status => self.emit(&TaskUpdate::status(record.task.clone())),
            Emit::Artifact(artifact) => {
                self.emit(&TaskUpdate::artifact(record.task.clone(), artifact));
            }
        }
        Ok(record.task)
    }

    fn emit(&self, update: &TaskUpdate) {
        let listeners: Vec<TaskListener> = lock(&self.listeners)
            .get(&update.task.id)
            .map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();
        for listener in listeners {
            listener(update);
        }
    }
}

fn attach(mut message: Message, task_id: &str, context_id: &str) -> Message {
    message.task_id = Some(task_id.to_string());
    message.context_id.get_or_insert_with(|| context_id.to_string());
    message
}

fn matches_filter(record: &StoredTask, params: &ListTasksParams) -> bool {
    let task = &record.task;
    if let Some(context_id) = &params.context_id
        && &task.context_id != context_id
    {
        return false;
    }
    if let Some(states) = &params.states
        && !states.contains(&task.status.state)
    {
        return false;
    }
    if let Some(after) = params.created_after
        && record.created_at < after
    {
        return false;
    }
    if let Some(before) = params.created_before
        && record.created_at > before
    {
        return false;
    }
    if let Some(user_id) = &params.user_id
        && task.owner() != Some(user_id.as_str())
    {
        return false;
    }
    true
}
