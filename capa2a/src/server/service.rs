//! The task orchestrator.
//!
//! [`TaskService`] is the single entry point a transport talks to. It creates
//! and continues tasks, runs message processing in the background, wraps
//! tasks in [`StreamingTask`]s, and mirrors tool calls onto their tasks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::task::AbortHandle;
use tracing::{Instrument, debug, error, info, warn};

use super::auth::{AuthenticatedService, Authenticator, Credentials};
use super::lock;
use super::streaming::{StreamCallback, StreamingTask};
use super::task_store::TaskStore;
use super::task_updater::TaskUpdater;
use crate::config::ServiceConfig;
use crate::error::{A2AError, Result};
use crate::telemetry::process_span;
use crate::tools::{ToolEvent, ToolEventListener, ToolExecutor, ToolRegistry};
use crate::types::{
    ApproveToolCallParams, ExecuteToolParams, ListTasksParams, ListTasksResult, Message,
    MessageSendParams, PendingApproval, SendMessageResponse, Task, TaskIdParams, TaskQueryParams,
    TaskState, ToolCall, ToolDescriptor, ToolStatus,
};

/// Reason recorded on approvals cancelled together with their task.
pub const TASK_CANCELED_REASON: &str = "Task canceled";

/// Everything a [`MessageProcessor`] gets for one message.
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    /// The task being worked on.
    pub task_id: String,
    /// The task's context.
    pub context_id: String,
    /// The message that triggered processing, as stored in history.
    pub message: Message,
    /// Updates the task through the store.
    pub updater: TaskUpdater,
    /// Starts tool calls on the task.
    pub tools: ToolExecutor,
}

/// Agent logic invoked for every incoming message.
///
/// Runs in the background. Returning an error (or panicking) moves the task
/// to `failed` with the error text as the status message.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    /// Handles one message.
    async fn process(&self, ctx: ProcessingContext) -> Result<()>;
}

/// Default processor: echoes the message text as a `response` artifact and
/// completes the task.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoProcessor;

#[async_trait]
impl MessageProcessor for EchoProcessor {
    async fn process(&self, ctx: ProcessingContext) -> Result<()> {
        let reply = match ctx.message.text_content() {
            Some(text) if !text.is_empty() => format!("Echo: {text}"),
            _ => "Received a message without text".to_string(),
        };
        ctx.updater.add_text_artifact("response", reply.clone()).await?;
        ctx.updater
            .complete_with_message(Message::agent_text(reply))
            .await?;
        Ok(())
    }
}

/// Keeps each task's `toolCalls` in sync with the executor and flips the
/// task between `working` and `input-required` around approvals.
struct ToolCallMirror {
    store: Arc<TaskStore>,
}

#[async_trait]
impl ToolEventListener for ToolCallMirror {
    async fn on_tool_event(&self, event: &ToolEvent) {
        if let Err(e) = self.apply(event).await {
            warn!(task_id = %event.task_id(), error = %e, "Failed to mirror tool event");
        }
    }
}

impl ToolCallMirror {
    async fn apply(&self, event: &ToolEvent) -> Result<()> {
        match event {
            ToolEvent::Created { task_id, call } => {
                self.store.add_tool_call(task_id, call.clone()).await?;
            }
            ToolEvent::StatusChange {
                task_id,
                call_id,
                status,
                result,
                error,
            } => {
                let mut previous = None;
                let task = self
                    .store
                    .update_tool_call(task_id, call_id, |call| {
                        previous = Some(call.status);
                        call.status = *status;
                        call.result.clone_from(result);
                        call.error.clone_from(error);
                        call.timestamp = Utc::now();
                    })
                    .await?;
                if previous == Some(ToolStatus::AwaitingApproval)
                    && task.state() == TaskState::InputRequired
                    && !task.has_pending_approvals()
                {
                    debug!(task_id = %task_id, "No approvals left, resuming task");
                    self.store
                        .update_task_status(task_id, TaskState::Working, None)
                        .await?;
                }
            }
            ToolEvent::NeedsApproval { task_id, call } => {
                let task = self.store.get_task(task_id, Some(0)).await?;
                if task.is_terminal() {
                    debug!(task_id = %task_id, call_id = %call.call_id, "Task already finished, not requesting input");
                    return Ok(());
                }
                let prompt = Message::agent_text(format!(
                    "Tool '{}' requires approval (call {})",
                    call.name, call.call_id
                ));
                self.store
                    .update_task_status(task_id, TaskState::InputRequired, Some(prompt))
                    .await?;
            }
        }
        Ok(())
    }
}

/// The task orchestrator.
pub struct TaskService {
    store: Arc<TaskStore>,
    tools: ToolExecutor,
    processor: Arc<dyn MessageProcessor>,
    authenticator: Option<Arc<dyn Authenticator>>,
    config: ServiceConfig,
    running: Arc<Mutex<HashMap<String, Vec<AbortHandle>>>>,
}

impl std::fmt::Debug for TaskService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskService")
            .field("tools", &self.tools)
            .field("config", &self.config)
            .field("authenticator", &self.authenticator.is_some())
            .finish_non_exhaustive()
    }
}

impl TaskService {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> TaskServiceBuilder {
        TaskServiceBuilder::default()
    }

    /// The task store.
    #[must_use]
    pub const fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    /// The tool executor.
    #[must_use]
    pub const fn tools(&self) -> &ToolExecutor {
        &self.tools
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Creates or continues a task and processes the message in the
    /// background.
    ///
    /// A `message.taskId` continues that task (`TaskNotFound` if absent).
    /// Otherwise a new task is returned, already `working`.
    pub async fn send_message(&self, params: MessageSendParams) -> Result<SendMessageResponse> {
        let history_length = params.history_length();
        let (mut task, message) = self.accept(params).await?;
        self.spawn_processing(&task, message);
        task.truncate_history(history_length);
        Ok(SendMessageResponse::Task(task))
    }

    /// Like [`TaskService::send_message`], returning a push feed.
    ///
    /// `callback` is subscribed before processing starts, so it sees every
    /// event processing produces.
    pub async fn send_message_streaming(
        &self,
        params: MessageSendParams,
        callback: Option<Arc<dyn StreamCallback>>,
    ) -> Result<StreamingTask> {
        let (task, message) = self.accept(params).await?;
        let stream = StreamingTask::new(
            &task,
            Arc::clone(&self.store),
            self.config.stream_timeout_duration(),
        );
        if let Some(callback) = callback {
            stream.subscribe(callback).await?;
        }
        self.spawn_processing(&task, message);
        Ok(stream)
    }

    /// Returns a task.
    pub async fn get_task(&self, params: TaskQueryParams) -> Result<Task> {
        self.store.get_task(&params.id, params.history_length).await
    }

    /// Lists tasks.
    pub async fn list_tasks(&self, params: &ListTasksParams) -> Result<ListTasksResult> {
        self.store.list_tasks(params).await
    }

    /// Cancels a task, aborts its processing and cancels its pending
    /// approvals.
    ///
    /// Fails with `InvalidRequest` if the task is already terminal.
    pub async fn cancel_task(&self, params: TaskIdParams) -> Result<Task> {
        self.store.cancel_task(&params.id).await?;

        let handles = lock(&self.running).remove(&params.id).unwrap_or_default();
        for handle in &handles {
            handle.abort();
        }
        if !handles.is_empty() {
            debug!(task_id = %params.id, count = handles.len(), "Aborted message processing");
        }

        self.tools
            .cancel_pending_for_task(&params.id, TASK_CANCELED_REASON)
            .await;
        self.store.get_task(&params.id, None).await
    }

    /// Starts a tool call on an existing task.
    pub async fn execute_tool(&self, params: ExecuteToolParams) -> Result<ToolCall> {
        self.store.get_task(&params.task_id, Some(0)).await?;
        Ok(self.tools.execute_tool(params).await)
    }

    /// Approves or rejects a suspended tool call.
    pub async fn approve_tool_call(&self, params: ApproveToolCallParams) -> Result<ToolCall> {
        self.tools.approve_tool_call(params).await
    }

    /// Describes the registered tools.
    #[must_use]
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.tools.list_tools()
    }

    /// Tool calls waiting for approval, optionally for one task.
    #[must_use]
    pub fn get_pending_approvals(&self, task_id: Option<&str>) -> Vec<PendingApproval> {
        self.tools.get_pending_approvals(task_id)
    }

    /// Exchanges credentials for a user-scoped service.
    ///
    /// Fails with `NotImplemented` when no authenticator is configured and
    /// `Unauthorized` when the credentials are rejected.
    pub async fn authenticate(
        self: &Arc<Self>,
        credentials: &Credentials,
    ) -> Result<AuthenticatedService> {
        let authenticator = self.authenticator.as_ref().ok_or_else(|| {
            A2AError::NotImplemented("No authenticator configured".into())
        })?;
        let result = authenticator.authenticate(credentials).await?;
        let user_id = match result.user_id {
            Some(user_id) if result.authenticated => user_id,
            _ => {
                warn!("Authentication failed");
                return Err(A2AError::Unauthorized("Invalid credentials".into()));
            }
        };
        if result.expires_at.is_some_and(|at| at <= Utc::now()) {
            warn!(user_id = %user_id, "Authentication returned expired credentials");
            return Err(A2AError::Unauthorized("Credentials expired".into()));
        }
        info!(user_id = %user_id, "Authenticated");
        Ok(AuthenticatedService::new(
            Arc::clone(self),
            user_id,
            result.permissions,
            result.expires_at,
        ))
    }

    async fn accept(&self, params: MessageSendParams) -> Result<(Task, Message)> {
        validate_message(&params.message)?;
        let MessageSendParams {
            message, metadata, ..
        } = params;

        let task = match message.task_id.clone() {
            Some(task_id) => {
                let task = self.store.add_message_to_history(&task_id, message.clone()).await?;
                debug!(task_id = %task_id, state = %task.state(), "Continuing task");
                task
            }
            None => self.store.create_task(message.clone(), metadata).await?,
        };
        let message = task.history.last().cloned().unwrap_or(message);
        Ok((task, message))
    }

    fn spawn_processing(&self, task: &Task, message: Message) {
        let ctx = ProcessingContext {
            task_id: task.id.clone(),
            context_id: task.context_id.clone(),
            message,
            updater: TaskUpdater::new(&task.id, &task.context_id, Arc::clone(&self.store)),
            tools: self.tools.clone(),
        };
        let span = process_span(&task.id, &task.context_id);
        let processor = Arc::clone(&self.processor);
        let run = tokio::spawn(async move { processor.process(ctx).await }.instrument(span.clone()));

        {
            let mut running = lock(&self.running);
            let handles = running.entry(task.id.clone()).or_default();
            handles.retain(|h| !h.is_finished());
            handles.push(run.abort_handle());
        }

        let store = Arc::clone(&self.store);
        let running = Arc::clone(&self.running);
        let task_id = task.id.clone();
        tokio::spawn(
            async move {
                let failure = match run.await {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(e.to_string()),
                    Err(e) if e.is_cancelled() => {
                        debug!("Message processing aborted");
                        None
                    }
                    Err(e) => Some(format!("Message processing panicked: {e}")),
                };
                if let Some(failure) = failure {
                    error!(error = %failure, "Message processing failed");
                    mark_failed(&store, &task_id, failure).await;
                }

                let mut running = lock(&running);
                if let Some(handles) = running.get_mut(&task_id) {
                    handles.retain(|h| !h.is_finished());
                    if handles.is_empty() {
                        running.remove(&task_id);
                    }
                }
            }
            .instrument(span),
        );
    }
}

async fn mark_failed(store: &TaskStore, task_id: &str, failure: String) {
    match store.get_task(task_id, Some(0)).await {
        Ok(task) if task.is_terminal() => {
            debug!(state = %task.state(), "Task already finished, not marking failed");
        }
        Ok(_) => {
            if let Err(e) = store
                .update_task_status(task_id, TaskState::Failed, Some(Message::agent_text(failure)))
                .await
            {
                error!(error = %e, "Failed to record processing failure");
            }
        }
        Err(e) => error!(error = %e, "Failed to record processing failure"),
    }
}

fn validate_message(message: &Message) -> Result<()> {
    if message.message_id.trim().is_empty() {
        return Err(A2AError::InvalidParams("Message must have a messageId".into()));
    }
    if message.parts.is_empty() {
        return Err(A2AError::InvalidParams(
            "Message must have at least one part".into(),
        ));
    }
    Ok(())
}

/// Builder for [`TaskService`].
#[derive(Default)]
pub struct TaskServiceBuilder {
    config: ServiceConfig,
    store: Option<Arc<TaskStore>>,
    registry: Option<Arc<ToolRegistry>>,
    processor: Option<Arc<dyn MessageProcessor>>,
    authenticator: Option<Arc<dyn Authenticator>>,
}

impl TaskServiceBuilder {
    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses an existing store. Its page sizes are left as configured.
    #[must_use]
    pub fn with_store(mut self, store: Arc<TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Uses a tool registry instead of the built-ins.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the message processor.
    #[must_use]
    pub fn with_processor(mut self, processor: impl MessageProcessor + 'static) -> Self {
        self.processor = Some(Arc::new(processor));
        self
    }

    /// Enables [`TaskService::authenticate`].
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticator = Some(Arc::new(authenticator));
        self
    }

    /// Builds the service.
    #[must_use]
    pub fn build(self) -> TaskService {
        let config = self.config;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(TaskStore::new().with_config(&config)));
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(ToolRegistry::with_builtins()));
        let tools = ToolExecutor::new(registry).with_timeout(config.tool_timeout_duration());
        tools.add_listener(Arc::new(ToolCallMirror {
            store: Arc::clone(&store),
        }));

        TaskService {
            store,
            tools,
            processor: self.processor.unwrap_or_else(|| Arc::new(EchoProcessor)),
            authenticator: self.authenticator,
            config,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::events::StreamEvent;
    use crate::server::streaming::ChannelSubscriber;
    use serde_json::json;
    use std::time::Duration;

    struct Idle;

    #[async_trait]
    impl MessageProcessor for Idle {
        async fn process(&self, _ctx: ProcessingContext) -> Result<()> {
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl MessageProcessor for Failing {
        async fn process(&self, _ctx: ProcessingContext) -> Result<()> {
            Err(A2AError::InternalError("model unavailable".into()))
        }
    }

    struct Panicking;

    #[async_trait]
    impl MessageProcessor for Panicking {
        async fn process(&self, _ctx: ProcessingContext) -> Result<()> {
            panic!("processor bug")
        }
    }

    struct Stuck;

    #[async_trait]
    impl MessageProcessor for Stuck {
        async fn process(&self, _ctx: ProcessingContext) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn service(processor: impl MessageProcessor + 'static) -> TaskService {
        TaskService::builder().with_processor(processor).build()
    }

    async fn send(service: &TaskService, text: &str) -> Task {
        service
            .send_message(MessageSendParams::new(Message::user_text(text)))
            .await
            .unwrap()
            .into_task()
            .unwrap()
    }

    async fn wait_for(service: &TaskService, task_id: &str, done: impl Fn(&Task) -> bool) -> Task {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let task = service.get_task(TaskQueryParams::new(task_id)).await.unwrap();
                if done(&task) {
                    return task;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("task did not reach the expected state")
    }

    #[tokio::test]
    async fn test_send_creates_working_task() {
        let service = service(Idle);
        let task = send(&service, "hello").await;
        assert_eq!(task.state(), TaskState::Working);
        assert_eq!(task.history.len(), 1);
    }

    #[tokio::test]
    async fn test_echo_processor_completes() {
        let service = TaskService::builder().build();
        let task = send(&service, "ping").await;

        let done = wait_for(&service, &task.id, Task::is_terminal).await;
        assert_eq!(done.state(), TaskState::Completed);
        assert_eq!(done.artifacts[0].name.as_deref(), Some("response"));
        assert_eq!(
            done.status.message.unwrap().text_content().as_deref(),
            Some("Echo: ping")
        );
    }

    #[tokio::test]
    async fn test_rejects_malformed_messages() {
        let service = service(Idle);
        let mut no_parts = Message::user_text("x");
        no_parts.parts.clear();
        let err = service
            .send_message(MessageSendParams::new(no_parts))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidParams");

        let mut no_id = Message::user_text("x");
        no_id.message_id = String::new();
        let err = service
            .send_message(MessageSendParams::new(no_id))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidParams");
    }

    #[tokio::test]
    async fn test_continue_unknown_task() {
        let service = service(Idle);
        let message = Message::user_text("again").with_task_id("missing");
        let err = service
            .send_message(MessageSendParams::new(message))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "TaskNotFound");
    }

    #[tokio::test]
    async fn test_history_length_applies_to_response() {
        let service = service(Idle);
        let task = send(&service, "one").await;
        let message = Message::user_text("two").with_task_id(&task.id);
        let params = MessageSendParams::new(message).with_configuration(
            crate::types::MessageSendConfiguration {
                history_length: Some(1),
                ..Default::default()
            },
        );
        let continued = service.send_message(params).await.unwrap().into_task().unwrap();
        assert_eq!(continued.history.len(), 1);
        assert_eq!(continued.history[0].text_content().as_deref(), Some("two"));

        let stored = service.get_task(TaskQueryParams::new(&task.id)).await.unwrap();
        assert_eq!(stored.history.len(), 2);
    }

    #[tokio::test]
    async fn test_calculator_scenario() {
        let service = service(Idle);
        let task = send(&service, "Calculate 5+3").await;
        assert_eq!(task.state(), TaskState::Working);

        service
            .execute_tool(ExecuteToolParams::new(
                &task.id,
                "calculator",
                json!({"operation": "add", "a": 5, "b": 3}),
            ))
            .await
            .unwrap();

        let task = wait_for(&service, &task.id, |t| {
            t.tool_calls.first().is_some_and(|c| c.status.is_terminal())
        })
        .await;
        assert_eq!(task.tool_calls.len(), 1);
        assert_eq!(task.tool_calls[0].status, ToolStatus::Success);
        assert_eq!(task.tool_calls[0].result, Some(json!({"result": 8})));
    }

    #[tokio::test]
    async fn test_cancel_completed_task_after_continuation() {
        let service = TaskService::builder().build();
        let task = send(&service, "first").await;
        wait_for(&service, &task.id, Task::is_terminal).await;

        let message = Message::user_text("second").with_task_id(&task.id);
        service
            .send_message(MessageSendParams::new(message))
            .await
            .unwrap();
        let settled = wait_for(&service, &task.id, |t| {
            t.status.message.as_ref().and_then(Message::text_content).as_deref()
                == Some("Echo: second")
        })
        .await;
        assert_eq!(settled.artifacts.len(), 2);
        assert_eq!(settled.state(), TaskState::Completed);

        let err = service
            .cancel_task(TaskIdParams::new(&task.id))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidRequest");
        let after = service.get_task(TaskQueryParams::new(&task.id)).await.unwrap();
        assert_eq!(after.status, settled.status);
    }

    #[tokio::test]
    async fn test_read_file_approval_scenario() {
        let service = service(Idle);
        let task = send(&service, "Read /tmp/x").await;

        let call = service
            .execute_tool(ExecuteToolParams::new(&task.id, "read_file", json!({"path": "/tmp/x"})))
            .await
            .unwrap();

        let waiting = wait_for(&service, &task.id, |t| t.state() == TaskState::InputRequired).await;
        assert_eq!(waiting.tool_calls[0].status, ToolStatus::AwaitingApproval);
        let pending = service.get_pending_approvals(Some(&task.id));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].call_id, call.call_id);

        let rejected = service
            .approve_tool_call(ApproveToolCallParams::reject(&call.call_id, "denied"))
            .await
            .unwrap();
        assert_eq!(rejected.status, ToolStatus::Cancelled);

        let resumed = wait_for(&service, &task.id, |t| t.state() == TaskState::Working).await;
        assert_eq!(resumed.tool_calls[0].status, ToolStatus::Cancelled);
        assert_eq!(resumed.tool_calls[0].error.as_deref(), Some("denied"));
    }

    #[tokio::test]
    async fn test_stays_input_required_while_approvals_remain() {
        let service = service(Idle);
        let task = send(&service, "two files").await;
        let a = service
            .execute_tool(ExecuteToolParams::new(&task.id, "read_file", json!({"path": "/a"})))
            .await
            .unwrap();
        let b = service
            .execute_tool(ExecuteToolParams::new(&task.id, "read_file", json!({"path": "/b"})))
            .await
            .unwrap();
        wait_for(&service, &task.id, |t| {
            t.tool_calls
                .iter()
                .all(|c| c.status == ToolStatus::AwaitingApproval)
        })
        .await;

        service
            .approve_tool_call(ApproveToolCallParams::reject(&a.call_id, "no"))
            .await
            .unwrap();
        let task_now = service.get_task(TaskQueryParams::new(&task.id)).await.unwrap();
        assert_eq!(task_now.state(), TaskState::InputRequired);

        service
            .approve_tool_call(ApproveToolCallParams::reject(&b.call_id, "no"))
            .await
            .unwrap();
        let task_now = service.get_task(TaskQueryParams::new(&task.id)).await.unwrap();
        assert_eq!(task_now.state(), TaskState::Working);
    }

    #[tokio::test]
    async fn test_execute_tool_requires_task() {
        let service = service(Idle);
        let err = service
            .execute_tool(ExecuteToolParams::new("missing", "calculator", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "TaskNotFound");
    }

    #[tokio::test]
    async fn test_processing_error_fails_task() {
        let service = service(Failing);
        let task = send(&service, "hi").await;
        let failed = wait_for(&service, &task.id, Task::is_terminal).await;
        assert_eq!(failed.state(), TaskState::Failed);
        assert!(
            failed
                .status
                .message
                .unwrap()
                .text_content()
                .unwrap()
                .contains("model unavailable")
        );
    }

    #[tokio::test]
    async fn test_processing_panic_fails_task() {
        let service = service(Panicking);
        let task = send(&service, "hi").await;
        let failed = wait_for(&service, &task.id, Task::is_terminal).await;
        assert_eq!(failed.state(), TaskState::Failed);
    }

    #[tokio::test]
    async fn test_cancel_aborts_processing_and_approvals() {
        let service = service(Stuck);
        let task = send(&service, "long job").await;
        let call = service
            .execute_tool(ExecuteToolParams::new(&task.id, "read_file", json!({"path": "/x"})))
            .await
            .unwrap();
        wait_for(&service, &task.id, |t| t.state() == TaskState::InputRequired).await;

        let canceled = service.cancel_task(TaskIdParams::new(&task.id)).await.unwrap();
        assert_eq!(canceled.state(), TaskState::Canceled);
        assert_eq!(canceled.tool_calls[0].status, ToolStatus::Cancelled);
        assert_eq!(canceled.tool_calls[0].error.as_deref(), Some(TASK_CANCELED_REASON));
        assert!(service.get_pending_approvals(None).is_empty());
        assert!(service.tools().get_tool_call(&call.call_id).is_none());

        tokio::time::sleep(Duration::from_millis(30)).await;
        let later = service.get_task(TaskQueryParams::new(&task.id)).await.unwrap();
        assert_eq!(later.state(), TaskState::Canceled);
    }

    #[tokio::test]
    async fn test_cancel_before_approval_is_requested() {
        let service = service(Idle);
        let task = send(&service, "read it").await;
        let call = service
            .execute_tool(ExecuteToolParams::new(&task.id, "read_file", json!({"path": "/x"})))
            .await
            .unwrap();
        let canceled = service.cancel_task(TaskIdParams::new(&task.id)).await.unwrap();
        assert_eq!(canceled.state(), TaskState::Canceled);

        let settled = wait_for(&service, &task.id, |t| {
            t.tool_calls.first().is_some_and(|c| c.status.is_terminal())
        })
        .await;
        assert_eq!(settled.state(), TaskState::Canceled);
        assert_eq!(settled.tool_calls[0].status, ToolStatus::Cancelled);
        assert_eq!(settled.tool_calls[0].error.as_deref(), Some(TASK_CANCELED_REASON));
        assert!(service.get_pending_approvals(None).is_empty());

        let err = service
            .approve_tool_call(ApproveToolCallParams::approve(&call.call_id))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidRequest");
    }

    #[tokio::test]
    async fn test_huge_stream_timeout_still_streams() {
        let config = ServiceConfig::from_json(&format!(r#"{{"streamTimeoutSecs": {}}}"#, u64::MAX))
            .unwrap();
        let service = TaskService::builder().with_config(config).build();
        let (subscriber, mut events) = ChannelSubscriber::new();
        service
            .send_message_streaming(
                MessageSendParams::new(Message::user_text("forever")),
                Some(subscriber),
            )
            .await
            .unwrap();

        let last = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = events.recv().await.expect("stream closed before final");
                if event.is_final() {
                    return event;
                }
            }
        })
        .await
        .unwrap();
        match last {
            StreamEvent::StatusUpdate(e) => assert_eq!(e.status.state, TaskState::Completed),
            StreamEvent::ArtifactUpdate(_) => panic!("final event must be a status update"),
        }
    }

    #[tokio::test]
    async fn test_streaming_delivers_final_last() {
        let service = TaskService::builder().build();
        let (subscriber, mut events) = ChannelSubscriber::new();
        let stream = service
            .send_message_streaming(
                MessageSendParams::new(Message::user_text("stream")),
                Some(subscriber),
            )
            .await
            .unwrap();

        let mut received = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(event) = events.recv().await {
                let is_final = event.is_final();
                received.push(event);
                if is_final {
                    break;
                }
            }
        })
        .await
        .unwrap();

        assert!(received.last().unwrap().is_final());
        assert_eq!(received.iter().filter(|e| e.is_final()).count(), 1);
        assert!(received.iter().all(|e| e.task_id() == stream.task_id()));
        assert!(
            received
                .iter()
                .any(|e| matches!(e, StreamEvent::ArtifactUpdate(_)))
        );
        match &received[0] {
            StreamEvent::StatusUpdate(e) => assert_eq!(e.status.state, TaskState::Working),
            StreamEvent::ArtifactUpdate(_) => panic!("catch-up must be a status update"),
        }
    }

    #[tokio::test]
    async fn test_list_tools_and_tasks() {
        let service = service(Idle);
        let names: Vec<String> = service.list_tools().into_iter().map(|t| t.name).collect();
        assert!(names.contains(&"calculator".to_string()));

        send(&service, "a").await;
        send(&service, "b").await;
        let listed = service.list_tasks(&ListTasksParams::default()).await.unwrap();
        assert_eq!(listed.total, 2);
    }
}
