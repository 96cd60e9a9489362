//! Tool call execution with an approval gate.
//!
//! [`ToolExecutor::execute_tool`] returns as soon as the call is recorded in
//! `validating`. The rest runs in the background:
//!
//! 1. unknown tool or invalid input: `error`
//! 2. otherwise `scheduled`
//! 3. tools that require approval move to `awaiting-approval`, emit
//!    [`ToolEvent::NeedsApproval`] and wait for [`ToolExecutor::approve_tool_call`]
//! 4. `executing`, then `success` or `error`
//!
//! A rejected approval moves the call straight to `cancelled`. Every status
//! change is reported to the registered [`ToolEventListener`]s, in order.
//! Calls are forgotten once they reach a terminal status; listeners keep
//! the durable record.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use serde_json::Value;
use tracing::{Instrument, debug, info, warn};

use super::registry::{Tool, ToolRegistry};
use crate::config::DEFAULT_TOOL_TIMEOUT;
use crate::error::{A2AError, Result};
use crate::server::lock;
use crate::telemetry::tool_span;
use crate::types::{
    ApproveToolCallParams, ExecuteToolParams, PendingApproval, ToolCall, ToolDescriptor,
    ToolStatus,
};

/// Reason recorded when an approval is rejected without one.
pub const DEFAULT_REJECTION_REASON: &str = "Rejected by user";

/// Notification about a tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolEvent {
    /// A call was recorded in `validating`. Always the call's first event.
    Created {
        /// Owning task.
        task_id: String,
        /// The new call.
        call: ToolCall,
    },
    /// A call changed status.
    StatusChange {
        /// Owning task.
        task_id: String,
        /// The call.
        call_id: String,
        /// New status.
        status: ToolStatus,
        /// Output, on success.
        result: Option<Value>,
        /// Failure or rejection reason.
        error: Option<String>,
    },
    /// A call is suspended in `awaiting-approval`.
    NeedsApproval {
        /// Owning task.
        task_id: String,
        /// The suspended call.
        call: ToolCall,
    },
}

impl ToolEvent {
    /// The task the event belongs to.
    #[must_use]
    pub fn task_id(&self) -> &str {
        match self {
            Self::Created { task_id, .. }
            | Self::StatusChange { task_id, .. }
            | Self::NeedsApproval { task_id, .. } => task_id,
        }
    }
}

/// Observer of tool events.
///
/// Listeners are awaited one after another, so they should be quick and
/// must not call back into the executor.
#[async_trait]
pub trait ToolEventListener: Send + Sync {
    /// Handles one event.
    async fn on_tool_event(&self, event: &ToolEvent);
}

struct TrackedCall {
    task_id: String,
    call: ToolCall,
    // Set when the task is canceled before the call reaches the approval gate.
    cancel_reason: Option<String>,
}

/// Runs tool calls and tracks their status.
///
/// Cloning is cheap and shares all state.
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    calls: Arc<Mutex<HashMap<String, TrackedCall>>>,
    pending: Arc<Mutex<HashMap<String, PendingApproval>>>,
    listeners: Arc<Mutex<Vec<Arc<dyn ToolEventListener>>>>,
    // Held from a status change until its events are delivered.
    sequencer: Arc<tokio::sync::Mutex<()>>,
    timeout: Duration,
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor")
            .field("registry", &self.registry)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ToolExecutor {
    /// Creates an executor over a registry.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            calls: Arc::new(Mutex::new(HashMap::new())),
            pending: Arc::new(Mutex::new(HashMap::new())),
            listeners: Arc::new(Mutex::new(Vec::new())),
            sequencer: Arc::new(tokio::sync::Mutex::new(())),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Sets the per-invocation timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The underlying registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Describes every registered tool.
    #[must_use]
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.registry.list_tools()
    }

    /// Registers an event listener.
    pub fn add_listener(&self, listener: Arc<dyn ToolEventListener>) {
        lock(&self.listeners).push(listener);
    }

    /// Records a new call and starts driving it in the background.
    ///
    /// Returns the call in `validating`; its outcome arrives through events.
    pub async fn execute_tool(&self, params: ExecuteToolParams) -> ToolCall {
        let ExecuteToolParams {
            task_id,
            tool_name,
            input,
        } = params;
        let call = ToolCall::new(tool_name, input);
        {
            let _seq = self.sequencer.lock().await;
            lock(&self.calls).insert(
                call.call_id.clone(),
                TrackedCall {
                    task_id: task_id.clone(),
                    call: call.clone(),
                    cancel_reason: None,
                },
            );
            debug!(task_id = %task_id, call_id = %call.call_id, tool = %call.name, "Tool call created");
            self.emit(&ToolEvent::Created {
                task_id: task_id.clone(),
                call: call.clone(),
            })
            .await;
        }

        let span = tool_span(&task_id, &call.call_id, &call.name);
        let executor = self.clone();
        let call_id = call.call_id.clone();
        tokio::spawn(async move { executor.drive(&call_id).await }.instrument(span));
        call
    }

    /// Resolves a suspended call.
    ///
    /// Approval moves it to `executing` and runs it in the background.
    /// Rejection moves it to `cancelled` with the reason as `error`. Fails with
    /// `InvalidRequest` if the call is not awaiting approval.
    pub async fn approve_tool_call(&self, params: ApproveToolCallParams) -> Result<ToolCall> {
        let seq = self.sequencer.lock().await;
        let pending = lock(&self.pending)
            .remove(&params.call_id)
            .ok_or_else(|| {
                A2AError::InvalidRequest(format!(
                    "No pending approval for tool call {}",
                    params.call_id
                ))
            })?;

        if params.approved {
            info!(task_id = %pending.task_id, call_id = %pending.call_id, "Tool call approved");
            let call = self
                .transition_locked(&pending.call_id, ToolStatus::Executing, None, None)
                .await
                .ok_or_else(|| A2AError::InternalError("Approved call is no longer tracked".into()))?;
            drop(seq);

            let span = tool_span(&pending.task_id, &pending.call_id, &pending.tool_name);
            let executor = self.clone();
            tokio::spawn(
                async move {
                    match executor.registry.get(&pending.tool_name) {
                        Some(tool) => executor.run(&pending.call_id, tool, pending.input).await,
                        None => {
                            let error = format!("Tool not found: {}", pending.tool_name);
                            executor
                                .transition(&pending.call_id, ToolStatus::Error, None, Some(error))
                                .await;
                        }
                    }
                }
                .instrument(span),
            );
            Ok(call)
        } else {
            let reason = params
                .reason
                .unwrap_or_else(|| DEFAULT_REJECTION_REASON.to_string());
            info!(task_id = %pending.task_id, call_id = %pending.call_id, reason = %reason, "Tool call rejected");
            self.transition_locked(&pending.call_id, ToolStatus::Cancelled, None, Some(reason))
                .await
                .ok_or_else(|| A2AError::InternalError("Rejected call is no longer tracked".into()))
        }
    }

    /// Cancels every pending approval of a task.
    ///
    /// Calls of the task still validating or scheduled are cancelled with the
    /// same reason when they reach the approval gate instead of suspending.
    pub async fn cancel_pending_for_task(&self, task_id: &str, reason: &str) -> Vec<ToolCall> {
        let _seq = self.sequencer.lock().await;
        for tracked in lock(&self.calls).values_mut().filter(|t| {
            t.task_id == task_id
                && matches!(t.call.status, ToolStatus::Validating | ToolStatus::Scheduled)
        }) {
            tracked.cancel_reason = Some(reason.to_string());
        }
        let call_ids: Vec<String> = {
            let mut pending = lock(&self.pending);
            let ids: Vec<String> = pending
                .values()
                .filter(|p| p.task_id == task_id)
                .map(|p| p.call_id.clone())
                .collect();
            for id in &ids {
                pending.remove(id);
            }
            ids
        };

        let mut cancelled = Vec::with_capacity(call_ids.len());
        for call_id in call_ids {
            if let Some(call) = self
                .transition_locked(&call_id, ToolStatus::Cancelled, None, Some(reason.to_string()))
                .await
            {
                cancelled.push(call);
            }
        }
        if !cancelled.is_empty() {
            info!(task_id = %task_id, count = cancelled.len(), "Pending tool calls cancelled");
        }
        cancelled
    }

    /// Returns an in-flight call by ID.
    ///
    /// Finished calls are not retained here; their final state lives in the
    /// owning task's `toolCalls`.
    #[must_use]
    pub fn get_tool_call(&self, call_id: &str) -> Option<ToolCall> {
        lock(&self.calls).get(call_id).map(|t| t.call.clone())
    }

    /// Pending approvals, optionally for one task, oldest first.
    #[must_use]
    pub fn get_pending_approvals(&self, task_id: Option<&str>) -> Vec<PendingApproval> {
        let mut approvals: Vec<PendingApproval> = lock(&self.pending)
            .values()
            .filter(|p| task_id.is_none_or(|id| p.task_id == id))
            .cloned()
            .collect();
        approvals.sort_by(|a, b| {
            a.requested_at
                .cmp(&b.requested_at)
                .then_with(|| a.call_id.cmp(&b.call_id))
        });
        approvals
    }

    async fn drive(&self, call_id: &str) {
        let Some(call) = self.get_tool_call(call_id) else {
            return;
        };

        let Some(tool) = self.registry.get(&call.name) else {
            let error = format!("Tool not found: {}", call.name);
            warn!(error = %error, "Tool call failed");
            self.transition(call_id, ToolStatus::Error, None, Some(error))
                .await;
            return;
        };

        let validation = self.registry.validate_input(&call.name, &call.input);
        if !validation.valid {
            let error = format!("Invalid input: {}", validation.errors.join("; "));
            warn!(error = %error, "Tool call failed");
            self.transition(call_id, ToolStatus::Error, None, Some(error))
                .await;
            return;
        }

        self.transition(call_id, ToolStatus::Scheduled, None, None)
            .await;

        if tool.requires_approval() {
            self.suspend(call_id).await;
            return;
        }

        self.transition(call_id, ToolStatus::Executing, None, None)
            .await;
        self.run(call_id, tool, call.input).await;
    }

    async fn suspend(&self, call_id: &str) {
        let _seq = self.sequencer.lock().await;
        let cancel_reason = lock(&self.calls)
            .get(call_id)
            .and_then(|t| t.cancel_reason.clone());
        if let Some(reason) = cancel_reason {
            info!(reason = %reason, "Tool call cancelled before approval");
            self.transition_locked(call_id, ToolStatus::Cancelled, None, Some(reason))
                .await;
            return;
        }

        let Some((task_id, call)) = self.apply(call_id, ToolStatus::AwaitingApproval, None, None)
        else {
            return;
        };
        lock(&self.pending).insert(
            call_id.to_string(),
            PendingApproval {
                task_id: task_id.clone(),
                call_id: call_id.to_string(),
                tool_name: call.name.clone(),
                input: call.input.clone(),
                requested_at: call.timestamp,
            },
        );
        info!(tool = %call.name, "Tool call awaiting approval");

        self.emit(&status_change(&task_id, &call)).await;
        self.emit(&ToolEvent::NeedsApproval { task_id, call }).await;
    }

    async fn run(&self, call_id: &str, tool: Arc<dyn Tool>, input: Value) {
        let name = tool.name().to_string();
        let invocation = AssertUnwindSafe(tool.execute(input)).catch_unwind();
        let (status, result, error) = match tokio::time::timeout(self.timeout, invocation).await {
            Ok(Ok(Ok(output))) => (ToolStatus::Success, Some(output), None),
            Ok(Ok(Err(e))) => (ToolStatus::Error, None, Some(e)),
            Ok(Err(_)) => (
                ToolStatus::Error,
                None,
                Some(format!("Tool '{name}' panicked")),
            ),
            Err(_) => (
                ToolStatus::Error,
                None,
                Some(format!(
                    "Tool '{name}' timed out after {}ms",
                    self.timeout.as_millis()
                )),
            ),
        };

        match &error {
            None => info!("Tool call succeeded"),
            Some(e) => warn!(error = %e, "Tool call failed"),
        }
        self.transition(call_id, status, result, error).await;
    }

    async fn transition(
        &self,
        call_id: &str,
        status: ToolStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Option<ToolCall> {
        let _seq = self.sequencer.lock().await;
        self.transition_locked(call_id, status, result, error).await
    }

    // Caller holds the sequencer.
    async fn transition_locked(
        &self,
        call_id: &str,
        status: ToolStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Option<ToolCall> {
        let (task_id, call) = self.apply(call_id, status, result, error)?;
        self.emit(&status_change(&task_id, &call)).await;
        Some(call)
    }

    fn apply(
        &self,
        call_id: &str,
        status: ToolStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Option<(String, ToolCall)> {
        let mut calls = lock(&self.calls);
        let tracked = calls.get_mut(call_id)?;
        debug!(
            call_id = %call_id,
            from = %tracked.call.status,
            to = %status,
            "Tool call status changed"
        );
        tracked.call.status = status;
        tracked.call.result = result;
        tracked.call.error = error;
        tracked.call.timestamp = Utc::now();
        let snapshot = (tracked.task_id.clone(), tracked.call.clone());
        if status.is_terminal() {
            calls.remove(call_id);
        }
        Some(snapshot)
    }

    async fn emit(&self, event: &ToolEvent) {
        let listeners: Vec<Arc<dyn ToolEventListener>> = lock(&self.listeners).clone();
        for listener in listeners {
            listener.on_tool_event(event).await;
        }
    }
}

fn status_change(task_id: &str, call: &ToolCall) -> ToolEvent {
    ToolEvent::StatusChange {
        task_id: task_id.to_string(),
        call_id: call.call_id.clone(),
        status: call.status,
        result: call.result.clone(),
        error: call.error.clone(),
    }
}
