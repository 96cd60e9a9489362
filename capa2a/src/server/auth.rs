//! Authentication and the user-scoped service capability.
//!
//! [`TaskService::authenticate`](super::TaskService::authenticate) trades
//! credentials for an [`AuthenticatedService`]. The wrapper carries the
//! caller's identity into every call; credentials are not re-checked.
//!
//! Ownership is the task's `metadata.userId`. Tasks without one are visible to
//! every user.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::card::AgentCardProducer;
use super::service::TaskService;
use super::streaming::{StreamCallback, StreamingTask};
use crate::error::{A2AError, Result};
use crate::types::{
    AgentCard, ApproveToolCallParams, ExecuteToolParams, ListTasksParams, ListTasksResult,
    MessageSendParams, PendingApproval, SendMessageResponse, Task, TaskIdParams, TaskQueryParams,
    ToolCall, ToolDescriptor, USER_ID_METADATA_KEY,
};

/// Permission that grants every other permission.
pub const WILDCARD_PERMISSION: &str = "*";

/// Credentials presented by a caller.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    /// Bearer token.
    pub token: String,
}

impl Credentials {
    /// Creates bearer credentials.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// What an [`Authenticator`] decided.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthResult {
    /// Whether the credentials were accepted.
    pub authenticated: bool,
    /// The caller's identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Granted permissions.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// When the grant lapses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthResult {
    /// An accepted result.
    pub fn granted(user_id: impl Into<String>, permissions: Vec<String>) -> Self {
        Self {
            authenticated: true,
            user_id: Some(user_id.into()),
            permissions,
            expires_at: None,
        }
    }

    /// A rejected result.
    #[must_use]
    pub fn denied() -> Self {
        Self::default()
    }
}

/// Validates credentials. Implementations live outside the engine.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Checks credentials. Rejections should be `Ok` with
    /// `authenticated: false`; errors are for infrastructure failures.
    async fn authenticate(&self, credentials: &Credentials) -> Result<AuthResult>;
}

/// Maps fixed tokens to users.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, AuthResult>,
}

impl StaticTokenAuthenticator {
    /// Creates an authenticator that accepts nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `token` as `user_id`.
    #[must_use]
    pub fn with_token(
        mut self,
        token: impl Into<String>,
        user_id: impl Into<String>,
        permissions: Vec<String>,
    ) -> Self {
        self.tokens
            .insert(token.into(), AuthResult::granted(user_id, permissions));
        self
    }

    /// Accepts `token` as `user_id` until `expires_at`.
    #[must_use]
    pub fn with_expiring_token(
        mut self,
        token: impl Into<String>,
        user_id: impl Into<String>,
        permissions: Vec<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let mut grant = AuthResult::granted(user_id, permissions);
        grant.expires_at = Some(expires_at);
        self.tokens.insert(token.into(), grant);
        self
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, credentials: &Credentials) -> Result<AuthResult> {
        Ok(self
            .tokens
            .get(&credentials.token)
            .cloned()
            .unwrap_or_else(AuthResult::denied))
    }
}

/// A [`TaskService`] scoped to one authenticated user.
///
/// New tasks are stamped with the user's ID; tasks owned by someone else
/// are `Forbidden`. Every call fails with `Unauthorized` once the grant has
/// expired.
#[derive(Debug, Clone)]
pub struct AuthenticatedService {
    service: Arc<TaskService>,
    user_id: String,
    permissions: Vec<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl AuthenticatedService {
    pub(crate) const fn new(
        service: Arc<TaskService>,
        user_id: String,
        permissions: Vec<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            service,
            user_id,
            permissions,
            expires_at,
        }
    }

    /// The caller's identity.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Granted permissions.
    #[must_use]
    pub fn permissions(&self) -> &[String] {
        &self.permissions
    }

    /// When the grant lapses, if ever.
    #[must_use]
    pub const fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Returns true if the permission was granted, directly or through `*`.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions
            .iter()
            .any(|p| p == permission || p == WILDCARD_PERMISSION)
    }

    /// Returns true once the grant has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }

    /// Sends a message as this user.
    pub async fn send_message(&self, params: MessageSendParams) -> Result<SendMessageResponse> {
        let params = self.scope_message(params).await?;
        self.service.send_message(params).await
    }

    /// Streams a message as this user.
    pub async fn send_message_streaming(
        &self,
        params: MessageSendParams,
        callback: Option<Arc<dyn StreamCallback>>,
    ) -> Result<StreamingTask> {
        let params = self.scope_message(params).await?;
        self.service.send_message_streaming(params, callback).await
    }

    /// Returns an owned task.
    pub async fn get_task(&self, params: TaskQueryParams) -> Result<Task> {
        self.ensure_live()?;
        let task = self.service.get_task(params).await?;
        self.ensure_owner(&task)?;
        Ok(task)
    }

    /// Lists the caller's tasks. Any `userId` filter in `params` is replaced.
    pub async fn list_tasks(&self, params: &ListTasksParams) -> Result<ListTasksResult> {
        self.ensure_live()?;
        let scoped = params.clone().owned_by(&self.user_id);
        self.service.list_tasks(&scoped).await
    }

    /// Cancels an owned task.
    pub async fn cancel_task(&self, params: TaskIdParams) -> Result<Task> {
        self.ensure_owned(&params.id).await?;
        self.service.cancel_task(params).await
    }

    /// Starts a tool call on an owned task.
    pub async fn execute_tool(&self, params: ExecuteToolParams) -> Result<ToolCall> {
        self.ensure_owned(&params.task_id).await?;
        self.service.execute_tool(params).await
    }

    /// Resolves an approval on an owned task.
    pub async fn approve_tool_call(&self, params: ApproveToolCallParams) -> Result<ToolCall> {
        self.ensure_live()?;
        let owning_task = self
            .service
            .get_pending_approvals(None)
            .into_iter()
            .find(|p| p.call_id == params.call_id)
            .map(|p| p.task_id);
        if let Some(task_id) = owning_task {
            self.ensure_owned(&task_id).await?;
        }
        self.service.approve_tool_call(params).await
    }

    /// Pending approvals on the caller's tasks.
    pub async fn get_pending_approvals(&self, task_id: Option<&str>) -> Result<Vec<PendingApproval>> {
        self.ensure_live()?;
        let mut visible = Vec::new();
        for approval in self.service.get_pending_approvals(task_id) {
            match self.service.store().get_task(&approval.task_id, Some(0)).await {
                Ok(task) if self.owns(&task) => visible.push(approval),
                Ok(_) | Err(A2AError::TaskNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(visible)
    }

    /// Describes the registered tools.
    pub fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        self.ensure_live()?;
        Ok(self.service.list_tools())
    }

    /// The discovery descriptor.
    pub async fn agent_card(&self) -> Result<AgentCard> {
        self.service.card().await
    }

    async fn scope_message(&self, mut params: MessageSendParams) -> Result<MessageSendParams> {
        self.ensure_live()?;
        if let Some(task_id) = &params.message.task_id {
            self.ensure_owned(task_id).await?;
        }
        params
            .metadata
            .get_or_insert_with(Default::default)
            .insert(USER_ID_METADATA_KEY.to_string(), self.user_id.clone().into());
        Ok(params)
    }

    async fn ensure_owned(&self, task_id: &str) -> Result<()> {
        self.ensure_live()?;
        let task = self.service.store().get_task(task_id, Some(0)).await?;
        self.ensure_owner(&task)
    }

    fn ensure_owner(&self, task: &Task) -> Result<()> {
        if self.owns(task) {
            Ok(())
        } else {
            debug!(task_id = %task.id, user_id = %self.user_id, "Access to foreign task denied");
            Err(A2AError::Forbidden(format!(
                "Task {} belongs to another user",
                task.id
            )))
        }
    }

    fn owns(&self, task: &Task) -> bool {
        task.owner().is_none_or(|owner| owner == self.user_id)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_expired() {
            return Err(A2AError::Unauthorized("Session expired".into()));
        }
        Ok(())
    }
}
