//! Error types for the task lifecycle engine.
//!
//! Every failure carries a stable kind string (see [`A2AError::kind`]) that
//! callers branch on, and maps to a JSON-RPC error code so a transport layer
//! can marshal it without re-deriving the mapping.
//!
//! # Error Categories
//!
//! - **Lookup/validation**: task not found, invalid request or params
//! - **Access**: unauthorized (no valid credentials), forbidden (ownership)
//! - **Service**: internal, not implemented, unavailable, rate limited
//! - **Infrastructure**: JSON and I/O errors

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A specialized Result type for engine operations.
pub type Result<T> = std::result::Result<T, A2AError>;

/// The main error type.
#[derive(Error, Debug)]
pub enum A2AError {
    /// A task with the provided ID was not found.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// The request is well-formed but not acceptable in the current state.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Parameters were missing or malformed.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// The caller has no valid credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The caller is authenticated but may not touch this resource.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// An unexpected failure inside the engine.
    #[error("internal error: {0}")]
    InternalError(String),

    /// The operation is not supported by this deployment.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// A collaborator is temporarily unavailable.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Reserved for an external rate limiter.
    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl A2AError {
    /// Returns the stable kind string for this error.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TaskNotFound(_) => "TaskNotFound",
            Self::InvalidRequest(_) | Self::Json(_) => "InvalidRequest",
            Self::InvalidParams(_) => "InvalidParams",
            Self::Unauthorized(_) => "Unauthorized",
            Self::Forbidden(_) => "Forbidden",
            Self::InternalError(_) | Self::Io(_) => "InternalError",
            Self::NotImplemented(_) => "NotImplemented",
            Self::ServiceUnavailable(_) => "ServiceUnavailable",
            Self::RateLimitExceeded(_) => "RateLimitExceeded",
        }
    }

    /// Shorthand for a [`A2AError::TaskNotFound`] naming the task.
    pub fn task_not_found(task_id: impl fmt::Display) -> Self {
        Self::TaskNotFound(format!("Task {task_id} not found"))
    }

    /// Converts this error to a [`JsonRpcError`] for transport serialization.
    #[must_use]
    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        let code = self.jsonrpc_error_code();
        let mut error = JsonRpcError::new(code, self.to_string());
        error.data = Some(serde_json::json!({ "kind": self.kind() }));
        error
    }

    const fn jsonrpc_error_code(&self) -> JsonRpcErrorCode {
        match self {
            Self::TaskNotFound(_) => JsonRpcErrorCode::TaskNotFound,
            Self::InvalidRequest(_) => JsonRpcErrorCode::InvalidRequest,
            Self::InvalidParams(_) => JsonRpcErrorCode::InvalidParams,
            Self::Json(_) => JsonRpcErrorCode::ParseError,
            Self::Unauthorized(_) => JsonRpcErrorCode::Unauthorized,
            Self::Forbidden(_) => JsonRpcErrorCode::Forbidden,
            Self::InternalError(_) | Self::Io(_) => JsonRpcErrorCode::InternalError,
            Self::NotImplemented(_) => JsonRpcErrorCode::NotImplemented,
            Self::ServiceUnavailable(_) => JsonRpcErrorCode::ServiceUnavailable,
            Self::RateLimitExceeded(_) => JsonRpcErrorCode::RateLimitExceeded,
        }
    }
}

/// JSON-RPC 2.0 error codes, with A2A-specific codes in the server range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum JsonRpcErrorCode {
    /// Invalid JSON was received.
    ParseError = -32700,
    /// The request is not acceptable.
    InvalidRequest = -32600,
    /// Invalid method parameter(s).
    InvalidParams = -32602,
    /// Internal error.
    InternalError = -32603,
    /// A collaborator is unavailable.
    ServiceUnavailable = -32000,
    /// Task not found.
    TaskNotFound = -32001,
    /// Operation not supported.
    NotImplemented = -32004,
    /// Too many requests.
    RateLimitExceeded = -32029,
    /// No valid credentials.
    Unauthorized = -31401,
    /// Permission denied.
    Forbidden = -31403,
}

impl From<i32> for JsonRpcErrorCode {
    fn from(code: i32) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32602 => Self::InvalidParams,
            -32000 => Self::ServiceUnavailable,
            -32001 => Self::TaskNotFound,
            -32004 => Self::NotImplemented,
            -32029 => Self::RateLimitExceeded,
            -31401 => Self::Unauthorized,
            -31403 => Self::Forbidden,
            _ => Self::InternalError,
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i32,
    /// Short description.
    pub message: String,
    /// Additional information; carries `{"kind": ...}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl JsonRpcError {
    /// Creates a JSON-RPC error.
    pub fn new(code: JsonRpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code as i32,
            message: message.into(),
            data: None,
        }
    }

    /// Returns the error code as an enum variant.
    #[must_use]
    pub fn error_code(&self) -> JsonRpcErrorCode {
        JsonRpcErrorCode::from(self.code)
    }
}
