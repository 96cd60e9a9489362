//! # capa2a
//!
//! Task lifecycle engine for `Agent2Agent` (A2A) agents.
//!
//! The crate owns the parts of an A2A agent that carry state: tasks and
//! their state machine, streaming fan-out of task updates, and tool calls
//! that can suspend a task until a human approves them. Transports are left
//! to the embedding application; everything here is plain async Rust.
//!
//! ```no_run
//! use capa2a::{Message, MessageSendParams, TaskService};
//!
//! # async fn run() -> capa2a::Result<()> {
//! let service = TaskService::builder().build();
//! let response = service
//!     .send_message(MessageSendParams::new(Message::user_text("hello")))
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod config;
pub mod error;
pub mod server;
pub mod telemetry;
pub mod tools;
pub mod types;

pub use config::{AgentIdentity, ServiceConfig};
pub use error::{A2AError, JsonRpcErrorCode, Result};
pub use server::{
    AgentCardProducer, AuthenticatedService, Authenticator, ChannelSubscriber, Credentials,
    EchoProcessor, MessageProcessor, ProcessingContext, StaticTokenAuthenticator, StreamCallback,
    StreamEvent, StreamingTask, TaskService, TaskStore, TaskUpdate, TaskUpdater,
};
pub use tools::{FunctionTool, Tool, ToolExecutor, ToolRegistry};
pub use types::{
    AgentCapabilities, AgentCard, AgentSkill, ApproveToolCallParams, Artifact, ExecuteToolParams,
    ListTasksParams, ListTasksResult, Message, MessageSendParams, Part, PendingApproval, Role,
    SendMessageResponse, Task, TaskIdParams, TaskQueryParams, TaskState, TaskStatus, ToolCall,
    ToolStatus,
};

/// A2A protocol version spoken by this crate.
pub const PROTOCOL_VERSION: &str = "0.3.0";
