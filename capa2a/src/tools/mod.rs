//! Tools: the catalog, built-in tools and the approval-aware executor.

pub mod builtin;
mod executor;
mod registry;

pub use executor::{DEFAULT_REJECTION_REASON, ToolEvent, ToolEventListener, ToolExecutor};
pub use registry::{FunctionTool, Tool, ToolRegistry};
