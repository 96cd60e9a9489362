//! Tracing spans for background work.
//!
//! Message processing and tool execution run detached from the caller; these
//! spans carry the identifiers their log lines need.

use tracing::{Span, info_span};

/// Span covering the background processing of one message.
#[must_use]
pub fn process_span(task_id: &str, context_id: &str) -> Span {
    info_span!("process_message", task_id = %task_id, context_id = %context_id)
}

/// Span covering one tool call from validation to its terminal status.
#[must_use]
pub fn tool_span(task_id: &str, call_id: &str, tool: &str) -> Span {
    info_span!("tool_call", task_id = %task_id, call_id = %call_id, tool = %tool)
}
