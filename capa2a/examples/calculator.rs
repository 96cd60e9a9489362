//! Example: a calculator agent with an approval-gated file reader.
//!
//! Run with `RUST_LOG=capa2a=debug cargo run --example calculator`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use capa2a::{
    ApproveToolCallParams, ChannelSubscriber, ExecuteToolParams, Message, MessageProcessor,
    MessageSendParams, ProcessingContext, Result, ServiceConfig, StreamCallback, TaskService,
    ToolCall,
};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

/// Understands `<a> <op> <b>` and `read <path>`.
struct CalculatorAgent;

#[async_trait]
impl MessageProcessor for CalculatorAgent {
    async fn process(&self, ctx: ProcessingContext) -> Result<()> {
        let text = ctx.message.text_content().unwrap_or_default();
        let Some((tool, input)) = plan(&text) else {
            ctx.updater.require_input("Try `12 * 7` or `read Cargo.toml`").await?;
            return Ok(());
        };

        let call = ctx
            .tools
            .execute_tool(ExecuteToolParams::new(&ctx.task_id, tool, input))
            .await;
        let call = wait_until_done(&ctx, &call.call_id).await?;

        match (call.result, call.error) {
            (Some(result), _) => {
                ctx.updater
                    .add_text_artifact("result", result.to_string())
                    .await?;
                ctx.updater
                    .complete_with_message(Message::agent_text(format!("{tool} finished")))
                    .await?;
            }
            (None, error) => {
                ctx.updater
                    .fail(error.unwrap_or_else(|| "Tool produced no result".into()))
                    .await?;
            }
        }
        Ok(())
    }
}

fn plan(text: &str) -> Option<(&'static str, Value)> {
    if let Some(path) = text.strip_prefix("read ") {
        return Some(("read_file", json!({ "path": path.trim() })));
    }
    let mut words = text.split_whitespace();
    let a: f64 = words.next()?.parse().ok()?;
    let operation = match words.next()? {
        "+" => "add",
        "-" => "subtract",
        "*" => "multiply",
        "/" => "divide",
        _ => return None,
    };
    let b: f64 = words.next()?.parse().ok()?;
    Some(("calculator", json!({ "operation": operation, "a": a, "b": b })))
}

// Finished calls stay on the task after the executor lets them go.
async fn wait_until_done(ctx: &ProcessingContext, call_id: &str) -> Result<ToolCall> {
    loop {
        let task = ctx.updater.task().await?;
        if let Some(call) = task.tool_calls.into_iter().find(|c| c.call_id == call_id)
            && call.status.is_terminal()
        {
            return Ok(call);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("capa2a=info")),
        )
        .init();

    let config = ServiceConfig::from_json(
        r#"{ "toolTimeoutMs": 5000, "agent": { "name": "Calculator Agent" } }"#,
    )?;
    let service = Arc::new(
        TaskService::builder()
            .with_config(config)
            .with_processor(CalculatorAgent)
            .build(),
    );

    let card = service.agent_card();
    println!("Agent card:\n{}", serde_json::to_string_pretty(&card).unwrap_or_default());

    // Streamed arithmetic.
    let (subscriber, mut events) = ChannelSubscriber::new();
    let callback: Arc<dyn StreamCallback> = subscriber;
    service
        .send_message_streaming(
            MessageSendParams::new(Message::user_text("12 * 7")),
            Some(callback),
        )
        .await?;
    while let Some(event) = events.recv().await {
        println!("event: {}", serde_json::to_string(&event).unwrap_or_default());
        if event.is_final() {
            break;
        }
    }

    // A file read suspends the task until someone approves it.
    let task = service
        .send_message(MessageSendParams::new(Message::user_text("read Cargo.toml")))
        .await?
        .into_task()
        .ok_or_else(|| capa2a::A2AError::InternalError("expected a task".into()))?;

    let pending = loop {
        let pending = service.get_pending_approvals(Some(&task.id));
        if let Some(first) = pending.into_iter().next() {
            break first;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    };
    let suspended = service.store().get_task(&task.id, Some(0)).await?;
    println!(
        "{} is {} waiting on {} ({})",
        task.id,
        suspended.status.state,
        pending.tool_name,
        pending.call_id
    );

    service
        .approve_tool_call(ApproveToolCallParams::approve(&pending.call_id))
        .await?;

    loop {
        let current = service.store().get_task(&task.id, Some(0)).await?;
        if current.is_terminal() {
            println!("{} finished as {}", current.id, current.status.state);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Ok(())
}
