//! Built-in tools.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};

use super::registry::Tool;

/// Largest file `read_file` will return.
pub const MAX_READ_BYTES: u64 = 1024 * 1024;

/// Every built-in tool.
#[must_use]
pub fn all() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(Calculator),
        Arc::new(ReadFile),
        Arc::new(CurrentTime),
    ]
}

/// Basic arithmetic on two numbers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Calculator;

#[async_trait]
impl Tool for Calculator {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Performs basic arithmetic: add, subtract, multiply, divide"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["add", "subtract", "multiply", "divide"]
                },
                "a": {"type": "number"},
                "b": {"type": "number"}
            },
            "required": ["operation", "a", "b"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value, String> {
        let operand = |key: &str| {
            input
                .get(key)
                .and_then(Value::as_f64)
                .ok_or_else(|| format!("Missing numeric operand '{key}'"))
        };
        let a = operand("a")?;
        let b = operand("b")?;
        let result = match input.get("operation").and_then(Value::as_str) {
            Some("add") => a + b,
            Some("subtract") => a - b,
            Some("multiply") => a * b,
            Some("divide") if b == 0.0 => return Err("Division by zero".to_string()),
            Some("divide") => a / b,
            Some(other) => return Err(format!("Unknown operation: {other}")),
            None => return Err("Missing operation".to_string()),
        };
        Ok(json!({ "result": number(result) }))
    }
}

// Integral results render as integers so 5 + 3 reads as 8, not 8.0.
#[allow(clippy::cast_possible_truncation)]
fn number(value: f64) -> Value {
    const EXACT: f64 = 9_007_199_254_740_992.0;
    if value.is_finite() && value.fract() == 0.0 && value.abs() <= EXACT {
        json!(value as i64)
    } else {
        json!(value)
    }
}

/// Reads a UTF-8 text file. Every call requires approval.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadFile;

#[async_trait]
impl Tool for ReadFile {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Reads a UTF-8 text file from the local filesystem"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "minLength": 1}
            },
            "required": ["path"]
        })
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn execute(&self, input: Value) -> Result<Value, String> {
        let path = input
            .get("path")
            .and_then(Value::as_str)
            .ok_or("Missing 'path'")?;
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| format!("Cannot read {path}: {e}"))?;
        if !metadata.is_file() {
            return Err(format!("{path} is not a regular file"));
        }
        if metadata.len() > MAX_READ_BYTES {
            return Err(format!(
                "{path} is {} bytes, limit is {MAX_READ_BYTES}",
                metadata.len()
            ));
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Cannot read {path}: {e}"))?;
        Ok(json!({
            "path": path,
            "bytes": content.len(),
            "content": content,
        }))
    }
}

/// Returns the current UTC time.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentTime;

#[async_trait]
impl Tool for CurrentTime {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Returns the current UTC time"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn execute(&self, _input: Value) -> Result<Value, String> {
        let now = Utc::now();
        Ok(json!({
            "iso": now.to_rfc3339(),
            "unix": now.timestamp(),
        }))
    }
}
