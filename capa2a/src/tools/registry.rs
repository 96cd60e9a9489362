//! Tool catalog with JSON Schema input validation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{A2AError, Result};
use crate::types::{ToolDescriptor, ValidationResult};

/// A callable tool.
///
/// `execute` receives input that already passed schema validation. Failures
/// are reported as plain strings and recorded on the call's `error`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name within a registry.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema for the input.
    fn input_schema(&self) -> Value;

    /// Whether every call must be approved before it runs.
    fn requires_approval(&self) -> bool {
        false
    }

    /// Runs the tool.
    async fn execute(&self, input: Value) -> std::result::Result<Value, String>;
}

type ToolFn = dyn Fn(Value) -> BoxFuture<'static, std::result::Result<Value, String>> + Send + Sync;

/// A tool backed by an async closure.
///
/// ```ignore
/// let echo = FunctionTool::new(
///     "echo",
///     "Returns its input",
///     json!({"type": "object"}),
///     |input| async move { Ok(input) },
/// );
/// ```
pub struct FunctionTool {
    name: String,
    description: String,
    input_schema: Value,
    requires_approval: bool,
    function: Box<ToolFn>,
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("requires_approval", &self.requires_approval)
            .finish_non_exhaustive()
    }
}

impl FunctionTool {
    /// Wraps a closure as a tool.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        function: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, String>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            requires_approval: false,
            function: Box::new(move |input| Box::pin(function(input))),
        }
    }

    /// Requires approval before each call.
    #[must_use]
    pub const fn with_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.input_schema.clone()
    }

    fn requires_approval(&self) -> bool {
        self.requires_approval
    }

    async fn execute(&self, input: Value) -> std::result::Result<Value, String> {
        (self.function)(input).await
    }
}

struct Entry {
    tool: Arc<dyn Tool>,
    validator: jsonschema::Validator,
}

/// Name-keyed catalog of tools. Each tool's schema is compiled on
/// registration.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Entry>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<&String> = tools.keys().collect();
        names.sort();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in tools.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for tool in super::builtin::all() {
            // Built-in schemas are static and always compile.
            if let Err(e) = registry.register_arc(tool) {
                warn!(error = %e, "Skipping built-in tool");
            }
        }
        registry
    }

    /// Registers a tool, replacing any tool with the same name.
    ///
    /// Fails with `InvalidParams` if the input schema does not compile.
    pub fn register(&self, tool: impl Tool + 'static) -> Result<()> {
        self.register_arc(Arc::new(tool))
    }

    /// Registers a shared tool.
    pub fn register_arc(&self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        let validator = jsonschema::validator_for(&tool.input_schema()).map_err(|e| {
            A2AError::InvalidParams(format!("Invalid input schema for tool '{name}': {e}"))
        })?;
        let previous = self
            .tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), Entry { tool, validator });
        if previous.is_some() {
            warn!(tool = %name, "Tool replaced");
        } else {
            debug!(tool = %name, "Tool registered");
        }
        Ok(())
    }

    /// Looks up a tool.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|entry| Arc::clone(&entry.tool))
    }

    /// Returns true if a tool with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Checks input against the named tool's schema.
    ///
    /// Each error reads `"<instance path>: <message>"`; the path is omitted
    /// for errors at the root.
    #[must_use]
    pub fn validate_input(&self, name: &str, input: &Value) -> ValidationResult {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = tools.get(name) else {
            return ValidationResult::invalid(vec![format!("Tool not found: {name}")]);
        };
        let errors: Vec<String> = entry
            .validator
            .iter_errors(input)
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{path}: {e}")
                }
            })
            .collect();
        if errors.is_empty() {
            ValidationResult::ok()
        } else {
            ValidationResult::invalid(errors)
        }
    }

    /// Describes every tool, sorted by name.
    #[must_use]
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        let mut descriptors: Vec<ToolDescriptor> = tools
            .values()
            .map(|entry| ToolDescriptor {
                name: entry.tool.name().to_string(),
                description: entry.tool.description().to_string(),
                input_schema: entry.tool.input_schema(),
                requires_approval: entry.tool.requires_approval(),
            })
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
