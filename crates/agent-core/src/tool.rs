//! Tool System
//!
//! Tools are registered once at startup and looked up by name when the
//! model asks for one. Each tool carries a [`ToolSpec`] describing the
//! arguments it accepts; the [`crate::invoker::ToolInvoker`] checks calls
//! against that spec before running the tool.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AgentError, Result};

/// Tool arguments as sent by the model
pub type Arguments = Map<String, Value>;

/// Tool call request from the model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool identifier
    #[serde(alias = "tool")]
    pub name: String,

    /// Arguments as key-value pairs
    #[serde(default)]
    pub arguments: Arguments,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Call with no arguments
    pub fn bare(name: impl Into<String>) -> Self {
        Self::new(name, Arguments::new())
    }
}

/// Result from tool execution
///
/// A flat mapping of string keys to primitive values. The `error` key is
/// reserved: a result carrying it is a failed invocation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolResult(Map<String, Value>);

impl ToolResult {
    /// Reserved key for failures
    pub const ERROR_KEY: &'static str = "error";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn success(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new().with(Self::ERROR_KEY, message.into())
    }

    /// Add a field
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.0.contains_key(Self::ERROR_KEY)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.0.get(Self::ERROR_KEY).and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// First key whose value is an array or object
    pub(crate) fn non_primitive_key(&self) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, v)| v.is_array() || v.is_object())
            .map(|(k, _)| k.as_str())
    }
}

impl From<Map<String, Value>> for ToolResult {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Primitive argument types a tool can declare
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
}

impl ParamType {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Number => write!(f, "number"),
            Self::Boolean => write!(f, "boolean"),
        }
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    #[serde(rename = "type")]
    pub param_type: ParamType,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,
}

impl ParameterSchema {
    pub fn required(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }
}

/// Tool definition (shown to the model for tool selection)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Parameter definitions
    #[serde(default)]
    pub parameters: Vec<ParameterSchema>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, parameter: ParameterSchema) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSchema> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Check arguments against the declared parameters.
    ///
    /// A `null` value counts as absent.
    pub fn validate(&self, arguments: &Arguments) -> Result<()> {
        for (key, value) in arguments {
            let Some(param) = self.parameter(key) else {
                return Err(AgentError::ArgumentValidation(format!(
                    "unexpected parameter '{key}' for tool '{}'",
                    self.name
                )));
            };
            if !value.is_null() && !param.param_type.matches(value) {
                return Err(AgentError::ArgumentValidation(format!(
                    "parameter '{key}' must be a {}, got {}",
                    param.param_type,
                    json_type_name(value)
                )));
            }
        }

        for param in self.parameters.iter().filter(|p| p.required) {
            if arguments.get(&param.name).is_none_or(Value::is_null) {
                return Err(AgentError::ArgumentValidation(format!(
                    "missing required parameter '{}'",
                    param.name
                )));
            }
        }

        Ok(())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool's spec; read once at registration
    fn spec(&self) -> ToolSpec;

    /// Execute the tool with already-validated arguments
    async fn execute(&self, arguments: &Arguments) -> Result<ToolResult>;
}

type ToolFn = dyn Fn(Arguments) -> BoxFuture<'static, Result<ToolResult>> + Send + Sync;

/// Adapter turning an async closure into a [`Tool`]
pub struct FnTool {
    spec: ToolSpec,
    func: Box<ToolFn>,
}

impl FnTool {
    pub fn new<F, Fut>(spec: ToolSpec, func: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolResult>> + Send + 'static,
    {
        Self {
            spec,
            func: Box::new(move |args| func(args).boxed()),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn spec(&self) -> ToolSpec {
        self.spec.clone()
    }

    async fn execute(&self, arguments: &Arguments) -> Result<ToolResult> {
        (self.func)(arguments.clone()).await
    }
}

/// Registry for available tools
///
/// Keeps registration order so the specs handed to the model are stable.
#[derive(Default)]
pub struct ToolRegistry {
    specs: Vec<ToolSpec>,
    handlers: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in tools
    pub fn with_builtin_tools() -> Self {
        let mut registry = Self::new();
        for tool in crate::builtin::builtin_tools() {
            // Built-in names are distinct, so this cannot collide.
            if let Err(e) = registry.register_boxed(tool) {
                tracing::error!(error = %e, "Failed to register built-in tool");
            }
        }
        registry
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        self.register_boxed(Arc::new(tool))
    }

    /// Register a shared tool
    pub fn register_boxed(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let spec = tool.spec();
        self.insert(spec, tool)
    }

    /// Register an async closure under `spec`
    pub fn register_fn<F, Fut>(&mut self, spec: ToolSpec, func: F) -> Result<()>
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolResult>> + Send + 'static,
    {
        let spec_copy = spec.clone();
        self.insert(spec_copy, Arc::new(FnTool::new(spec, func)))
    }

    fn insert(&mut self, spec: ToolSpec, handler: Arc<dyn Tool>) -> Result<()> {
        if spec.name.trim().is_empty() {
            return Err(AgentError::Config("tool name must not be empty".into()));
        }
        if self.index.contains_key(&spec.name) {
            return Err(AgentError::DuplicateTool(spec.name));
        }

        tracing::debug!(tool = %spec.name, "Registered tool");
        self.index.insert(spec.name.clone(), self.specs.len());
        self.specs.push(spec);
        self.handlers.push(handler);
        Ok(())
    }

    /// Get a tool and its spec by name
    pub fn lookup(&self, name: &str) -> Result<(&ToolSpec, Arc<dyn Tool>)> {
        let idx = *self
            .index
            .get(name)
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))?;
        Ok((&self.specs[idx], Arc::clone(&self.handlers[idx])))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Move every tool of `other` into this registry, keeping its order.
    ///
    /// Stops at the first name that is already taken; tools before it stay
    /// registered.
    pub fn merge(&mut self, other: Self) -> Result<()> {
        for (spec, handler) in other.specs.into_iter().zip(other.handlers) {
            self.insert(spec, handler)?;
        }
        Ok(())
    }

    /// All specs in registration order
    pub fn list_specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    /// Get tool names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.name.as_str()).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Generate system prompt section describing available tools
    pub fn generate_prompt_section(&self) -> String {
        render_tool_section(&self.specs)
    }
}

/// Render specs as a markdown block for text-protocol backends
pub fn render_tool_section(specs: &[ToolSpec]) -> String {
    use std::fmt::Write;

    let mut prompt = String::from("## Available Tools\n\n");
    prompt.push_str("You can use the following tools by responding with a JSON block:\n\n");
    prompt.push_str("```tool\n{\"tool\": \"tool_name\", \"arguments\": {\"arg\": \"value\"}}\n```\n\n");

    for spec in specs {
        let _ = writeln!(prompt, "### {}", spec.name);
        let _ = writeln!(prompt, "{}", spec.description);

        if !spec.parameters.is_empty() {
            prompt.push_str("**Parameters:**\n");
            for param in &spec.parameters {
                let required = if param.required { " (required)" } else { "" };
                let _ = writeln!(
                    prompt,
                    "- `{}` ({}){}: {}",
                    param.name, param.param_type, required, param.description
                );
            }
        }
        prompt.push('\n');
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_spec() -> ToolSpec {
        ToolSpec::new("echo", "Echo a message back")
            .with_parameter(ParameterSchema::required("text", ParamType::String, "Text to echo"))
            .with_parameter(ParameterSchema::optional("times", ParamType::Number, "Repeat count"))
            .with_parameter(ParameterSchema::optional("loud", ParamType::Boolean, "Uppercase"))
    }

    fn args(value: Value) -> Arguments {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_tool_registry() {
        let mut registry = ToolRegistry::with_builtin_tools();
        registry
            .register_fn(echo_spec(), |args| async move {
                Ok(ToolResult::new().with("text", args["text"].clone()))
            })
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["get_current_time", "echo"]);
        assert!(registry.lookup("echo").is_ok());
        assert!(matches!(
            registry.lookup("unknown"),
            Err(AgentError::UnknownTool(name)) if name == "unknown"
        ));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ToolRegistry::new();
        registry
            .register_fn(echo_spec(), |_| async { Ok(ToolResult::new()) })
            .unwrap();
        let err = registry
            .register_fn(echo_spec(), |_| async { Ok(ToolResult::new()) })
            .unwrap_err();

        assert!(matches!(err, AgentError::DuplicateTool(name) if name == "echo"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_param_type_matches_json_kinds() {
        assert!(ParamType::String.matches(&json!("noon")));
        assert!(ParamType::Number.matches(&json!(12.5)));
        assert!(ParamType::Boolean.matches(&json!(false)));
        assert!(!ParamType::Number.matches(&json!("12")));
        assert!(!ParamType::Boolean.matches(&json!(null)));
    }

    #[test]
    fn test_merge_appends_and_rejects_duplicates() {
        let mut registry = ToolRegistry::new();
        registry
            .register_fn(echo_spec(), |_| async { Ok(ToolResult::new()) })
            .unwrap();

        registry.merge(ToolRegistry::with_builtin_tools()).unwrap();
        assert_eq!(registry.names(), vec!["echo", "get_current_time"]);
        assert!(registry.lookup("get_current_time").is_ok());

        let err = registry.merge(ToolRegistry::with_builtin_tools()).unwrap_err();
        assert!(matches!(err, AgentError::DuplicateTool(name) if name == "get_current_time"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_list_specs_keeps_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry
                .register_fn(ToolSpec::new(name, "test"), |_| async { Ok(ToolResult::new()) })
                .unwrap();
        }
        let names: Vec<_> = registry.list_specs().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_validate_arguments() {
        let spec = echo_spec();

        assert!(spec.validate(&args(json!({"text": "hi"}))).is_ok());
        assert!(spec.validate(&args(json!({"text": "hi", "times": 2.5, "loud": true}))).is_ok());
        assert!(spec.validate(&args(json!({"text": "hi", "times": null}))).is_ok());

        let missing = spec.validate(&Arguments::new()).unwrap_err();
        assert!(missing.to_string().contains("missing required parameter 'text'"));

        let mistyped = spec.validate(&args(json!({"text": 7}))).unwrap_err();
        assert!(mistyped.to_string().contains("must be a string, got number"));

        let bool_as_string = spec.validate(&args(json!({"text": "x", "loud": "yes"}))).unwrap_err();
        assert!(matches!(bool_as_string, AgentError::ArgumentValidation(_)));

        let unexpected = spec.validate(&args(json!({"text": "x", "volume": 11}))).unwrap_err();
        assert!(unexpected.to_string().contains("unexpected parameter 'volume'"));
    }

    #[test]
    fn test_tool_result_error_key() {
        let ok = ToolResult::new().with("current_time", "2026-01-01T00:00:00Z");
        assert!(!ok.is_error());

        let failed = ToolResult::error("boom");
        assert!(failed.is_error());
        assert_eq!(failed.error_message(), Some("boom"));
        assert_eq!(serde_json::to_value(&failed).unwrap(), json!({"error": "boom"}));
    }

    #[test]
    fn test_tool_call_accepts_tool_alias() {
        let call: ToolCall =
            serde_json::from_str(r#"{"tool": "echo", "arguments": {"text": "hi"}}"#).unwrap();
        assert_eq!(call.name, "echo");
        assert_eq!(call.arguments["text"], "hi");

        let bare: ToolCall = serde_json::from_str(r#"{"name": "get_current_time"}"#).unwrap();
        assert!(bare.arguments.is_empty());
    }

    #[test]
    fn test_prompt_section_lists_parameters() {
        let mut registry = ToolRegistry::new();
        registry
            .register_fn(echo_spec(), |_| async { Ok(ToolResult::new()) })
            .unwrap();
        let section = registry.generate_prompt_section();
        assert!(section.contains("### echo"));
        assert!(section.contains("- `text` (string) (required): Text to echo"));
        assert!(section.contains("- `times` (number): Repeat count"));
    }
}
