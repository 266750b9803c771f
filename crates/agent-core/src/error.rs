//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
///
/// Only the model-boundary and loop-termination variants ever reach the
/// caller of [`crate::service::SessionManager::send`]. Tool-level failures
/// are folded into a [`crate::tool::ToolResult`] by the invoker.
#[derive(Error, Debug)]
pub enum AgentError {
    /// A tool with this name is already registered
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    /// Tool not found in registry
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Arguments did not match the tool's schema
    #[error("Invalid arguments: {0}")]
    ArgumentValidation(String),

    /// Failure reported by a tool implementation
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Model backend unreachable, timed out, rate limited or rejected auth
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Model produced something the loop cannot act on
    #[error("Model protocol error: {0}")]
    ModelProtocol(String),

    /// Maximum tool rounds reached in the agent loop
    #[error("Maximum tool rounds ({0}) exceeded")]
    MaxIterations(usize),

    /// Session history invariant violated
    #[error("Session error: {0}")]
    Session(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Check if the caller may retry the whole `send`
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ModelUnavailable(_))
    }

    /// Stable machine-readable code for presentation layers
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DuplicateTool(_) => "DUPLICATE_TOOL",
            Self::UnknownTool(_) => "UNKNOWN_TOOL",
            Self::ArgumentValidation(_) => "ARGUMENT_VALIDATION",
            Self::ToolExecution(_) => "TOOL_EXECUTION",
            Self::ModelUnavailable(_) => "MODEL_UNAVAILABLE",
            Self::ModelProtocol(_) => "MODEL_PROTOCOL",
            Self::MaxIterations(_) => "MAX_ITERATIONS",
            Self::Session(_) => "SESSION",
            Self::Config(_) => "CONFIG",
            Self::Json(_) | Self::Other(_) => "INTERNAL",
        }
    }

    /// Whether this kind may be handed to the caller of `send` as is
    pub const fn is_caller_facing(&self) -> bool {
        matches!(
            self,
            Self::ModelUnavailable(_) | Self::ModelProtocol(_) | Self::MaxIterations(_)
        )
    }

    /// Fold anything that is not caller-facing into `ModelProtocol`; an
    /// internal fault mid-exchange means the turn cannot be completed.
    #[must_use]
    pub fn into_caller_error(self) -> Self {
        if self.is_caller_facing() {
            self
        } else {
            tracing::error!(code = self.code(), error = %self, "Internal failure during exchange");
            Self::ModelProtocol(self.to_string())
        }
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::ModelUnavailable(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            Self::ModelProtocol(msg) => {
                format!("The AI service returned a response that could not be used: {msg}")
            }
            Self::MaxIterations(n) => format!(
                "The assistant used too many tools ({n}) without answering. Please try a simpler question."
            ),
            Self::UnknownTool(name) => format!("The tool '{name}' is not available."),
            Self::ArgumentValidation(msg) => format!("Invalid tool input: {msg}"),
            Self::ToolExecution(msg) => format!("Tool error: {msg}"),
            Self::Config(msg) => format!("The assistant is misconfigured: {msg}"),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
