//! Conversation Turns
//!
//! A session's history is an ordered list of turns: what the user said,
//! what the model answered, which tool the model called and what the tool
//! returned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tool::{Arguments, ToolCall, ToolResult};

/// Role of a turn
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// User input
    User,
    /// Final model text
    Model,
    /// Model asked for a tool
    ToolCall,
    /// Output of that tool, fed back to the model
    ToolResult,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Model => write!(f, "model"),
            Self::ToolCall => write!(f, "tool_call"),
            Self::ToolResult => write!(f, "tool_result"),
        }
    }
}

/// Payload of a turn; the variant fixes the role
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum TurnContent {
    User { text: String },
    Model { text: String },
    ToolCall { name: String, arguments: Arguments },
    ToolResult { name: String, result: ToolResult },
}

/// A single entry in the conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    #[serde(flatten)]
    pub content: TurnContent,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    fn new(content: TurnContent) -> Self {
        Self {
            content,
            timestamp: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(TurnContent::User { text: text.into() })
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::new(TurnContent::Model { text: text.into() })
    }

    pub fn tool_call(call: &ToolCall) -> Self {
        Self::new(TurnContent::ToolCall {
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        })
    }

    pub fn tool_result(name: impl Into<String>, result: ToolResult) -> Self {
        Self::new(TurnContent::ToolResult {
            name: name.into(),
            result,
        })
    }

    pub const fn role(&self) -> Role {
        match self.content {
            TurnContent::User { .. } => Role::User,
            TurnContent::Model { .. } => Role::Model,
            TurnContent::ToolCall { .. } => Role::ToolCall,
            TurnContent::ToolResult { .. } => Role::ToolResult,
        }
    }

    /// Text of a user or model turn
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            TurnContent::User { text } | TurnContent::Model { text } => Some(text),
            _ => None,
        }
    }

    /// Tool named by a tool-call or tool-result turn
    pub fn tool_name(&self) -> Option<&str> {
        match &self.content {
            TurnContent::ToolCall { name, .. } | TurnContent::ToolResult { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Render as plain text, for backends that only take text messages
    pub fn render(&self) -> String {
        match &self.content {
            TurnContent::User { text } | TurnContent::Model { text } => text.clone(),
            TurnContent::ToolCall { name, arguments } => {
                let call = serde_json::json!({ "tool": name, "arguments": arguments });
                format!("```tool\n{call}\n```")
            }
            TurnContent::ToolResult { name, result } => {
                let body = serde_json::to_string(result).unwrap_or_default();
                if result.is_error() {
                    format!("[Tool '{name}' failed]\n{body}")
                } else {
                    format!("[Tool '{name}' returned]\n{body}")
                }
            }
        }
    }
}
