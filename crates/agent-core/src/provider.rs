//! Model Client Boundary
//!
//! The agent loop talks to the language model only through [`ModelClient`].
//! A client receives the full turn history plus the available tool specs and
//! answers with exactly one [`ModelResponse`]; how that travels over the wire
//! is the client's business.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_core::provider::ModelClient;
//!
//! let client = OllamaClient::new("http://localhost", 11434);
//! let response = client.generate(session.history(), registry.list_specs()).await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::tool::{ToolCall, ToolSpec};
use crate::turn::Turn;

/// Configuration for LLM generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier (e.g., "llama3.2", "gemini-2.0-flash")
    pub model: String,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Top-p nucleus sampling
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

const fn default_temperature() -> f32 { 0.7 }
const fn default_max_tokens() -> u32 { 2048 }
const fn default_top_p() -> f32 { 0.9 }

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "llama3.2".into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
        }
    }
}

/// What the model wants next
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelResponse {
    /// The answer for the user; ends the exchange
    FinalText(String),

    /// Run this tool and report back
    ToolCall(ToolCall),
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self::FinalText(text.into())
    }

    pub fn tool(call: ToolCall) -> Self {
        Self::ToolCall(call)
    }
}

/// Loosely-typed model output, before it is known to be well formed
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawModelOutput {
    pub text: Option<String>,
    pub tool_call: Option<ToolCall>,
}

impl RawModelOutput {
    /// Exactly one of text or tool call must be present; blank text counts
    /// as absent.
    pub fn into_response(self) -> Result<ModelResponse> {
        let text = self.text.filter(|t| !t.trim().is_empty());

        match (text, self.tool_call) {
            (Some(text), None) => Ok(ModelResponse::FinalText(text)),
            (None, Some(call)) => Ok(ModelResponse::ToolCall(call)),
            (Some(_), Some(call)) => Err(AgentError::ModelProtocol(format!(
                "response carries both text and a call to '{}'",
                call.name
            ))),
            (None, None) => Err(AgentError::ModelProtocol(
                "response carries neither text nor a tool call".into(),
            )),
        }
    }
}

/// Boundary to the remote language model
///
/// Implementations must map transport failures, timeouts, rate limits and
/// auth failures to [`AgentError::ModelUnavailable`], and replies they
/// cannot turn into a [`ModelResponse`] to [`AgentError::ModelProtocol`].
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Backend name for logs and health output
    fn name(&self) -> &str {
        "model"
    }

    /// Check if the backend is reachable
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    /// Produce the next response given the history so far
    async fn generate(&self, history: &[Turn], tools: &[ToolSpec]) -> Result<ModelResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_options_defaults() {
        let opts = GenerationOptions::default();
        assert!((opts.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(opts.max_tokens, 2048);
        assert_eq!(opts.model, "llama3.2");
    }

    #[test]
    fn test_raw_output_tie_break() {
        let text_only = RawModelOutput {
            text: Some("It is 14:30.".into()),
            tool_call: None,
        };
        assert_eq!(
            text_only.into_response().unwrap(),
            ModelResponse::text("It is 14:30.")
        );

        let call_only = RawModelOutput {
            text: Some("   ".into()),
            tool_call: Some(ToolCall::bare("get_current_time")),
        };
        assert!(matches!(call_only.into_response().unwrap(), ModelResponse::ToolCall(c) if c.name == "get_current_time"));

        let both = RawModelOutput {
            text: Some("checking".into()),
            tool_call: Some(ToolCall::bare("get_current_time")),
        };
        assert!(matches!(both.into_response(), Err(AgentError::ModelProtocol(_))));

        let neither = RawModelOutput::default();
        assert!(matches!(neither.into_response(), Err(AgentError::ModelProtocol(_))));
    }
}
