//! Ollama Model Client
//!
//! Implementation of `ModelClient` for local Ollama inference, speaking the
//! text tool-call protocol from [`crate::protocol`].

use std::time::Duration;

use agent_core::{
    error::{AgentError, Result},
    provider::{GenerationOptions, ModelClient, ModelResponse},
    tool::ToolSpec,
    turn::Turn,
};
use async_trait::async_trait;
use ollama_rs::{
    generation::{
        chat::{ChatMessage, MessageRole, request::ChatMessageRequest},
    },
    models::ModelOptions as OllamaOptions,
    Ollama,
};

use crate::protocol::{self, Speaker, DEFAULT_INSTRUCTION};

/// Ollama client configuration
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    /// Ollama host URL
    pub host: String,

    /// Ollama port
    pub port: u16,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Model and sampling settings
    pub options: GenerationOptions,

    /// System instruction placed ahead of the tool section
    pub instruction: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost".into(),
            port: 11434,
            timeout_secs: 120,
            options: GenerationOptions::default(),
            instruction: DEFAULT_INSTRUCTION.into(),
        }
    }
}

/// Ollama-backed model client
pub struct OllamaClient {
    client: Ollama,
    config: OllamaConfig,
}

impl OllamaClient {
    /// Create a new client with custom host/port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::from_config(OllamaConfig {
            host: host.into(),
            port,
            ..Default::default()
        })
    }

    /// Create from configuration
    pub fn from_config(config: OllamaConfig) -> Self {
        Self {
            client: Ollama::new(&config.host, config.port),
            config,
        }
    }

    pub const fn config(&self) -> &OllamaConfig {
        &self.config
    }

    /// System prompt first, then the history as chat lines
    fn build_messages(&self, history: &[Turn], tools: &[ToolSpec]) -> Vec<ChatMessage> {
        let system = protocol::system_prompt(&self.config.instruction, tools);

        std::iter::once(ChatMessage::new(MessageRole::System, system))
            .chain(protocol::transcript(history).into_iter().map(|(speaker, text)| {
                let role = match speaker {
                    Speaker::User => MessageRole::User,
                    Speaker::Assistant => MessageRole::Assistant,
                };
                ChatMessage::new(role, text)
            }))
            .collect()
    }

    fn build_options(opts: &GenerationOptions) -> OllamaOptions {
        OllamaOptions::default()
            .temperature(opts.temperature)
            .top_p(opts.top_p)
            .num_predict(i32::try_from(opts.max_tokens).unwrap_or(i32::MAX))
    }
}

#[async_trait]
impl ModelClient for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn health_check(&self) -> Result<bool> {
        match self.client.list_local_models().await {
            Ok(models) => {
                let model = &self.config.options.model;
                let tagged = format!("{model}:");
                let installed = models
                    .iter()
                    .any(|m| m.name == *model || m.name.starts_with(&tagged));
                if !installed {
                    tracing::warn!(%model, "Ollama is up but the model is not pulled");
                }
                Ok(installed)
            }
            Err(e) => {
                tracing::warn!("Ollama health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn generate(&self, history: &[Turn], tools: &[ToolSpec]) -> Result<ModelResponse> {
        let options = &self.config.options;
        let messages = self.build_messages(history, tools);
        let request = ChatMessageRequest::new(options.model.clone(), messages)
            .options(Self::build_options(options));

        tracing::debug!(model = %options.model, turns = history.len(), "Sending chat request to Ollama");

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let response = tokio::time::timeout(timeout, self.client.send_chat_messages(request))
            .await
            .map_err(|_| {
                AgentError::ModelUnavailable(format!(
                    "Ollama did not answer within {}s",
                    self.config.timeout_secs
                ))
            })?
            .map_err(|e| AgentError::ModelUnavailable(e.to_string()))?;

        protocol::parse_reply(&response.message.content, tools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::tool::{Tool, ToolCall, ToolResult};
    use agent_core::CurrentTimeTool;

    #[test]
    fn test_config_defaults() {
        let config = OllamaConfig::default();
        assert_eq!(config.host, "http://localhost");
        assert_eq!(config.port, 11434);
        assert_eq!(config.instruction, DEFAULT_INSTRUCTION);
    }

    #[test]
    fn test_message_conversion() {
        let client = OllamaClient::from_config(OllamaConfig::default());
        let history = vec![
            Turn::user("Wie spät ist es?"),
            Turn::tool_call(&ToolCall::bare("get_current_time")),
            Turn::tool_result("get_current_time", ToolResult::new().with("current_time", "t")),
        ];
        let tools = vec![CurrentTimeTool::new().spec()];

        let messages = client.build_messages(&history, &tools);
        assert_eq!(messages.len(), 4);
        assert!(messages[0].content.contains("get_current_time"));
        assert_eq!(messages[1].content, "Wie spät ist es?");
        assert!(messages[2].content.starts_with("```tool"));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        // Nothing listens on port 9 (discard) in a test environment.
        let client = OllamaClient::new("http://127.0.0.1", 9);

        let err = client.generate(&[Turn::user("hi")], &[]).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(!client.health_check().await.unwrap());
    }
}
