//! Mock Model Clients
//!
//! For testing and demo purposes. [`ScriptedModelClient`] replays a fixed
//! sequence of responses and records what it was asked;
//! [`OfflineModelClient`] is a tiny rule-based stand-in that knows how to use
//! `get_current_time`, so the runtime can be exercised without a model
//! server.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::builtin::CurrentTimeTool;
use crate::error::{AgentError, Result};
use crate::provider::{ModelClient, ModelResponse};
use crate::tool::{ToolCall, ToolSpec};
use crate::turn::{Turn, TurnContent};

/// One scripted reply
#[derive(Clone, Debug)]
pub enum ScriptStep {
    Respond(ModelResponse),
    Unavailable(String),
    Protocol(String),
}

/// A request the client received
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub history: Vec<Turn>,
    pub tools: Vec<String>,
}

/// Replays queued responses in order
#[derive(Default)]
pub struct ScriptedModelClient {
    script: Mutex<VecDeque<ScriptStep>>,
    fallback: Option<ModelResponse>,
    delay: Option<Duration>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response
    pub fn then(self, response: ModelResponse) -> Self {
        self.push(ScriptStep::Respond(response))
    }

    /// Queue a transient failure
    pub fn then_unavailable(self, message: impl Into<String>) -> Self {
        self.push(ScriptStep::Unavailable(message.into()))
    }

    /// Queue a malformed-response failure
    pub fn then_protocol_error(self, message: impl Into<String>) -> Self {
        self.push(ScriptStep::Protocol(message.into()))
    }

    /// Response to repeat once the script runs out
    pub fn always(mut self, response: ModelResponse) -> Self {
        self.fallback = Some(response);
        self
    }

    /// Sleep before every reply
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn push(self, step: ScriptStep) -> Self {
        lock(&self.script).push_back(step);
        self
    }

    /// Every request received so far, oldest first
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl ModelClient for ScriptedModelClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, history: &[Turn], tools: &[ToolSpec]) -> Result<ModelResponse> {
        lock(&self.requests).push(RecordedRequest {
            history: history.to_vec(),
            tools: tools.iter().map(|t| t.name.clone()).collect(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let step = lock(&self.script).pop_front();
        match step {
            Some(ScriptStep::Respond(response)) => Ok(response),
            Some(ScriptStep::Unavailable(msg)) => Err(AgentError::ModelUnavailable(msg)),
            Some(ScriptStep::Protocol(msg)) => Err(AgentError::ModelProtocol(msg)),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| AgentError::ModelUnavailable("script exhausted".into())),
        }
    }
}

/// Rule-based client that answers time questions via `get_current_time`
#[derive(Clone, Copy, Debug, Default)]
pub struct OfflineModelClient;

const TIME_KEYWORDS: &[&str] = &["time", "clock", "late", "uhr", "spät", "heure"];

impl OfflineModelClient {
    fn asks_for_time(text: &str) -> bool {
        let text = text.to_lowercase();
        TIME_KEYWORDS.iter().any(|k| text.contains(k))
    }
}

#[async_trait]
impl ModelClient for OfflineModelClient {
    fn name(&self) -> &str {
        "offline"
    }

    async fn generate(&self, history: &[Turn], tools: &[ToolSpec]) -> Result<ModelResponse> {
        let last = history
            .last()
            .ok_or_else(|| AgentError::ModelProtocol("empty history".into()))?;

        match &last.content {
            TurnContent::User { text } => {
                let has_clock = tools.iter().any(|t| t.name == CurrentTimeTool::NAME);
                if has_clock && Self::asks_for_time(text) {
                    Ok(ModelResponse::tool(ToolCall::bare(CurrentTimeTool::NAME)))
                } else {
                    Ok(ModelResponse::text(
                        "I can only tell you the time. Ask me what time it is!",
                    ))
                }
            }
            TurnContent::ToolResult { name, result } => {
                if let Some(error) = result.error_message() {
                    return Ok(ModelResponse::text(format!(
                        "Sorry, the {name} tool failed: {error}"
                    )));
                }
                match result.get("current_time").and_then(|v| v.as_str()) {
                    Some(now) => Ok(ModelResponse::text(format!("The current time is {now}."))),
                    None => Ok(ModelResponse::text(format!(
                        "The {name} tool returned {}.",
                        serde_json::to_string(result)?
                    ))),
                }
            }
            TurnContent::Model { .. } | TurnContent::ToolCall { .. } => Err(
                AgentError::ModelProtocol(format!("cannot respond after a {} turn", last.role())),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{Tool, ToolResult};

    #[tokio::test]
    async fn test_scripted_replays_in_order() {
        let client = ScriptedModelClient::new()
            .then(ModelResponse::text("one"))
            .then_unavailable("down");

        let history = vec![Turn::user("hi")];
        assert_eq!(client.generate(&history, &[]).await.unwrap(), ModelResponse::text("one"));
        assert!(matches!(
            client.generate(&history, &[]).await,
            Err(AgentError::ModelUnavailable(msg)) if msg == "down"
        ));
        assert!(client.generate(&history, &[]).await.is_err());
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_scripted_fallback_repeats() {
        let client = ScriptedModelClient::new().always(ModelResponse::text("again"));
        let history = vec![Turn::user("hi")];
        for _ in 0..3 {
            assert_eq!(client.generate(&history, &[]).await.unwrap(), ModelResponse::text("again"));
        }
    }

    #[tokio::test]
    async fn test_offline_client_uses_clock() {
        let client = OfflineModelClient;
        let tools = vec![CurrentTimeTool::new().spec()];

        let response = client.generate(&[Turn::user("What time is it?")], &tools).await.unwrap();
        assert_eq!(response, ModelResponse::tool(ToolCall::bare("get_current_time")));

        let history = vec![
            Turn::user("What time is it?"),
            Turn::tool_call(&ToolCall::bare("get_current_time")),
            Turn::tool_result(
                "get_current_time",
                ToolResult::new().with("current_time", "2026-10-16T12:00:00Z"),
            ),
        ];
        let response = client.generate(&history, &tools).await.unwrap();
        assert_eq!(
            response,
            ModelResponse::text("The current time is 2026-10-16T12:00:00Z.")
        );

        let response = client.generate(&[Turn::user("Tell me a joke")], &tools).await.unwrap();
        assert!(matches!(response, ModelResponse::FinalText(_)));
    }
}
