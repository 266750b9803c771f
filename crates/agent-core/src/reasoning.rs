//! Agent Loop
//!
//! Drives one user message through the model/tool cycle:
//!
//! ```text
//! AwaitingUserInput ─▶ RequestingModel ─▶ Done
//!                          │     ▲
//!                          ▼     │
//!                      ExecutingTool
//! ```
//!
//! The model either answers (final text, the exchange ends) or names a tool.
//! The tool runs, its result is appended to the history and the model is
//! asked again, up to `max_tool_rounds` times.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{AgentError, Result};
use crate::invoker::ToolInvoker;
use crate::provider::{ModelClient, ModelResponse};
use crate::session::{ExchangeGuard, SessionId, SessionState};
use crate::tool::{Tool, ToolCall, ToolRegistry, ToolResult};
use crate::turn::Turn;

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Tool rounds allowed per user message before giving up
    pub max_tool_rounds: usize,

    /// Bound on a single model request
    pub model_timeout: Duration,

    /// Bound on a single tool execution
    pub tool_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: 10,
            model_timeout: Duration::from_secs(120),
            tool_timeout: ToolInvoker::DEFAULT_TIMEOUT,
        }
    }
}

/// Where an exchange currently is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    AwaitingUserInput,
    RequestingModel,
    ExecutingTool,
    Done,
}

/// The orchestrator; shared by all sessions
pub struct AgentLoop {
    model: Arc<dyn ModelClient>,
    invoker: ToolInvoker,
    config: AgentConfig,
}

impl AgentLoop {
    pub fn new(model: Arc<dyn ModelClient>, tools: Arc<ToolRegistry>, config: AgentConfig) -> Self {
        let invoker = ToolInvoker::new(tools).with_timeout(config.tool_timeout);
        Self {
            model,
            invoker,
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults(model: Arc<dyn ModelClient>, tools: Arc<ToolRegistry>) -> Self {
        Self::new(model, tools, AgentConfig::default())
    }

    /// Handle one user message to completion.
    ///
    /// On return (success or error) every appended turn stays in the
    /// session. If the returned future is dropped before it finishes, the
    /// session is rolled back to how it was before the call.
    pub async fn handle_message(&self, session: &mut SessionState, text: &str) -> Result<String> {
        let mut exchange = ExchangeGuard::begin(session);
        let outcome = self.run_exchange(&mut exchange, text).await;
        exchange.commit();
        outcome
    }

    /// Run with a simple string input (creates a throwaway session)
    pub async fn ask(&self, question: &str) -> Result<String> {
        let mut session = SessionState::new();
        self.handle_message(&mut session, question).await
    }

    async fn run_exchange(&self, exchange: &mut ExchangeGuard<'_>, text: &str) -> Result<String> {
        let session_id = exchange.session().id().clone();
        let mut state = LoopState::AwaitingUserInput;

        exchange.append(Turn::user(text))?;
        transition(&session_id, &mut state, LoopState::RequestingModel);

        let mut rounds = 0;
        loop {
            let response = self.request_model(exchange.session()).await.inspect_err(|e| {
                tracing::warn!(session = %session_id, error = %e, "Model request failed");
            })?;

            let call = match response {
                ModelResponse::FinalText(answer) => {
                    exchange.append(Turn::model(answer.as_str()))?;
                    transition(&session_id, &mut state, LoopState::Done);
                    return Ok(answer);
                }
                ModelResponse::ToolCall(call) => call,
            };

            if rounds >= self.config.max_tool_rounds {
                tracing::warn!(
                    session = %session_id,
                    tool = %call.name,
                    rounds,
                    "Tool round limit reached"
                );
                return Err(AgentError::MaxIterations(self.config.max_tool_rounds));
            }
            rounds += 1;

            exchange.append(Turn::tool_call(&call))?;
            transition(&session_id, &mut state, LoopState::ExecutingTool);
            tracing::debug!(session = %session_id, tool = %call.name, round = rounds, "Executing tool");

            let result = self.execute_tool(&call).await;
            match result {
                Ok(result) => exchange.append(Turn::tool_result(call.name.as_str(), result))?,
                Err(e) => {
                    exchange.append(Turn::tool_result(
                        call.name.as_str(),
                        ToolResult::error(e.to_string()),
                    ))?;
                    return Err(match e {
                        AgentError::UnknownTool(name) => AgentError::ModelProtocol(format!(
                            "model called unregistered tool '{name}'"
                        )),
                        other => other,
                    });
                }
            }
            transition(&session_id, &mut state, LoopState::RequestingModel);
        }
    }

    async fn request_model(&self, session: &SessionState) -> Result<ModelResponse> {
        let specs = self.invoker.registry().list_specs();
        let request = self.model.generate(session.history(), specs);

        tokio::time::timeout(self.config.model_timeout, request)
            .await
            .unwrap_or_else(|_| {
                Err(AgentError::ModelUnavailable(format!(
                    "{} did not respond within {}ms",
                    self.model.name(),
                    self.config.model_timeout.as_millis()
                )))
            })
    }

    async fn execute_tool(&self, call: &ToolCall) -> Result<ToolResult> {
        self.invoker.invoke(&call.name, &call.arguments).await
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        self.invoker.registry()
    }

    pub fn model(&self) -> &dyn ModelClient {
        self.model.as_ref()
    }

    /// Get configuration
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }
}

fn transition(session: &SessionId, state: &mut LoopState, next: LoopState) {
    let from = *state;
    tracing::debug!(session = %session, from = ?from, to = ?next, "Agent loop transition");
    *state = next;
}

/// Builder for [`AgentLoop`]
pub struct AgentBuilder {
    model: Option<Arc<dyn ModelClient>>,
    tools: ToolRegistry,
    config: AgentConfig,
    error: Option<AgentError>,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            model: None,
            tools: ToolRegistry::new(),
            config: AgentConfig::default(),
            error: None,
        }
    }

    pub fn model(mut self, model: Arc<dyn ModelClient>) -> Self {
        self.model = Some(model);
        self
    }

    /// Register a tool; a duplicate name surfaces from [`build`](Self::build)
    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        if let Err(e) = self.tools.register(tool) {
            self.error.get_or_insert(e);
        }
        self
    }

    /// Add every tool of `tools` to those registered so far; a duplicate
    /// name surfaces from [`build`](Self::build)
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        if let Err(e) = self.tools.merge(tools) {
            self.error.get_or_insert(e);
        }
        self
    }

    pub fn max_tool_rounds(mut self, max: usize) -> Self {
        self.config.max_tool_rounds = max;
        self
    }

    pub fn model_timeout(mut self, timeout: Duration) -> Self {
        self.config.model_timeout = timeout;
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.config.tool_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<AgentLoop> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let model = self
            .model
            .ok_or_else(|| AgentError::Config("Model client is required".into()))?;
        if self.config.max_tool_rounds == 0 {
            return Err(AgentError::Config("max_tool_rounds must be at least 1".into()));
        }

        Ok(AgentLoop::new(model, Arc::new(self.tools), self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedModelClient;
    use crate::tool::{ParamType, ParameterSchema, ToolSpec};
    use crate::turn::{Role, TurnContent};
    use serde_json::json;

    fn time_call() -> ModelResponse {
        ModelResponse::tool(ToolCall::bare("get_current_time"))
    }

    fn agent(model: ScriptedModelClient, max_tool_rounds: usize) -> (AgentLoop, Arc<ScriptedModelClient>) {
        let model = Arc::new(model);
        let agent = AgentBuilder::new()
            .model(model.clone())
            .tools(ToolRegistry::with_builtin_tools())
            .max_tool_rounds(max_tool_rounds)
            .model_timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        (agent, model)
    }

    fn roles(session: &SessionState) -> Vec<Role> {
        session.history().iter().map(Turn::role).collect()
    }

    fn assert_tool_turns_paired(session: &SessionState) {
        let history = session.history();
        for (i, turn) in history.iter().enumerate() {
            if turn.role() == Role::ToolCall {
                let next = &history[i + 1];
                assert_eq!(next.role(), Role::ToolResult);
                assert_eq!(next.tool_name(), turn.tool_name());
            }
        }
    }

    #[tokio::test]
    async fn test_tool_round_then_final_text() {
        let (agent, model) = agent(
            ScriptedModelClient::new()
                .then(time_call())
                .then(ModelResponse::text("It is noon.")),
            10,
        );
        let mut session = SessionState::new();

        let answer = agent.handle_message(&mut session, "What time is it?").await.unwrap();

        assert_eq!(answer, "It is noon.");
        assert_eq!(
            roles(&session),
            vec![Role::User, Role::ToolCall, Role::ToolResult, Role::Model]
        );
        match &session.history()[2].content {
            TurnContent::ToolResult { name, result } => {
                assert_eq!(name, "get_current_time");
                assert!(result.get("current_time").is_some());
            }
            other => panic!("unexpected turn {other:?}"),
        }

        let requests = model.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].history.len(), 1);
        assert_eq!(requests[0].tools, vec!["get_current_time"]);
        assert_eq!(requests[1].history.len(), 3);
    }

    #[tokio::test]
    async fn test_runaway_tool_calls_stop_at_cap() {
        let (agent, model) = agent(ScriptedModelClient::new().always(time_call()), 3);
        let mut session = SessionState::new();

        let err = agent.handle_message(&mut session, "loop forever").await.unwrap_err();

        assert!(matches!(err, AgentError::MaxIterations(3)));
        assert_eq!(model.call_count(), 4);
        assert_eq!(session.len(), 1 + 2 * 3);
        assert_tool_turns_paired(&session);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_terminal_but_paired() {
        let (agent, model) = agent(
            ScriptedModelClient::new()
                .then(ModelResponse::tool(ToolCall::bare("launch_rockets")))
                .always(ModelResponse::text("unreachable")),
            10,
        );
        let mut session = SessionState::new();

        let err = agent.handle_message(&mut session, "go").await.unwrap_err();

        assert!(matches!(err, AgentError::ModelProtocol(msg) if msg.contains("launch_rockets")));
        assert_eq!(roles(&session), vec![Role::User, Role::ToolCall, Role::ToolResult]);
        assert_tool_turns_paired(&session);
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_arguments_count_toward_cap() {
        let bad_call = ModelResponse::tool(ToolCall::new(
            "get_current_time",
            json!({"timezone": "CET"}).as_object().cloned().unwrap(),
        ));
        let (agent, _) = agent(
            ScriptedModelClient::new()
                .then(bad_call.clone())
                .then(bad_call.clone())
                .then(bad_call),
            2,
        );
        let mut session = SessionState::new();

        let err = agent.handle_message(&mut session, "time in CET?").await.unwrap_err();

        assert!(matches!(err, AgentError::MaxIterations(2)));
        for turn in session.history() {
            if let TurnContent::ToolResult { result, .. } = &turn.content {
                assert!(result.error_message().unwrap().contains("unexpected parameter"));
            }
        }
    }

    #[tokio::test]
    async fn test_tool_failure_reaches_model_as_data() {
        let mut tools = ToolRegistry::new();
        tools
            .register_fn(
                ToolSpec::new("lookup", "Look something up")
                    .with_parameter(ParameterSchema::required("key", ParamType::String, "key")),
                |_| async { Err(AgentError::ToolExecution("backend offline".into())) },
            )
            .unwrap();
        let model = Arc::new(
            ScriptedModelClient::new()
                .then(ModelResponse::tool(ToolCall::new(
                    "lookup",
                    json!({"key": "a"}).as_object().cloned().unwrap(),
                )))
                .then(ModelResponse::text("Sorry, lookup is offline.")),
        );
        let agent = AgentLoop::with_defaults(model.clone(), Arc::new(tools));
        let mut session = SessionState::new();

        let answer = agent.handle_message(&mut session, "look up a").await.unwrap();

        assert_eq!(answer, "Sorry, lookup is offline.");
        let seen = &model.requests()[1].history[2];
        match &seen.content {
            TurnContent::ToolResult { result, .. } => {
                assert!(result.error_message().unwrap().contains("backend offline"));
            }
            other => panic!("unexpected turn {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_model_unavailable_is_terminal() {
        let (agent, model) = agent(
            ScriptedModelClient::new()
                .then_unavailable("connection refused")
                .always(ModelResponse::text("too late")),
            10,
        );
        let mut session = SessionState::new();

        let err = agent.handle_message(&mut session, "hi").await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(model.call_count(), 1);
        assert_eq!(roles(&session), vec![Role::User]);
    }

    #[tokio::test]
    async fn test_model_timeout_maps_to_unavailable() {
        let (agent, _) = agent(
            ScriptedModelClient::new()
                .always(ModelResponse::text("slow"))
                .with_delay(Duration::from_secs(5)),
            10,
        );
        let mut session = SessionState::new();

        let err = agent.handle_message(&mut session, "hi").await.unwrap_err();

        assert!(matches!(err, AgentError::ModelUnavailable(msg) if msg.contains("200ms")));
    }

    #[tokio::test]
    async fn test_cancellation_rolls_back_exchange() {
        let (agent, _) = agent(
            ScriptedModelClient::new()
                .then(ModelResponse::text("first answer"))
                .then(time_call())
                .always(ModelResponse::text("slow"))
                .with_delay(Duration::from_millis(30)),
            10,
        );
        let mut session = SessionState::new();
        agent.handle_message(&mut session, "first").await.unwrap();
        assert_eq!(session.len(), 2);

        // Cancel while the model is deciding after the tool round.
        let cancelled = tokio::time::timeout(
            Duration::from_millis(45),
            agent.handle_message(&mut session, "second"),
        )
        .await;

        assert!(cancelled.is_err());
        assert_eq!(session.len(), 2);
        assert_eq!(session.last().and_then(Turn::text), Some("first answer"));
    }

    #[tokio::test]
    async fn test_history_only_grows() {
        let (agent, _) = agent(
            ScriptedModelClient::new()
                .then(ModelResponse::text("a"))
                .then(time_call())
                .then(ModelResponse::text("b"))
                .then(ModelResponse::text("c")),
            10,
        );
        let mut session = SessionState::new();
        let mut previous: Vec<Turn> = Vec::new();

        for text in ["one", "two", "three"] {
            agent.handle_message(&mut session, text).await.unwrap();
            assert!(session.len() > previous.len());
            assert_eq!(&session.history()[..previous.len()], previous.as_slice());
            previous = session.history().to_vec();
        }
        assert_eq!(session.len(), 8);
        assert_tool_turns_paired(&session);
    }

    #[tokio::test]
    async fn test_ask_uses_fresh_session() {
        let (agent, model) = agent(ScriptedModelClient::new().always(ModelResponse::text("hello")), 10);
        assert_eq!(agent.ask("hi").await.unwrap(), "hello");
        assert_eq!(agent.ask("hi again").await.unwrap(), "hello");
        assert!(model.requests().iter().all(|r| r.history.len() == 1));
    }

    #[test]
    fn test_builder_requires_model() {
        let err = AgentBuilder::new().build().err().unwrap();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn test_builder_surfaces_duplicate_tools() {
        let err = AgentBuilder::new()
            .model(Arc::new(ScriptedModelClient::new()))
            .tool(crate::builtin::CurrentTimeTool::new())
            .tool(crate::builtin::CurrentTimeTool::new())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, AgentError::DuplicateTool(name) if name == "get_current_time"));
    }

    #[test]
    fn test_builder_keeps_tools_added_before_registry() {
        let echo = crate::tool::FnTool::new(ToolSpec::new("echo", "Echo"), |_| async {
            Ok(ToolResult::new())
        });
        let agent = AgentBuilder::new()
            .model(Arc::new(ScriptedModelClient::new()))
            .tool(echo)
            .tools(ToolRegistry::with_builtin_tools())
            .build()
            .unwrap();

        assert_eq!(agent.tools().names(), vec!["echo", "get_current_time"]);
    }

    #[test]
    fn test_builder_rejects_registry_overlapping_earlier_tool() {
        let err = AgentBuilder::new()
            .model(Arc::new(ScriptedModelClient::new()))
            .tool(crate::builtin::CurrentTimeTool::new())
            .tools(ToolRegistry::with_builtin_tools())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, AgentError::DuplicateTool(_)));
    }
}
