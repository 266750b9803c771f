//! Application State

use std::sync::Arc;
use std::time::Duration;

use agent_core::{AgentLoop, SessionManager};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Live chat sessions and the agent that answers them
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    pub fn new(agent: AgentLoop, session_idle: Duration) -> Self {
        Self {
            sessions: Arc::new(SessionManager::new(Arc::new(agent)).with_idle_timeout(session_idle)),
        }
    }
}
