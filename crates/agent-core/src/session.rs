//! Session State
//!
//! The ordered, append-only turn history of one conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::turn::{Role, Turn, TurnContent};

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

/// Conversation history for one session.
///
/// Invariants, checked on every [`append`](Self::append):
/// - the first turn is a user turn;
/// - a tool-call turn is followed by exactly one tool-result turn for the
///   same tool, and nothing else may be appended until it arrives;
/// - a tool-result turn only ever follows its tool-call turn.
#[derive(Clone, Debug, Serialize)]
pub struct SessionState {
    id: SessionId,
    turns: Vec<Turn>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::with_id(SessionId::new())
    }

    pub fn with_id(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    /// Full ordered history
    pub fn history(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Tool name of a tool-call turn still waiting for its result
    pub fn pending_tool_call(&self) -> Option<&str> {
        match self.turns.last().map(|t| &t.content) {
            Some(TurnContent::ToolCall { name, .. }) => Some(name),
            _ => None,
        }
    }

    /// Append a turn, rejecting anything that would break the ordering
    /// invariants.
    pub fn append(&mut self, turn: Turn) -> Result<()> {
        if self.turns.is_empty() && turn.role() != Role::User {
            return Err(AgentError::Session(format!(
                "history must start with a user turn, got {}",
                turn.role()
            )));
        }

        match (self.pending_tool_call(), &turn.content) {
            (Some(pending), TurnContent::ToolResult { name, .. }) if pending != name.as_str() => {
                return Err(AgentError::Session(format!(
                    "tool result for '{name}' does not match pending call to '{pending}'"
                )));
            }
            (Some(pending), content) if !matches!(content, TurnContent::ToolResult { .. }) => {
                return Err(AgentError::Session(format!(
                    "tool call to '{pending}' must be followed by its result, got {}",
                    turn.role()
                )));
            }
            (None, TurnContent::ToolResult { name, .. }) => {
                return Err(AgentError::Session(format!(
                    "tool result for '{name}' without a preceding tool call"
                )));
            }
            _ => {}
        }

        self.turns.push(turn);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Drop every turn after `len`. Only used to undo an unfinished exchange.
    pub(crate) fn truncate(&mut self, len: usize) {
        if len < self.turns.len() {
            self.turns.truncate(len);
            self.updated_at = Utc::now();
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Rolls a session back to where it was when the guard was taken, unless
/// [`commit`](Self::commit) is called first.
///
/// Dropping an in-flight `handle_message` future drops this guard, which
/// removes the partial exchange.
pub(crate) struct ExchangeGuard<'a> {
    session: &'a mut SessionState,
    mark: usize,
    committed: bool,
}

impl<'a> ExchangeGuard<'a> {
    pub(crate) fn begin(session: &'a mut SessionState) -> Self {
        let mark = session.len();
        Self {
            session,
            mark,
            committed: false,
        }
    }

    pub(crate) fn session(&self) -> &SessionState {
        &*self.session
    }

    pub(crate) fn append(&mut self, turn: Turn) -> Result<()> {
        self.session.append(turn)
    }

    pub(crate) fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for ExchangeGuard<'_> {
    fn drop(&mut self) {
        if !self.committed && self.session.len() > self.mark {
            tracing::debug!(
                session = %self.session.id(),
                discarded = self.session.len() - self.mark,
                "Rolling back unfinished exchange"
            );
            self.session.truncate(self.mark);
        }
    }
}
