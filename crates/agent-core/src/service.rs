//! Session Manager
//!
//! The caller-facing entry point: `send(session_id, text)`. Each session's
//! state sits behind its own async mutex, so at most one message per session
//! is in flight while different sessions run fully in parallel. The agent
//! loop and its tool registry are shared read-only by everyone.
//!
//! Sessions that see no activity for `idle_timeout` are evicted by
//! [`SessionManager::evict_idle`], which [`SessionManager::spawn_idle_sweeper`]
//! runs periodically.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;

use crate::error::{AgentError, Result};
use crate::reasoning::AgentLoop;
use crate::session::{SessionId, SessionState};
use crate::turn::Turn;

type SessionHandle = Arc<Mutex<SessionState>>;

/// In-memory sessions keyed by id; nothing survives the process
pub struct SessionManager {
    agent: Arc<AgentLoop>,
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    idle_timeout: Duration,
}

impl SessionManager {
    pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

    pub fn new(agent: Arc<AgentLoop>) -> Self {
        Self {
            agent,
            sessions: RwLock::new(HashMap::new()),
            idle_timeout: Self::DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// How long a session may sit unused before it is evicted
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub const fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn agent(&self) -> &AgentLoop {
        &self.agent
    }

    /// Start an empty session and return its id
    pub async fn create_session(&self) -> SessionId {
        let id = SessionId::new();
        self.sessions
            .write()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(SessionState::with_id(id.clone()))));
        tracing::info!(session = %id, "Session created");
        id
    }

    async fn handle(&self, id: &SessionId) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(id) {
            return Arc::clone(handle);
        }

        let mut sessions = self.sessions.write().await;
        Arc::clone(sessions.entry(id.clone()).or_insert_with(|| {
            tracing::info!(session = %id, "Session created on first message");
            Arc::new(Mutex::new(SessionState::with_id(id.clone())))
        }))
    }

    async fn is_current(&self, id: &SessionId, handle: &SessionHandle) -> bool {
        self.sessions
            .read()
            .await
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(current, handle))
    }

    /// Lock the live session for `id`, creating it if needed.
    ///
    /// A session reset or evicted while we waited for its lock is stale;
    /// start over on whatever the map holds now.
    async fn acquire(&self, id: &SessionId) -> OwnedMutexGuard<SessionState> {
        loop {
            let handle = self.handle(id).await;
            let session = Arc::clone(&handle).lock_owned().await;
            if self.is_current(id, &handle).await {
                return session;
            }
            tracing::debug!(session = %id, "Session removed while waiting, retrying");
        }
    }

    /// Send a user message and wait for the final answer.
    ///
    /// Calls for the same session queue up behind each other; an unknown id
    /// starts a new session. Failures are always one of `ModelUnavailable`,
    /// `ModelProtocol` or `MaxIterations`.
    pub async fn send(&self, id: &SessionId, text: &str) -> Result<String> {
        let mut session = self.acquire(id).await;

        tracing::info!(session = %id, turns = session.len(), "Handling message");
        let outcome = self
            .agent
            .handle_message(&mut session, text)
            .await
            .map_err(AgentError::into_caller_error);
        match &outcome {
            Ok(_) => tracing::info!(session = %id, turns = session.len(), "Message answered"),
            Err(e) => tracing::warn!(session = %id, code = e.code(), error = %e, "Message failed"),
        }
        outcome
    }

    /// Forget a session. Returns whether it existed.
    ///
    /// Waits for an in-flight message on the session to finish first; calls
    /// queued behind it then land on a fresh session.
    pub async fn reset(&self, id: &SessionId) -> bool {
        let Some(handle) = self.sessions.read().await.get(id).cloned() else {
            return false;
        };
        let _session = handle.lock().await;

        let mut sessions = self.sessions.write().await;
        let removed = sessions
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(current, &handle));
        if removed {
            sessions.remove(id);
            tracing::info!(session = %id, "Session reset");
        }
        removed
    }

    /// Drop every session idle for longer than `idle_timeout`. Sessions with
    /// a message in flight are kept. Returns how many were dropped.
    pub async fn evict_idle(&self) -> usize {
        let now = Utc::now();
        let idle_timeout = self.idle_timeout;

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, handle| {
            let Ok(session) = handle.try_lock() else {
                return true;
            };
            let idle = (now - session.updated_at()).to_std().unwrap_or_default();
            idle < idle_timeout
        });

        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, remaining = sessions.len(), "Evicted idle sessions");
        }
        evicted
    }

    /// Run [`evict_idle`](Self::evict_idle) every `every` until the manager
    /// is dropped
    pub fn spawn_idle_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let manager: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.evict_idle().await;
            }
        })
    }

    /// Snapshot of a session's history, waiting for any in-flight message
    pub async fn history(&self, id: &SessionId) -> Option<Vec<Turn>> {
        let handle = self.sessions.read().await.get(id).cloned()?;
        let session = handle.lock().await;
        Some(session.history().to_vec())
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
