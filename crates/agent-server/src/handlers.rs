//! HTTP Handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use agent_core::{AgentError, SessionId};

use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub model_backend: String,
    pub backend_healthy: bool,
    pub sessions: usize,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Omit to start a new session
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn agent_error(err: &AgentError) -> ApiError {
    let status = match err {
        AgentError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AgentError::ModelProtocol(_) => StatusCode::BAD_GATEWAY,
        AgentError::MaxIterations(_) => StatusCode::LOOP_DETECTED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.user_message(),
            code: err.code().into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let model = state.sessions.agent().model();
    let backend_healthy = model.health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: if backend_healthy { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        model_backend: model.name().to_string(),
        backend_healthy,
        sessions: state.sessions.len().await,
    })
}

/// Start an empty session
pub async fn create_session(State(state): State<AppState>) -> Json<SessionResponse> {
    let id = state.sessions.create_session().await;
    Json(SessionResponse {
        session_id: id.to_string(),
    })
}

/// Send one message and wait for the final answer
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if payload.message.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Message must not be empty".into(),
                code: "EMPTY_MESSAGE".into(),
            }),
        ));
    }

    let session_id = payload
        .session_id
        .filter(|id| !id.trim().is_empty())
        .map_or_else(SessionId::new, SessionId::from_string);

    let message = state
        .sessions
        .send(&session_id, &payload.message)
        .await
        .map_err(|e| {
            tracing::error!(session = %session_id, "Agent error: {}", e);
            agent_error(&e)
        })?;

    Ok(Json(ChatResponse {
        message,
        session_id: session_id.to_string(),
    }))
}

/// Drop a session's history ("clear chat")
pub async fn reset_session(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    if !state.sessions.reset(&SessionId::from_string(id)).await {
        tracing::debug!("Reset of unknown session ignored");
    }
    StatusCode::NO_CONTENT
}
