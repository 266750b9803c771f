//! time-agent HTTP Server
//!
//! Axum-based server exposing the agent's `send(session_id, text)` over a
//! small JSON API.

mod config;
mod handlers;
mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::{mock::OfflineModelClient, AgentBuilder, ModelClient, ToolRegistry};
use agent_runtime::OllamaClient;

use crate::config::{Backend, ServerConfig};
use crate::handlers::{chat_handler, create_session, health_check, reset_session};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;

    // Initialize model client
    let model = build_model(&config);
    match model.health_check().await {
        Ok(true) => tracing::info!("✓ Model backend '{}' ready", model.name()),
        Ok(false) | Err(_) => {
            tracing::warn!("⚠ Model backend '{}' not available - chats will fail", model.name());
            if config.backend == Backend::Ollama {
                tracing::warn!(
                    "  Make sure Ollama is running and the model is pulled: ollama pull {}",
                    config.ollama.options.model
                );
            }
        }
    }

    // Initialize tools
    let tools = ToolRegistry::with_builtin_tools();
    tracing::info!("Registered {} tools:", tools.len());
    for name in tools.names() {
        tracing::info!("  • {}", name);
    }

    let agent = AgentBuilder::new()
        .model(model)
        .tools(tools)
        .max_tool_rounds(config.agent.max_tool_rounds)
        .model_timeout(config.agent.model_timeout)
        .tool_timeout(config.agent.tool_timeout)
        .build()?;

    let state = AppState::new(agent, config.session_idle);
    let _sweeper = state
        .sessions
        .spawn_idle_sweeper(config.session_idle.min(Duration::from_secs(60)));
    tracing::info!("Idle sessions expire after {}s", config.session_idle.as_secs());

    let app = app(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 time-agent server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Endpoints:");
    tracing::info!("  GET    /health            - Health check");
    tracing::info!("  POST   /api/session       - Start a session");
    tracing::info!("  POST   /api/chat          - Send message");
    tracing::info!("  DELETE /api/session/{{id}}  - Clear a session");

    axum::serve(listener, app).await?;

    Ok(())
}

fn build_model(config: &ServerConfig) -> Arc<dyn ModelClient> {
    match config.backend {
        Backend::Ollama => Arc::new(OllamaClient::from_config(config.ollama.clone())),
        Backend::Offline => Arc::new(OfflineModelClient),
    }
}

/// Routes plus CORS and request tracing
pub(crate) fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/session", post(create_session))
        .route("/api/session/{id}", delete(reset_session))
        .route("/api/chat", post(chat_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
