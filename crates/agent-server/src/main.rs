//! Math Problem Solver HTTP Server
//!
//! Axum-based server providing REST API and WebSocket endpoints in front of
//! the math-solver agent.

mod config;
mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_runtime::{ProviderSettings, ProviderSource};
use math_solver::{KnowledgeSource, SolverTool, WikipediaClient};

use crate::config::ServerConfig;
use crate::handlers::{
    chat_handler, chat_stream_handler, delete_session, get_session, health_check,
};
use crate::state::{AppState, SessionRegistry};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/stream", get(chat_stream_handler))
        .route("/api/sessions/{id}", get(get_session).delete(delete_session))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let providers = ProviderSettings::from_env()?;
    match providers.provider(None) {
        Ok(provider) => match provider.validate_credentials() {
            Ok(()) => {
                if provider.health_check().await.unwrap_or(false) {
                    tracing::info!("✓ Connected to {}", provider.name());
                } else {
                    tracing::warn!("⚠ {} not reachable - requests will fail until it is", provider.name());
                }
            }
            Err(_) => {
                tracing::warn!("⚠ No server-side API key - clients must send their own");
                tracing::warn!("  Set GROQ_API_KEY in .env or pass api_key / Authorization: Bearer");
            }
        },
        Err(e) => tracing::warn!("⚠ Provider unavailable: {}", e),
    }

    let knowledge: Arc<dyn KnowledgeSource> = Arc::new(WikipediaClient::from_env()?);
    let config = ServerConfig::from_env(providers.default_model());

    tracing::info!("Registered {} tools:", SolverTool::ALL.len());
    for tool in SolverTool::ALL {
        tracing::info!("  • {}", tool.name());
    }
    tracing::info!(
        model = %config.agent.generation.model,
        max_iterations = config.agent.max_iterations,
        max_execution_time = ?config.agent.max_execution_time,
        max_sessions = config.max_sessions,
        "Agent defaults"
    );

    let state = AppState {
        providers: Arc::new(providers),
        knowledge,
        agent_config: config.agent.clone(),
        sessions: SessionRegistry::with_capacity(config.max_sessions),
    };

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 math solver running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET    /health              - Health check");
    tracing::info!("  POST   /api/chat            - Ask a question");
    tracing::info!("  GET    /api/chat/stream     - WebSocket with progress events");
    tracing::info!("  GET    /api/sessions/{{id}}   - Session transcript");
    tracing::info!("  DELETE /api/sessions/{{id}}   - Cancel and drop a session");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
