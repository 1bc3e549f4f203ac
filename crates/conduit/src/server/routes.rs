//! HTTP front end for the relay
//!
//! Implements:
//! - `POST /stream` - assemble the upstream payload and stream the reply
//! - `GET /health` - report whether a token can be obtained

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::State,
    http::{
        StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    response::Response,
    routing::{get, post},
};
use futures::StreamExt;
use serde_json::Value;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::error::ApiError;
use super::payload::StreamRequest;
use crate::config::{RelayConfig, ServerConfig};
use crate::error::{ConduitError, Result};
use crate::relay::{RelayFrame, StreamRelay};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Relay (and through it, the token manager)
    pub relay: Arc<StreamRelay>,
    /// Payload defaults
    pub relay_config: RelayConfig,
}

/// The relay's HTTP server
pub struct RelayServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl RelayServer {
    pub fn new(config: ServerConfig, relay: Arc<StreamRelay>, relay_config: RelayConfig) -> Self {
        Self {
            config,
            state: Arc::new(AppState {
                relay,
                relay_config,
            }),
        }
    }

    /// Bind and serve until Ctrl+C or SIGTERM
    pub async fn serve(&self) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .listen_addr
            .parse()
            .map_err(|e| ConduitError::Config(format!("Invalid listen address: {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ConduitError::Server(format!("Failed to bind to {addr}: {e}")))?;

        tracing::info!("Starting relay server on {addr}");

        axum::serve(listener, create_router(Arc::clone(&self.state)))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ConduitError::Server(format!("Server error: {e}")))?;

        tracing::info!("Relay server shut down gracefully");
        Ok(())
    }
}

/// Create the router with all routes and middleware configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/stream", post(stream_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn stream_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StreamRequest>,
) -> std::result::Result<Response, ApiError> {
    tracing::info!(
        "Received streaming request for chat: {}...",
        preview(&request.chat, 30)
    );

    let payload = request
        .into_payload(&state.relay_config.default_model)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    tracing::debug!("Prepared payload: {payload}");

    let frames = state.relay.relay(payload).await?;

    let body = Body::from_stream(frames.map(|frame| {
        if let RelayFrame::Failed(failure) = &frame {
            tracing::warn!("Relay ended with failure: {failure}");
        }
        Ok::<Bytes, Infallible>(frame.into_bytes())
    }));

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .header("x-accel-buffering", "no")
        .body(body)
        .map_err(|e| ApiError::Internal(format!("Failed to build response: {e}")))
}

/// Health check endpoint - reports whether a valid token is obtainable
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    match state.relay.tokens().get_token().await {
        Ok(token) => {
            tracing::debug!("Health check successful, token valid");
            Json(serde_json::json!({
                "status": "ok",
                "token_status": "valid",
                "expires_at": token.expires_at().to_rfc3339(),
            }))
        }
        Err(e) => {
            tracing::error!("Health check failed: {e}");
            Json(serde_json::json!({
                "status": "error",
                "error": e.to_string(),
            }))
        }
    }
}

fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
