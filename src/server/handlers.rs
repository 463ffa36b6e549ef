//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Json, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use super::socket::agent_socket;
use super::state::AppState;
use crate::error::SignalError;
use crate::relay::SessionListing;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        // Health and status
        .route("/health", get(health_check))
        .route("/status", get(status))
        // Agent side
        .route("/server/session", get(agent_socket))
        // Client side
        .route("/client/signal", post(client_signal))
        .route("/client/agents", get(list_agents))
        .layer(DefaultBodyLimit::max(state.config.max_body_size));

    if let Some(cors) = cors_layer(&state.config.cors_origins) {
        router = router.layer(cors);
    }
    if state.config.logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    router.with_state(state)
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return Some(layer.allow_origin(Any));
    }

    let headers: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            },
        })
        .collect();

    Some(layer.allow_origin(AllowOrigin::list(headers)))
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: crate::VERSION,
    })
}

/// Status response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub active_sessions: usize,
    pub protocol: String,
}

/// Status endpoint
async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let description = &state.config.description;

    Json(StatusResponse {
        status: "ok",
        version: crate::VERSION,
        uptime_secs: state.uptime().as_secs(),
        active_sessions: state.registry.len(),
        protocol: format!(
            "{}.{}",
            description.protocol_major_version, description.protocol_minor_version
        ),
    })
}

/// Client signal request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSignalRequest {
    pub agent_session_id: String,
    pub client_sdp: String,
}

/// Client signal response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSignalResponse {
    pub server_sdp: String,
}

/// Relay a client offer to an agent and return its answer
async fn client_signal(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ClientSignalRequest>,
) -> Response {
    debug!(session_id = %req.agent_session_id, "client signal");

    match state
        .relay
        .relay_signal(&req.agent_session_id, req.client_sdp)
        .await
    {
        Ok(server_sdp) => (StatusCode::OK, Json(ClientSignalResponse { server_sdp })).into_response(),
        Err(e) => error_response(&e),
    }
}

/// List handshaken agents
async fn list_agents(State(state): State<Arc<AppState>>) -> Json<Vec<SessionListing>> {
    Json(state.registry.list_all())
}

/// Map a relay error to status and error code
fn error_status(err: &SignalError) -> (StatusCode, &'static str) {
    match err {
        SignalError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "session_not_found"),
        SignalError::HandshakeNotEstablished => (StatusCode::CONFLICT, "handshake_not_established"),
        SignalError::AgentDisconnected => (StatusCode::INTERNAL_SERVER_ERROR, "agent_disconnected"),
        SignalError::ExchangeTimeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "exchange_timeout"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    }
}

fn error_response(err: &SignalError) -> Response {
    let (status, code) = error_status(err);
    if status.is_server_error() {
        warn!(code, error = %err, "client signal failed");
    }

    (
        status,
        Json(serde_json::json!({
            "error": err.to_string(),
            "code": code,
        })),
    )
        .into_response()
}
