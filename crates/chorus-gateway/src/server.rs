//! Gateway HTTP server: Axum-based JSON API

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Json;
use chorus_core::{BroadcastReply, ChatReply, ConnectorKind, Orchestrator};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{debug, info, warn};

use crate::protocol::{
    ApiError, ChatRequest, ModelInfo, MultiChatRequest, SessionHistory,
};

/// Shared state for all requests
#[derive(Clone)]
pub struct GatewayState {
    pub orchestrator: Arc<Orchestrator>,
    pub start_time: Instant,
}

/// The gateway server
pub struct GatewayServer {
    state: GatewayState,
    bind: SocketAddr,
    cors_origins: Vec<String>,
}

impl GatewayServer {
    /// Create a new gateway server
    pub fn new(bind: SocketAddr, orchestrator: Arc<Orchestrator>) -> Self {
        let state = GatewayState {
            orchestrator,
            start_time: Instant::now(),
        };
        Self {
            state,
            bind,
            cors_origins: Vec::new(),
        }
    }

    /// Restrict CORS to these origins (empty allows any origin)
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/chat", post(chat_handler))
            .route("/chatAll", post(chat_all_handler))
            .route("/models", get(models_handler))
            .route(
                "/sessions/{id}",
                get(session_history_handler).delete(clear_session_handler),
            )
            .route("/health", get(health_handler))
            .layer(cors_layer(&self.cors_origins))
            .with_state(self.state.clone())
    }

    /// Serve until `shutdown` resolves
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.bind).await?;
        info!("Gateway listening on {}", self.bind);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Gateway stopped");
        Ok(())
    }
}

/// Empty or `"*"` allows any origin without credentials; otherwise only
/// the listed origins, with credentials.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    // A wildcard cannot be listed or combined with credentials
    if origins.iter().any(|o| o.trim() == "*") {
        warn!("CORS origins include '*'; allowing any origin without credentials");
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .map(|origin| origin.trim())
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Ignoring invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

// ── HTTP Handlers ──

async fn chat_handler(
    State(state): State<GatewayState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    debug!(
        "POST /chat model={:?} messages={} session={:?}",
        req.model,
        req.messages.len(),
        req.session_id
    );
    let reply = state
        .orchestrator
        .chat(req.model.as_deref(), req.messages, req.session_id)
        .await?;
    Ok(Json(reply))
}

async fn chat_all_handler(
    State(state): State<GatewayState>,
    Json(req): Json<MultiChatRequest>,
) -> Result<Json<BroadcastReply>, ApiError> {
    debug!(
        "POST /chatAll models={:?} messages={} session={:?}",
        req.models,
        req.messages.len(),
        req.session_id
    );
    let reply = state
        .orchestrator
        .broadcast(req.models, req.messages, req.session_id)
        .await?;
    Ok(Json(reply))
}

async fn models_handler(State(state): State<GatewayState>) -> Json<Vec<ModelInfo>> {
    let models = state
        .orchestrator
        .connectors()
        .connectors()
        .iter()
        .map(|c| {
            let kind = ConnectorKind::from_name(c.name());
            ModelInfo {
                id: c.name().to_string(),
                name: kind
                    .map(|k| k.display_name().to_string())
                    .unwrap_or_else(|| c.name().to_string()),
                description: kind
                    .map(|k| k.description().to_string())
                    .unwrap_or_else(|| c.model().to_string()),
                model: c.model().to_string(),
            }
        })
        .collect();
    Json(models)
}

async fn session_history_handler(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
) -> Json<SessionHistory> {
    let messages = state.orchestrator.sessions().get(&session_id).await;
    Json(SessionHistory {
        session_id,
        messages,
    })
}

async fn clear_session_handler(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
) -> StatusCode {
    state.orchestrator.sessions().clear(&session_id).await;
    StatusCode::NO_CONTENT
}

async fn health_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    let models = state.orchestrator.connectors().len();
    let uptime = state.start_time.elapsed().as_secs();

    Json(serde_json::json!({
        "status": "ok",
        "models": models,
        "uptime_secs": uptime,
    }))
}
