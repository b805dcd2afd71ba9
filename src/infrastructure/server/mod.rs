//! Gateway HTTP/WebSocket Server
//!
//! Hosts the downstream price stream and operational endpoints on one
//! port:
//!
//! - `GET /ws/prices?symbol=SYM` - WebSocket upgrade; the client is
//!   bound to the requested symbol for the connection lifetime
//! - `GET /health` - JSON health status
//! - `GET /healthz` - liveness probe (simple OK)
//! - `GET /readyz` - readiness probe (checks the upstream feed)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::infrastructure::hub::PriceHub;
use crate::infrastructure::massive::gateway::{ConnectionState, MassiveGateway};
use crate::infrastructure::metrics::get_metrics_handle;

/// Symbol bound when the upgrade request carries no query parameter.
const DEFAULT_SYMBOL: &str = "AAPL";

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Gateway version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Upstream feed status.
    pub upstream: UpstreamStatus,
    /// Downstream client status.
    pub clients: ClientStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Feed authenticated (or intentionally disabled).
    Healthy,
    /// Feed connecting or between reconnect attempts.
    Degraded,
    /// Feed terminated by a provider limit.
    Unhealthy,
}

/// Upstream feed status.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamStatus {
    /// Connection state name.
    pub state: String,
    /// Whether a socket to the provider is open.
    pub connected: bool,
    /// Whether a credential is configured.
    pub enabled: bool,
    /// Ticks emitted since process start.
    pub ticks_received: u64,
    /// Reconnect attempts since process start.
    pub reconnects: u64,
}

/// Downstream client status.
#[derive(Debug, Clone, Serialize)]
pub struct ClientStatus {
    /// Active price stream clients.
    pub total: usize,
    /// Symbols with live interest.
    pub symbols: usize,
}

// =============================================================================
// Server State
// =============================================================================

/// Shared state for the gateway server.
pub struct ServerState {
    version: String,
    started_at: Instant,
    hub: Arc<PriceHub>,
    gateway: Arc<MassiveGateway>,
}

impl ServerState {
    /// Create new server state.
    #[must_use]
    pub fn new(version: String, hub: Arc<PriceHub>, gateway: Arc<MassiveGateway>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            hub,
            gateway,
        }
    }

    fn health(&self) -> HealthResponse {
        let state = self.gateway.state();
        let enabled = self.gateway.is_enabled();
        let stats = self.hub.stats();

        let status = match state {
            ConnectionState::Authenticated => HealthStatus::Healthy,
            ConnectionState::Terminated => HealthStatus::Unhealthy,
            _ if enabled => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        };

        HealthResponse {
            status,
            version: self.version.clone(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            current_time: Utc::now(),
            upstream: UpstreamStatus {
                state: state.as_str().to_string(),
                connected: state.is_connected(),
                enabled,
                ticks_received: self.gateway.ticks_received(),
                reconnects: self.gateway.reconnects(),
            },
            clients: ClientStatus {
                total: stats.clients,
                symbols: stats.symbols,
            },
        }
    }

    fn is_ready(&self) -> bool {
        !self.gateway.is_enabled() || self.gateway.state() == ConnectionState::Authenticated
    }
}

// =============================================================================
// Server
// =============================================================================

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind the listen port.
    #[error("failed to bind port {0}: {1}")]
    BindFailed(u16, String),
    /// The HTTP server failed while running.
    #[error("server failed: {0}")]
    ServerFailed(String),
}

/// The gateway HTTP/WebSocket server.
pub struct GatewayServer {
    port: u16,
    state: Arc<ServerState>,
    cancel: CancellationToken,
}

impl GatewayServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<ServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), ServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "gateway server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| ServerError::ServerFailed(e.to_string()))?;

        tracing::info!("gateway server stopped");
        Ok(())
    }
}

/// Build the gateway router. Exposed so tests can serve it on an
/// ephemeral listener.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/ws/prices", get(price_stream_handler))
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// Price Stream Handlers
// =============================================================================

/// Query parameters of the price stream route.
#[derive(Debug, Deserialize)]
struct PriceStreamQuery {
    symbol: Option<String>,
}

async fn price_stream_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<PriceStreamQuery>,
    State(state): State<Arc<ServerState>>,
) -> Response {
    let symbol = query
        .symbol
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SYMBOL)
        .to_uppercase();

    ws.on_upgrade(move |socket| handle_price_socket(socket, symbol, state))
}

/// Drive one downstream connection: bind it, pump frames out, and
/// unbind on close or error.
async fn handle_price_socket(socket: WebSocket, symbol: String, state: Arc<ServerState>) {
    let (mut sender, mut receiver) = socket.split();
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<String>();

    let id = Uuid::new_v4();
    let bound = state.hub.add_client(id, &symbol, frame_tx);
    tracing::info!(client = %id, symbol = %bound, "price stream client connected");

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if sender.send(WsMessage::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound traffic is not part of the protocol; the read loop only
    // watches for the connection ending. Pings are answered by axum.
    loop {
        tokio::select! {
            _ = &mut writer => break,
            msg = receiver.next() => match msg {
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    writer.abort();
    state.hub.remove_client(&id);
    tracing::info!(client = %id, symbol = %bound, "price stream client disconnected");
}

// =============================================================================
// Health Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let health = state.health();
    let code = match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(health))
}

async fn liveness_handler() -> &'static str {
    "ok"
}

async fn readiness_handler(State(state): State<Arc<ServerState>>) -> Response {
    if state.is_ready() {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "upstream not authenticated").into_response()
    }
}

async fn metrics_handler() -> Response {
    get_metrics_handle().map_or_else(
        || (StatusCode::SERVICE_UNAVAILABLE, "metrics not initialized").into_response(),
        |handle| handle.render().into_response(),
    )
}
