//! Massive Stream Gateway Binary
//!
//! Starts the market data gateway and fan-out server.
//!
//! # Usage
//!
//! ```bash
//! cargo run
//! ```
//!
//! # Environment Variables
//!
//! ## Provider
//! - `MASSIVE_API_KEY`: Massive API key (absent ⇒ gateway disabled)
//! - `MASSIVE_WS_URL`: Feed endpoint (default: wss://delayed.massive.com/stocks)
//! - `MASSIVE_MODE`: "aggregate" | "trade" | "both" (default: aggregate)
//!
//! ## Server
//! - `GATEWAY_HTTP_PORT`: HTTP/WebSocket port (default: 8080)
//! - `GATEWAY_RECONNECT_DELAY_INITIAL_MS`: First backoff delay (default: 1000)
//! - `GATEWAY_RECONNECT_DELAY_MAX_SECS`: Backoff ceiling (default: 30)
//!
//! ## Observability
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: massive-stream-gateway)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use massive_stream_gateway::infrastructure::telemetry;
use massive_stream_gateway::{
    GatewayConfig, GatewayServer, MassiveGateway, PriceHub, ServerState, StatusNotice,
    init_metrics,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
#[allow(clippy::expect_used)]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("starting Massive Stream Gateway");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = GatewayConfig::from_env();
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Typed event channels: status notices and the tick stream.
    let (status_tx, status_rx) = mpsc::channel::<StatusNotice>(config.channels.status_capacity);
    let (tick_tx, tick_rx) = mpsc::channel(config.channels.tick_capacity);

    // One gateway and one hub per provider configuration, wired here
    // and shared by reference.
    let gateway = Arc::new(MassiveGateway::new(
        config.massive_config(),
        status_tx,
        tick_tx,
    ));
    let hub = Arc::new(PriceHub::new(
        Arc::clone(&gateway) as Arc<dyn massive_stream_gateway::UpstreamControl>
    ));

    // Spawn the status notice handler
    tokio::spawn(handle_status_notices(status_rx));

    // Spawn the fan-out loop
    tokio::spawn(Arc::clone(&hub).run(tick_rx, shutdown_token.clone()));

    // Begin connecting upstream (no-op when disabled)
    gateway.start();

    // Spawn the HTTP/WebSocket server
    let state = Arc::new(ServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&hub),
        Arc::clone(&gateway),
    ));
    let server = GatewayServer::new(config.server.http_port, state, shutdown_token.clone());
    tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!(error = %e, "gateway server error");
        }
    });

    tracing::info!("gateway ready");

    await_shutdown(shutdown_token).await;
    gateway.stop();

    tracing::info!("gateway stopped");
    Ok(())
}

/// Handle lifecycle notices from the gateway.
async fn handle_status_notices(mut rx: mpsc::Receiver<StatusNotice>) {
    while let Some(notice) = rx.recv().await {
        match notice {
            StatusNotice::Opened => {
                tracing::info!("upstream feed opened");
            }
            StatusNotice::Closed { code, reason } => {
                tracing::warn!(?code, reason = %reason, "upstream feed closed");
            }
            StatusNotice::Errored { detail } => {
                tracing::error!(error = %detail, "upstream feed error");
            }
            StatusNotice::Authenticated => {
                tracing::info!("upstream feed authenticated");
            }
            StatusNotice::LimitReached { detail } => {
                tracing::error!(detail = %detail, "upstream limit reached; reconnection disabled");
            }
            StatusNotice::Info { detail } => {
                tracing::debug!(detail = %detail, "upstream status");
            }
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &GatewayConfig) {
    tracing::info!(
        url = %config.massive.url,
        enabled = config.massive.is_enabled(),
        mode = config.massive.mode.as_str(),
        http_port = config.server.http_port,
        "configuration loaded"
    );
}

/// Load .env file from the current directory or any ancestor.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
