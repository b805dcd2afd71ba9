#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::default_trait_access
    )
)]

//! Massive Stream Gateway - Market Data Fan-Out Hub
//!
//! Maintains a single WebSocket connection to the Massive streaming
//! feed and redistributes normalized price ticks to many downstream
//! WebSocket subscribers grouped by symbol.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Symbol normalization, tick model, interest refcounts
//! - **Application**: Port definitions (the hub ↔ feed seam)
//! - **Infrastructure**: Adapters and external integrations
//!   - `massive`: WebSocket client for the upstream feed
//!   - `hub`: Symbol-keyed fan-out to downstream clients
//!   - `server`: axum price stream + health endpoints
//!   - `config`, `telemetry`, `metrics`: ambient wiring
//!
//! # Data Flow
//!
//! ```text
//! Massive feed WS ──► Gateway ──► tick channel ──► Hub ──► Client 1
//!                      (auth,                       │  └──► Client 2
//!                       backoff,                    └─────► Client N
//!                       normalize)
//! ```
//!
//! Control flow runs the other way: a downstream connection binds a
//! symbol, and the first interest in a symbol triggers one upstream
//! subscribe. The last departure triggers nothing; upstream
//! subscriptions are retained until the next reconnect.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core market data types with no I/O.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::interest::InterestRegistry;
pub use domain::symbol::{Symbol, normalize};
pub use domain::tick::{Tick, TickKind, TickMode};

// Ports
pub use application::ports::UpstreamControl;

// Configuration
pub use infrastructure::config::{
    ChannelSettings, GatewayConfig, MassiveSettings, ReconnectSettings, ServerSettings,
};

// Massive feed adapter
pub use infrastructure::massive::{
    ConnectionState, GatewayError, JsonCodec, MassiveConfig, MassiveGateway, ReconnectConfig,
    ReconnectPolicy, StatusNotice, backoff_delay,
};

// Distribution hub
pub use infrastructure::hub::{ClientId, DownstreamFrame, HubStats, PriceHub};

// Server (router exposed for integration tests)
pub use infrastructure::server::{GatewayServer, ServerError, ServerState, router};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
