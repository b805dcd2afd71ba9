//! Infrastructure Layer - Adapters and external integrations.

/// Environment-driven configuration.
pub mod config;

/// Price distribution hub for downstream clients.
pub mod hub;

/// Massive feed WebSocket adapter.
pub mod massive;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// HTTP/WebSocket server (price stream, health, metrics).
pub mod server;

/// OpenTelemetry tracing integration.
pub mod telemetry;
