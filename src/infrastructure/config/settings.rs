//! Gateway Configuration Settings
//!
//! Configuration types for the gateway, loaded from environment
//! variables. Every value has a default; the only consequential
//! absence is the API key, which leaves the upstream gateway disabled
//! rather than failing startup.

use std::time::Duration;

use crate::domain::tick::TickMode;
use crate::infrastructure::massive::gateway::MassiveConfig;
use crate::infrastructure::massive::reconnect::ReconnectConfig;

/// Default feed endpoint (delayed stocks feed).
const DEFAULT_FEED_URL: &str = "wss://delayed.massive.com/stocks";

/// Massive feed settings.
#[derive(Clone)]
pub struct MassiveSettings {
    /// Feed endpoint URL (stocks, options or forex by URL).
    pub url: String,
    /// API key; `None` disables the gateway.
    pub api_key: Option<String>,
    /// Which data streams to consume.
    pub mode: TickMode,
}

impl Default for MassiveSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            api_key: None,
            mode: TickMode::default(),
        }
    }
}

impl MassiveSettings {
    /// Whether a credential is configured.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}

impl std::fmt::Debug for MassiveSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MassiveSettings")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("mode", &self.mode)
            .finish()
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// HTTP/WebSocket server port.
    pub http_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { http_port: 8080 }
    }
}

/// Upstream reconnection settings.
#[derive(Debug, Clone)]
pub struct ReconnectSettings {
    /// Delay before the first reconnection attempt.
    pub delay_initial: Duration,
    /// Ceiling for the doubled delay.
    pub delay_max: Duration,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            delay_initial: Duration::from_millis(1000),
            delay_max: Duration::from_secs(30),
        }
    }
}

/// Channel capacity settings.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// Capacity of the tick channel (gateway → hub).
    pub tick_capacity: usize,
    /// Capacity of the status notice channel.
    pub status_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            tick_capacity: 1024,
            status_capacity: 256,
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    /// Massive feed settings.
    pub massive: MassiveSettings,
    /// Server port settings.
    pub server: ServerSettings,
    /// Reconnection settings.
    pub reconnect: ReconnectSettings,
    /// Channel capacity settings.
    pub channels: ChannelSettings,
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// A present but empty `MASSIVE_API_KEY` counts as absent;
    /// unparseable optional values fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let api_key = std::env::var("MASSIVE_API_KEY")
            .ok()
            .filter(|key| !key.is_empty());

        let url = std::env::var("MASSIVE_WS_URL")
            .ok()
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_FEED_URL.to_string());

        let mode = std::env::var("MASSIVE_MODE")
            .map(|s| TickMode::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let server = ServerSettings {
            http_port: parse_env_u16("GATEWAY_HTTP_PORT", ServerSettings::default().http_port),
        };

        let reconnect = ReconnectSettings {
            delay_initial: parse_env_duration_millis(
                "GATEWAY_RECONNECT_DELAY_INITIAL_MS",
                ReconnectSettings::default().delay_initial,
            ),
            delay_max: parse_env_duration_secs(
                "GATEWAY_RECONNECT_DELAY_MAX_SECS",
                ReconnectSettings::default().delay_max,
            ),
        };

        let channels = ChannelSettings {
            tick_capacity: parse_env_usize(
                "GATEWAY_TICK_CAPACITY",
                ChannelSettings::default().tick_capacity,
            ),
            status_capacity: parse_env_usize(
                "GATEWAY_STATUS_CAPACITY",
                ChannelSettings::default().status_capacity,
            ),
        };

        Self {
            massive: MassiveSettings { url, api_key, mode },
            server,
            reconnect,
            channels,
        }
    }

    /// Build the connection configuration for the gateway.
    #[must_use]
    pub fn massive_config(&self) -> MassiveConfig {
        MassiveConfig {
            url: self.massive.url.clone(),
            api_key: self.massive.api_key.clone(),
            mode: self.massive.mode,
            reconnect: ReconnectConfig {
                initial_delay: self.reconnect.delay_initial,
                max_delay: self.reconnect.delay_max,
            },
        }
    }
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_provider_contract() {
        let settings = MassiveSettings::default();
        assert_eq!(settings.url, "wss://delayed.massive.com/stocks");
        assert!(settings.api_key.is_none());
        assert!(!settings.is_enabled());
        assert_eq!(settings.mode, TickMode::Aggregate);
    }

    #[test]
    fn reconnect_defaults_match_backoff_law() {
        let settings = ReconnectSettings::default();
        assert_eq!(settings.delay_initial, Duration::from_millis(1000));
        assert_eq!(settings.delay_max, Duration::from_secs(30));
    }

    #[test]
    fn server_defaults() {
        assert_eq!(ServerSettings::default().http_port, 8080);
        let channels = ChannelSettings::default();
        assert_eq!(channels.tick_capacity, 1024);
        assert_eq!(channels.status_capacity, 256);
    }

    #[test]
    fn settings_debug_redacts_api_key() {
        let settings = MassiveSettings {
            api_key: Some("secret123".to_string()),
            ..Default::default()
        };
        let debug = format!("{settings:?}");

        assert!(!debug.contains("secret123"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn massive_config_carries_reconnect_bounds() {
        let config = GatewayConfig::default().massive_config();
        assert_eq!(config.reconnect.initial_delay, Duration::from_millis(1000));
        assert_eq!(config.reconnect.max_delay, Duration::from_secs(30));
        assert_eq!(config.url, "wss://delayed.massive.com/stocks");
    }
}
