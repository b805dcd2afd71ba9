//! Configuration Module
//!
//! Environment-driven configuration for the gateway service.

mod settings;

pub use settings::{
    ChannelSettings, GatewayConfig, MassiveSettings, ReconnectSettings, ServerSettings,
};
