//! Massive Feed Adapter
//!
//! WebSocket client for the Massive streaming feed: wire message
//! types, payload codec, deterministic reconnection policy, and the
//! gateway connection state machine.

pub mod codec;
pub mod gateway;
pub mod messages;
pub mod reconnect;

pub use codec::{CodecError, JsonCodec};
pub use gateway::{ConnectionState, GatewayError, MassiveConfig, MassiveGateway, StatusNotice};
pub use messages::{
    AggregateMessage, ControlRequest, MassiveRecord, StatusMessage, TradeMessage,
};
pub use reconnect::{ReconnectConfig, ReconnectPolicy, backoff_delay};
