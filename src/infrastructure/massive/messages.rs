//! Massive WebSocket Message Types
//!
//! Wire format types for the Massive streaming feed (stocks, options
//! or forex depending on the endpoint URL).
//!
//! # Protocol
//!
//! Outbound control messages are single JSON objects:
//!
//! ```json
//! {"action":"auth","params":"<api key>"}
//! {"action":"subscribe","params":"AM.AAPL,AM.MSFT"}
//! ```
//!
//! Inbound payloads are JSON arrays of records (a lone object is also
//! accepted). Each record carries an `ev` tag:
//!
//! - `status`: connection/auth/limit notices
//! - `AM`: per-minute aggregate with close price `c` and window start `s`
//! - `T`: trade print with price `p` and timestamp `t`
//!
//! Data records name their symbol inconsistently across feed families
//! (`sym`, `ticker` or `symbol`); the accessors below take the first
//! present.

use serde::{Deserialize, Serialize};

use crate::domain::symbol::{self, Symbol};
use crate::domain::tick::{Tick, TickKind};

// =============================================================================
// Outbound Control Messages
// =============================================================================

/// An outbound `{action, params}` control message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlRequest {
    /// Verb understood by the provider: `auth` or `subscribe`.
    pub action: &'static str,
    /// Verb-specific payload.
    pub params: String,
}

impl ControlRequest {
    /// Authentication request carrying the API key.
    #[must_use]
    pub fn auth(api_key: &str) -> Self {
        Self {
            action: "auth",
            params: api_key.to_string(),
        }
    }

    /// Subscription request for pre-formatted `<KIND>.<SYMBOL>` params.
    #[must_use]
    pub const fn subscribe(params: String) -> Self {
        Self {
            action: "subscribe",
            params,
        }
    }
}

// =============================================================================
// Inbound Records
// =============================================================================

/// One inbound record, dispatched by its `ev` tag.
#[derive(Debug, Clone, PartialEq)]
pub enum MassiveRecord {
    /// Connection/auth/limit status notice.
    Status(StatusMessage),
    /// Minute aggregate data record.
    Aggregate(AggregateMessage),
    /// Trade data record.
    Trade(TradeMessage),
}

/// Status record.
///
/// # Wire Format
/// ```json
/// {"ev":"status","status":"auth_success"}
/// {"ev":"status","status":"max_connections","message":"Maximum number of connections exceeded"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusMessage {
    /// Event tag (always `status`).
    pub ev: String,
    /// Machine-readable status string.
    #[serde(default)]
    pub status: Option<String>,
    /// Human-readable detail, when present.
    #[serde(default)]
    pub message: Option<String>,
}

impl StatusMessage {
    /// Whether this record acknowledges successful authentication.
    #[must_use]
    pub fn is_auth_success(&self) -> bool {
        self.status.as_deref() == Some("auth_success")
    }

    /// Whether this record reports a rate/quota limit.
    ///
    /// The provider does not use a dedicated tag; limit notices carry
    /// a `max*` status (any casing) or a message containing `Maximum`.
    #[must_use]
    pub fn is_limit(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.to_ascii_lowercase().contains("max"))
            || self.message.as_deref().is_some_and(|m| m.contains("Maximum"))
    }

    /// Best human-readable description of this status.
    #[must_use]
    pub fn detail(&self) -> String {
        match (self.status.as_deref(), self.message.as_deref()) {
            (Some(status), Some(message)) => format!("{status}: {message}"),
            (Some(status), None) => status.to_string(),
            (None, Some(message)) => message.to_string(),
            (None, None) => String::new(),
        }
    }
}

/// Minute aggregate record (`ev:"AM"`).
///
/// # Wire Format
/// ```json
/// {"ev":"AM","sym":"X:BTCUSD","c":67000.5,"s":1700000000000}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AggregateMessage {
    /// Event tag (always `AM`).
    pub ev: String,
    /// Symbol, primary field name.
    #[serde(default)]
    pub sym: Option<String>,
    /// Symbol, alternate field name on some feed families.
    #[serde(default)]
    pub ticker: Option<String>,
    /// Symbol, alternate field name on some feed families.
    #[serde(default)]
    pub symbol: Option<String>,
    /// Close price of the aggregate window.
    #[serde(rename = "c", default)]
    pub close: Option<f64>,
    /// Window start in epoch milliseconds.
    #[serde(rename = "s", default)]
    pub start_ts: Option<i64>,
}

impl AggregateMessage {
    /// Coerce this record into a normalized tick.
    ///
    /// Returns `None` when the symbol normalizes to empty or the close
    /// price is absent or not a finite positive number.
    #[must_use]
    pub fn into_tick(self) -> Option<Tick> {
        let sym = record_symbol(self.sym, self.ticker, self.symbol);
        Tick::try_new(sym, self.close?, self.start_ts, TickKind::Aggregate)
    }
}

/// Trade record (`ev:"T"`).
///
/// # Wire Format
/// ```json
/// {"ev":"T","sym":"AAPL","p":187.33,"t":1700000000123}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TradeMessage {
    /// Event tag (always `T`).
    pub ev: String,
    /// Symbol, primary field name.
    #[serde(default)]
    pub sym: Option<String>,
    /// Symbol, alternate field name.
    #[serde(default)]
    pub ticker: Option<String>,
    /// Symbol, alternate field name.
    #[serde(default)]
    pub symbol: Option<String>,
    /// Trade price.
    #[serde(rename = "p", default)]
    pub price: Option<f64>,
    /// Trade timestamp in epoch milliseconds.
    #[serde(rename = "t", default)]
    pub ts: Option<i64>,
}

impl TradeMessage {
    /// Coerce this record into a normalized tick.
    #[must_use]
    pub fn into_tick(self) -> Option<Tick> {
        let sym = record_symbol(self.sym, self.ticker, self.symbol);
        Tick::try_new(sym, self.price?, self.ts, TickKind::Trade)
    }
}

/// First present symbol spelling, normalized.
fn record_symbol(sym: Option<String>, ticker: Option<String>, symbol: Option<String>) -> Symbol {
    symbol::normalize(sym.or(ticker).or(symbol).as_deref().unwrap_or(""))
}
