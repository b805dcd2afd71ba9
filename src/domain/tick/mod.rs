//! Normalized Price Ticks
//!
//! A [`Tick`] is one normalized price observation coerced from a
//! provider data record. Construction goes through [`Tick::try_new`],
//! which enforces the validity rules: a non-empty canonical symbol and
//! a finite, strictly positive price. Records that fail either rule
//! never become ticks.

use serde::Serialize;

use crate::domain::symbol::Symbol;

/// The upstream stream a tick was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TickKind {
    /// Per-minute aggregate (the bar's close price).
    Aggregate,
    /// Individual trade print.
    Trade,
}

impl TickKind {
    /// Stable label used in downstream frames and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Aggregate => "aggregate",
            Self::Trade => "trade",
        }
    }
}

/// Which upstream streams the gateway subscribes to and emits from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickMode {
    /// Minute aggregates only.
    #[default]
    Aggregate,
    /// Trade prints only.
    Trade,
    /// Both streams.
    Both,
}

impl TickMode {
    /// Parse a mode from a configuration string. Unknown values fall
    /// back to the default aggregate mode.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trade" => Self::Trade,
            "both" => Self::Both,
            _ => Self::Aggregate,
        }
    }

    /// Whether aggregate records should be consumed.
    #[must_use]
    pub const fn includes_aggregate(self) -> bool {
        matches!(self, Self::Aggregate | Self::Both)
    }

    /// Whether trade records should be consumed.
    #[must_use]
    pub const fn includes_trade(self) -> bool {
        matches!(self, Self::Trade | Self::Both)
    }

    /// Get the mode name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Aggregate => "aggregate",
            Self::Trade => "trade",
            Self::Both => "both",
        }
    }
}

/// One normalized price observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    /// Canonical symbol.
    pub symbol: Symbol,
    /// Observed price; finite and strictly positive by construction.
    pub price: f64,
    /// Observation timestamp in epoch milliseconds.
    pub ts: i64,
    /// Which upstream stream produced the observation.
    pub kind: TickKind,
}

impl Tick {
    /// Build a tick from already-normalized inputs.
    ///
    /// Returns `None` when the symbol is empty or the price is not a
    /// finite positive number. A missing or zero timestamp falls back
    /// to the current wall clock.
    #[must_use]
    pub fn try_new(symbol: Symbol, price: f64, ts: Option<i64>, kind: TickKind) -> Option<Self> {
        if symbol.is_empty() || !price.is_finite() || price <= 0.0 {
            return None;
        }

        let ts = ts
            .filter(|t| *t != 0)
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

        Some(Self {
            symbol,
            price,
            ts,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn valid_tick_passes_through() {
        let tick = Tick::try_new(
            "X:BTCUSD".to_string(),
            67_000.5,
            Some(1_700_000_000_000),
            TickKind::Aggregate,
        )
        .unwrap();

        assert_eq!(tick.symbol, "X:BTCUSD");
        assert!((tick.price - 67_000.5).abs() < f64::EPSILON);
        assert_eq!(tick.ts, 1_700_000_000_000);
        assert_eq!(tick.kind, TickKind::Aggregate);
    }

    #[test_case(f64::NAN; "nan")]
    #[test_case(f64::INFINITY; "positive infinity")]
    #[test_case(f64::NEG_INFINITY; "negative infinity")]
    #[test_case(0.0; "zero")]
    #[test_case(-150.25; "negative")]
    fn invalid_price_yields_no_tick(price: f64) {
        assert!(Tick::try_new("AAPL".to_string(), price, Some(1), TickKind::Trade).is_none());
    }

    #[test]
    fn empty_symbol_yields_no_tick() {
        assert!(Tick::try_new(String::new(), 10.0, Some(1), TickKind::Trade).is_none());
    }

    #[test]
    fn missing_timestamp_falls_back_to_now() {
        let before = chrono::Utc::now().timestamp_millis();
        let tick = Tick::try_new("AAPL".to_string(), 10.0, None, TickKind::Trade).unwrap();
        let after = chrono::Utc::now().timestamp_millis();

        assert!(tick.ts >= before && tick.ts <= after);
    }

    #[test]
    fn zero_timestamp_falls_back_to_now() {
        let tick = Tick::try_new("AAPL".to_string(), 10.0, Some(0), TickKind::Trade).unwrap();
        assert_ne!(tick.ts, 0);
    }

    #[test]
    fn mode_parsing() {
        assert_eq!(TickMode::from_str_case_insensitive("trade"), TickMode::Trade);
        assert_eq!(TickMode::from_str_case_insensitive("BOTH"), TickMode::Both);
        assert_eq!(
            TickMode::from_str_case_insensitive("aggregate"),
            TickMode::Aggregate
        );
        assert_eq!(
            TickMode::from_str_case_insensitive("unknown"),
            TickMode::Aggregate
        );
    }

    #[test]
    fn mode_stream_selection() {
        assert!(TickMode::Aggregate.includes_aggregate());
        assert!(!TickMode::Aggregate.includes_trade());
        assert!(TickMode::Trade.includes_trade());
        assert!(!TickMode::Trade.includes_aggregate());
        assert!(TickMode::Both.includes_aggregate());
        assert!(TickMode::Both.includes_trade());
    }

    #[test]
    fn kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TickKind::Aggregate).unwrap(),
            "\"aggregate\""
        );
        assert_eq!(serde_json::to_string(&TickKind::Trade).unwrap(), "\"trade\"");
    }
}
