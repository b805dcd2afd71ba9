//! Symbol Canonicalization
//!
//! Every symbol entering the gateway — from a downstream query
//! parameter or an upstream data record — passes through [`normalize`]
//! so that interest tracking, subscription params, and broadcast
//! matching all compare one canonical spelling.

/// A canonical symbol string (e.g. `AAPL`, `X:BTCUSD`).
pub type Symbol = String;

/// Canonicalize an arbitrary symbol spelling.
///
/// Trims surrounding whitespace and upper-cases the remainder. An
/// input that is empty or all whitespace normalizes to the empty
/// string; callers treat that as "no symbol".
#[must_use]
pub fn normalize(raw: &str) -> Symbol {
    raw.trim().to_uppercase()
}
