//! Interest Reference Counting
//!
//! Tracks how many downstream clients are currently interested in each
//! symbol. The registry's only job is to report the two transitions
//! that matter: 0→1 (the upstream subscription is first needed) and
//! 1→0 (the last client left). The upstream side deliberately reacts
//! only to the first.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::domain::symbol::Symbol;

/// Per-symbol downstream interest counts.
///
/// Counts are never negative: decrementing an untracked symbol is a
/// no-op, and an entry is removed the moment its count reaches zero.
///
/// # Example
///
/// ```rust
/// use massive_stream_gateway::InterestRegistry;
///
/// let registry = InterestRegistry::new();
///
/// // First client for AAPL - upstream subscription needed.
/// assert!(registry.increment("AAPL"));
///
/// // Second client - already covered upstream.
/// assert!(!registry.increment("AAPL"));
///
/// // One leaves - still covered.
/// assert!(!registry.decrement("AAPL"));
///
/// // Last one leaves - interest is gone.
/// assert!(registry.decrement("AAPL"));
/// ```
#[derive(Debug, Default)]
pub struct InterestRegistry {
    counts: Mutex<HashMap<Symbol, usize>>,
}

impl InterestRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more interested client for `symbol`.
    ///
    /// Returns `true` exactly on the 0→1 transition.
    pub fn increment(&self, symbol: &str) -> bool {
        let mut counts = self.counts.lock();
        let count = counts.entry(symbol.to_string()).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Record one departed client for `symbol`.
    ///
    /// Returns `true` exactly on the 1→0 transition, which also
    /// removes the tracking entry. Untracked symbols are a no-op.
    pub fn decrement(&self, symbol: &str) -> bool {
        let mut counts = self.counts.lock();
        let Some(count) = counts.get_mut(symbol) else {
            return false;
        };

        *count = count.saturating_sub(1);
        if *count == 0 {
            counts.remove(symbol);
            true
        } else {
            false
        }
    }

    /// Whether `symbol` currently has any interested clients.
    #[must_use]
    pub fn is_tracked(&self, symbol: &str) -> bool {
        self.counts.lock().contains_key(symbol)
    }

    /// Number of symbols with live interest.
    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.counts.lock().len()
    }
}
