//! Price Distribution Hub
//!
//! Binds downstream clients to symbols and fans the gateway's tick
//! stream out to them. Each client is bound to exactly one symbol for
//! its connection lifetime; the hub holds only the client's outbound
//! frame channel, never the socket itself.
//!
//! Interest is reference-counted per symbol through the
//! [`InterestRegistry`]; the upstream feed is asked to subscribe only
//! on the 0→1 transition and is never asked to unsubscribe.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::ports::UpstreamControl;
use crate::domain::interest::InterestRegistry;
use crate::domain::symbol::{self, Symbol};
use crate::domain::tick::{Tick, TickKind};
use crate::infrastructure::metrics;

/// Identifier for one downstream client connection.
pub type ClientId = Uuid;

// =============================================================================
// Downstream Frames
// =============================================================================

/// A frame sent to a downstream client, serialized as one JSON object
/// per text message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DownstreamFrame {
    /// One-time acknowledgement of a new binding.
    Welcome {
        /// The symbol the client is bound to.
        symbol: Symbol,
    },
    /// One normalized price observation.
    Price {
        /// Canonical symbol.
        symbol: Symbol,
        /// Observed price.
        price: f64,
        /// Observation timestamp in epoch milliseconds.
        ts: i64,
        /// Upstream stream the observation came from.
        source: TickKind,
    },
}

impl DownstreamFrame {
    /// Build the price frame for a tick.
    #[must_use]
    pub fn price(tick: &Tick) -> Self {
        Self::Price {
            symbol: tick.symbol.clone(),
            price: tick.price,
            ts: tick.ts,
            source: tick.kind,
        }
    }
}

// =============================================================================
// Hub
// =============================================================================

/// One client's binding: its symbol and its outbound frame channel.
#[derive(Debug)]
struct ClientBinding {
    symbol: Symbol,
    sender: mpsc::UnboundedSender<String>,
}

/// Statistics snapshot for health reporting.
#[derive(Debug, Clone, Copy, Default)]
pub struct HubStats {
    /// Active downstream clients.
    pub clients: usize,
    /// Symbols with live interest.
    pub symbols: usize,
}

/// The fan-out hub.
///
/// One instance per gateway, constructed in `main` and shared by
/// `Arc`. All mutation of the binding map happens through `add_client`
/// and `remove_client`; the broadcast path only reads it.
pub struct PriceHub {
    upstream: Arc<dyn UpstreamControl>,
    registry: InterestRegistry,
    clients: RwLock<HashMap<ClientId, ClientBinding>>,
}

impl PriceHub {
    /// Create a hub distributing for the given upstream feed.
    #[must_use]
    pub fn new(upstream: Arc<dyn UpstreamControl>) -> Self {
        Self {
            upstream,
            registry: InterestRegistry::new(),
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Bind a new client to a symbol.
    ///
    /// Sends the one-time `welcome` frame, records the binding, and —
    /// on the symbol's first interest — asks the upstream feed to
    /// subscribe. Returns the canonical symbol the client was bound
    /// to.
    pub fn add_client(
        &self,
        id: ClientId,
        raw_symbol: &str,
        sender: mpsc::UnboundedSender<String>,
    ) -> Symbol {
        let sym = symbol::normalize(raw_symbol);

        // The welcome frame is enqueued before the binding becomes
        // visible to the broadcast path, so it precedes any price.
        if let Ok(frame) = serde_json::to_string(&DownstreamFrame::Welcome { symbol: sym.clone() })
        {
            let _ = sender.send(frame);
        }

        let client_total = {
            let mut clients = self.clients.write();
            clients.insert(
                id,
                ClientBinding {
                    symbol: sym.clone(),
                    sender,
                },
            );
            clients.len()
        };
        metrics::set_active_clients(client_total);

        if self.registry.increment(&sym) {
            self.upstream.subscribe(&sym);
        }

        tracing::debug!(client = %id, symbol = %sym, "client bound");
        sym
    }

    /// Unbind a client after its socket closed or errored.
    ///
    /// Decrements the symbol's interest count. Even on the last
    /// interest no upstream unsubscribe is attempted. Unknown ids are
    /// a no-op.
    pub fn remove_client(&self, id: &ClientId) {
        let (binding, client_total) = {
            let mut clients = self.clients.write();
            let binding = clients.remove(id);
            (binding, clients.len())
        };
        let Some(binding) = binding else {
            return;
        };
        metrics::set_active_clients(client_total);

        if self.registry.decrement(&binding.symbol) {
            // Last interest: the entry is gone, but the upstream
            // subscription is retained (bounded by distinct symbols).
            tracing::debug!(symbol = %binding.symbol, "last client for symbol left");
        }

        tracing::debug!(client = %id, symbol = %binding.symbol, "client unbound");
    }

    /// Active downstream client count.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Snapshot for health reporting.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            clients: self.clients.read().len(),
            symbols: self.registry.symbol_count(),
        }
    }

    /// Deliver one tick to every client bound to its symbol.
    ///
    /// A failed delivery means the client's channel is gone (its
    /// connection task is tearing down); it is counted and skipped
    /// without affecting the remaining clients.
    fn broadcast(&self, tick: &Tick) {
        let Ok(frame) = serde_json::to_string(&DownstreamFrame::price(tick)) else {
            return;
        };

        let mut delivered = 0u64;
        let clients = self.clients.read();
        for binding in clients.values().filter(|b| b.symbol == tick.symbol) {
            if binding.sender.send(frame.clone()).is_ok() {
                delivered += 1;
            } else {
                metrics::record_broadcast_failure();
            }
        }

        if delivered > 0 {
            metrics::record_frames_broadcast(delivered);
        }
    }

    /// Consume the gateway's tick stream until cancellation.
    ///
    /// Ticks are broadcast in exactly the order received.
    pub async fn run(self: Arc<Self>, mut ticks: mpsc::Receiver<Tick>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                tick = ticks.recv() => match tick {
                    Some(tick) => self.broadcast(&tick),
                    None => break,
                },
            }
        }

        tracing::debug!("price hub stopped");
    }
}
