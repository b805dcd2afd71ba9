//! Massive WebSocket Gateway
//!
//! Owns the single upstream connection to the Massive feed. The
//! gateway authenticates on open, keeps a desired-subscription set
//! that is flushed on every successful authentication, normalizes
//! data records into [`Tick`]s, and survives disconnects with
//! deterministic exponential backoff.
//!
//! Consumers observe the gateway through two typed channels handed in
//! at construction: a [`StatusNotice`] channel for the closed set of
//! lifecycle notices and a dedicated [`Tick`] channel for price data.
//! No failure inside the gateway surfaces as a return value.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;

use super::codec::JsonCodec;
use super::messages::{ControlRequest, MassiveRecord};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::UpstreamControl;
use crate::domain::symbol::{self, Symbol};
use crate::domain::tick::{Tick, TickMode};
use crate::infrastructure::metrics;

/// Close code sent when the provider reports a fatal limit.
const LIMIT_CLOSE_CODE: u16 = 4000;

// =============================================================================
// Error Type
// =============================================================================

/// Errors internal to one connection cycle. These never leave the
/// gateway; they only decide whether a reconnect is scheduled.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// WebSocket transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Failed to serialize or send a control message.
    #[error("failed to send control message: {0}")]
    Send(String),

    /// The server closed the connection or the stream ended.
    #[error("connection closed")]
    ConnectionClosed,
}

// =============================================================================
// Connection State & Notices
// =============================================================================

/// Upstream connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket; either never started or between reconnect attempts.
    #[default]
    Disconnected,
    /// Dialing the provider endpoint.
    Connecting,
    /// Socket open, auth request sent, acknowledgement pending.
    Connected,
    /// Authenticated; subscriptions are live.
    Authenticated,
    /// Fatal provider limit; only an explicit `start()` leaves this.
    Terminated,
}

impl ConnectionState {
    /// Get the state name for health reporting.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Authenticated => "authenticated",
            Self::Terminated => "terminated",
        }
    }

    /// Whether a socket to the provider is currently open.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::Authenticated)
    }
}

/// Lifecycle notices emitted by the gateway.
///
/// This is the complete observable status surface; ticks travel on
/// their own channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusNotice {
    /// Socket opened and auth request sent.
    Opened,
    /// Server closed the connection or the stream ended.
    Closed {
        /// Close code, when the server sent a close frame.
        code: Option<u16>,
        /// Close reason, when present.
        reason: String,
    },
    /// Transport-level error.
    Errored {
        /// Error description.
        detail: String,
    },
    /// Authentication acknowledged; queued subscriptions flushed.
    Authenticated,
    /// Fatal provider rate/quota limit; reconnection disabled.
    LimitReached {
        /// Provider-supplied detail.
        detail: String,
    },
    /// Any other provider status record.
    Info {
        /// Provider-supplied detail.
        detail: String,
    },
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the gateway connection.
#[derive(Clone)]
pub struct MassiveConfig {
    /// Feed endpoint (stocks, options or forex by URL).
    pub url: String,
    /// API key; `None` leaves the gateway disabled.
    pub api_key: Option<String>,
    /// Which data streams to subscribe to and emit.
    pub mode: TickMode,
    /// Backoff configuration for reconnects.
    pub reconnect: ReconnectConfig,
}

impl MassiveConfig {
    /// Create a configuration with default backoff.
    #[must_use]
    pub fn new(url: impl Into<String>, api_key: Option<String>, mode: TickMode) -> Self {
        Self {
            url: url.into(),
            api_key,
            mode,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl std::fmt::Debug for MassiveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MassiveConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("mode", &self.mode)
            .field("reconnect", &self.reconnect)
            .finish()
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// How one connection cycle ended without a transport error.
enum SessionEnd {
    /// Cancelled by `stop()`.
    Stopped,
    /// Provider limit; reconnection is disabled.
    LimitReached,
}

/// What to do after handling one inbound payload.
enum PayloadOutcome {
    /// Keep reading.
    Continue,
    /// Fatal limit; close and end the session.
    Limit,
}

/// Handle to a live connection task.
struct ConnHandle {
    cancel: CancellationToken,
    cmd_tx: mpsc::UnboundedSender<Symbol>,
}

/// The upstream feed connection.
///
/// One instance per provider configuration, constructed in `main` and
/// shared by `Arc`. See the module docs for the lifecycle.
pub struct MassiveGateway {
    inner: Arc<GatewayInner>,
}

/// Shared state between the public handle and the connection task.
struct GatewayInner {
    config: MassiveConfig,
    codec: JsonCodec,
    status_tx: mpsc::Sender<StatusNotice>,
    tick_tx: mpsc::Sender<Tick>,
    state: Mutex<ConnectionState>,
    desired: Mutex<BTreeSet<Symbol>>,
    intent: AtomicBool,
    ticks_received: AtomicU64,
    reconnects: AtomicU64,
    conn: Mutex<Option<ConnHandle>>,
}

impl MassiveGateway {
    /// Create a new gateway. No connection is made until [`start`].
    ///
    /// [`start`]: Self::start
    #[must_use]
    pub fn new(
        config: MassiveConfig,
        status_tx: mpsc::Sender<StatusNotice>,
        tick_tx: mpsc::Sender<Tick>,
    ) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                config,
                codec: JsonCodec::new(),
                status_tx,
                tick_tx,
                state: Mutex::new(ConnectionState::Disconnected),
                desired: Mutex::new(BTreeSet::new()),
                intent: AtomicBool::new(false),
                ticks_received: AtomicU64::new(0),
                reconnects: AtomicU64::new(0),
                conn: Mutex::new(None),
            }),
        }
    }

    /// Begin connecting. Idempotent; a no-op when no API key is
    /// configured or a connection task is already wanted.
    pub fn start(&self) {
        if self.inner.config.api_key.is_none() {
            tracing::warn!("massive gateway disabled: no API key configured");
            return;
        }
        if self.inner.intent.swap(true, Ordering::SeqCst) {
            return;
        }

        let cancel = CancellationToken::new();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        *self.inner.conn.lock() = Some(ConnHandle {
            cancel: cancel.clone(),
            cmd_tx,
        });

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.run(cancel, cmd_rx).await;
        });
    }

    /// Stop connecting: clears the intent flag, cancels any pending
    /// reconnect sleep and forces the socket closed with a normal
    /// closure frame. In-flight sends are not awaited.
    pub fn stop(&self) {
        self.inner.intent.store(false, Ordering::SeqCst);
        if let Some(handle) = self.inner.conn.lock().take() {
            handle.cancel.cancel();
        }
    }

    /// Add a symbol to the desired set. Sent upstream immediately when
    /// authenticated; otherwise flushed on the next authentication.
    pub fn subscribe(&self, raw: &str) {
        let sym = symbol::normalize(raw);
        if sym.is_empty() {
            return;
        }

        self.inner.desired.lock().insert(sym.clone());

        if let Some(handle) = self.inner.conn.lock().as_ref() {
            // The connection task only acts on this when authenticated.
            let _ = handle.cmd_tx.send(sym);
        }
    }

    /// Remove a symbol from the desired set. The provider is never
    /// sent an unsubscribe message; its subscription outlives our
    /// interest until the next reconnect.
    pub fn unsubscribe(&self, raw: &str) {
        let sym = symbol::normalize(raw);
        self.inner.desired.lock().remove(&sym);
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Whether a credential is configured at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.config.api_key.is_some()
    }

    /// Symbols currently in the desired set.
    #[must_use]
    pub fn desired_symbols(&self) -> Vec<Symbol> {
        self.inner.desired.lock().iter().cloned().collect()
    }

    /// Total ticks emitted since process start.
    #[must_use]
    pub fn ticks_received(&self) -> u64 {
        self.inner.ticks_received.load(Ordering::Relaxed)
    }

    /// Total reconnect attempts since process start.
    #[must_use]
    pub fn reconnects(&self) -> u64 {
        self.inner.reconnects.load(Ordering::Relaxed)
    }
}

impl UpstreamControl for MassiveGateway {
    fn subscribe(&self, symbol: &str) {
        MassiveGateway::subscribe(self, symbol);
    }

    fn unsubscribe(&self, symbol: &str) {
        MassiveGateway::unsubscribe(self, symbol);
    }
}

impl GatewayInner {
    fn set_state(&self, next: ConnectionState) {
        *self.state.lock() = next;
        metrics::set_upstream_connected(next.is_connected());
    }

    async fn notify(&self, notice: StatusNotice) {
        let _ = self.status_tx.send(notice).await;
    }

    /// Connection loop: one `connect_and_run` cycle per iteration,
    /// with backoff between failed cycles while intent holds.
    async fn run(
        self: Arc<Self>,
        cancel: CancellationToken,
        mut cmd_rx: mpsc::UnboundedReceiver<Symbol>,
    ) {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if cancel.is_cancelled() || !self.intent.load(Ordering::SeqCst) {
                break;
            }

            self.set_state(ConnectionState::Connecting);

            match self.connect_and_run(&cancel, &mut cmd_rx, &mut policy).await {
                Ok(SessionEnd::Stopped) => break,
                Ok(SessionEnd::LimitReached) => {
                    self.set_state(ConnectionState::Terminated);
                    tracing::warn!("upstream limit reached; automatic reconnection disabled");
                    return;
                }
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    tracing::warn!(error = %e, "upstream connection lost");

                    if cancel.is_cancelled() || !self.intent.load(Ordering::SeqCst) {
                        break;
                    }

                    let delay = policy.next_delay();
                    self.reconnects.fetch_add(1, Ordering::Relaxed);
                    metrics::record_reconnect();
                    tracing::info!(
                        attempt = policy.attempt(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "scheduling upstream reconnect"
                    );

                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.set_state(ConnectionState::Disconnected);
    }

    /// One connection cycle: dial, authenticate, process frames until
    /// cancellation, limit, or a transport failure.
    async fn connect_and_run(
        &self,
        cancel: &CancellationToken,
        cmd_rx: &mut mpsc::UnboundedReceiver<Symbol>,
        policy: &mut ReconnectPolicy,
    ) -> Result<SessionEnd, GatewayError> {
        tracing::info!(url = %self.config.url, "connecting to upstream feed");

        let (ws_stream, _response) =
            match tokio_tungstenite::connect_async(self.config.url.as_str()).await {
                Ok(ok) => ok,
                Err(e) => {
                    self.notify(StatusNotice::Errored {
                        detail: e.to_string(),
                    })
                    .await;
                    return Err(e.into());
                }
            };

        let (mut write, mut read) = ws_stream.split();

        self.set_state(ConnectionState::Connected);
        self.notify(StatusNotice::Opened).await;

        // The provider closes unauthenticated sockets, so auth goes
        // out before anything else.
        let key = self.config.api_key.clone().unwrap_or_default();
        self.send_control(&mut write, &ControlRequest::auth(&key))
            .await?;

        let mut authed = false;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    let _ = write
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "client_stop".into(),
                        })))
                        .await;
                    return Ok(SessionEnd::Stopped);
                }
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(sym) if authed => {
                            self.send_subscriptions(&mut write, &[sym]).await?;
                        }
                        Some(_) => {} // queued; flushed on authentication
                        // Command sender gone means the handle was torn
                        // down; treat like a stop.
                        None => return Ok(SessionEnd::Stopped),
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match self.handle_payload(&text, &mut authed, policy, &mut write).await? {
                                PayloadOutcome::Continue => {}
                                PayloadOutcome::Limit => {
                                    let _ = write
                                        .send(Message::Close(Some(CloseFrame {
                                            code: CloseCode::Library(LIMIT_CLOSE_CODE),
                                            reason: "limit".into(),
                                        })))
                                        .await;
                                    return Ok(SessionEnd::LimitReached);
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (Some(u16::from(f.code)), f.reason.to_string()))
                                .unwrap_or((None, String::new()));
                            self.notify(StatusNotice::Closed { code, reason }).await;
                            return Err(GatewayError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {} // binary/pong frames are not part of the protocol
                        Some(Err(e)) => {
                            self.notify(StatusNotice::Errored {
                                detail: e.to_string(),
                            })
                            .await;
                            return Err(e.into());
                        }
                        None => {
                            self.notify(StatusNotice::Closed {
                                code: None,
                                reason: String::new(),
                            })
                            .await;
                            return Err(GatewayError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }

    /// Decode one inbound payload and dispatch its records.
    async fn handle_payload<W>(
        &self,
        text: &str,
        authed: &mut bool,
        policy: &mut ReconnectPolicy,
        write: &mut W,
    ) -> Result<PayloadOutcome, GatewayError>
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        let records = match self.codec.decode(text) {
            Ok(records) => records,
            Err(e) => {
                metrics::record_payload_dropped();
                tracing::trace!(error = %e, "dropping undecodable payload");
                return Ok(PayloadOutcome::Continue);
            }
        };

        for record in records {
            match record {
                MassiveRecord::Status(status) => {
                    if status.is_auth_success() {
                        *authed = true;
                        policy.reset();
                        self.set_state(ConnectionState::Authenticated);
                        self.notify(StatusNotice::Authenticated).await;

                        let pending: Vec<Symbol> = self.desired.lock().iter().cloned().collect();
                        self.send_subscriptions(write, &pending).await?;
                    } else if status.is_limit() {
                        self.intent.store(false, Ordering::SeqCst);
                        self.notify(StatusNotice::LimitReached {
                            detail: status.detail(),
                        })
                        .await;
                        return Ok(PayloadOutcome::Limit);
                    } else {
                        self.notify(StatusNotice::Info {
                            detail: status.detail(),
                        })
                        .await;
                    }
                }
                MassiveRecord::Aggregate(agg) if self.config.mode.includes_aggregate() => {
                    self.emit_tick(agg.into_tick()).await;
                }
                MassiveRecord::Trade(trade) if self.config.mode.includes_trade() => {
                    self.emit_tick(trade.into_tick()).await;
                }
                _ => {} // data record outside the configured mode
            }
        }

        Ok(PayloadOutcome::Continue)
    }

    /// Forward a normalized tick, or account for a dropped record.
    async fn emit_tick(&self, tick: Option<Tick>) {
        match tick {
            Some(tick) => {
                self.ticks_received.fetch_add(1, Ordering::Relaxed);
                metrics::record_tick_received(tick.kind);
                if self.tick_tx.send(tick).await.is_err() {
                    tracing::debug!("tick channel closed; dropping tick");
                }
            }
            None => {
                metrics::record_tick_dropped();
                tracing::trace!("dropping data record with invalid symbol or price");
            }
        }
    }

    /// Send subscribe control messages for `symbols`, one per enabled
    /// stream kind.
    async fn send_subscriptions<W>(
        &self,
        write: &mut W,
        symbols: &[Symbol],
    ) -> Result<(), GatewayError>
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        if symbols.is_empty() {
            return Ok(());
        }

        if self.config.mode.includes_aggregate() {
            let params: Vec<String> = symbols.iter().map(|s| format!("AM.{s}")).collect();
            let params = params.join(",");
            tracing::debug!(params = %params, "subscribing to aggregates");
            self.send_control(write, &ControlRequest::subscribe(params))
                .await?;
        }

        if self.config.mode.includes_trade() {
            let params: Vec<String> = symbols.iter().map(|s| format!("T.{s}")).collect();
            let params = params.join(",");
            tracing::debug!(params = %params, "subscribing to trades");
            self.send_control(write, &ControlRequest::subscribe(params))
                .await?;
        }

        Ok(())
    }

    /// Serialize and send one control message.
    async fn send_control<W>(
        &self,
        write: &mut W,
        request: &ControlRequest,
    ) -> Result<(), GatewayError>
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        let json = serde_json::to_string(request).map_err(|e| GatewayError::Send(e.to_string()))?;

        write
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| GatewayError::Send(e.to_string()))
    }
}
