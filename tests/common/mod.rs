//! Shared test harness: an in-process mock Massive feed and a fully
//! wired gateway + hub + HTTP server on ephemeral ports.

#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use massive_stream_gateway::{
    MassiveConfig, MassiveGateway, PriceHub, ReconnectConfig, ServerState, StatusNotice, TickMode,
    UpstreamControl, router,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, accept_async, connect_async};
use tokio_util::sync::CancellationToken;

/// Give-up timeout for harness waits.
pub const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Mock Provider
// =============================================================================

#[derive(Default)]
struct ProviderState {
    subscribes: StdMutex<Vec<String>>,
    pusher: StdMutex<Option<mpsc::UnboundedSender<String>>>,
    kick: StdMutex<Option<CancellationToken>>,
    connections: AtomicUsize,
}

/// An in-process Massive feed: accepts one gateway connection at a
/// time, acknowledges auth, records subscribe params, and lets tests
/// push arbitrary payloads or drop the connection.
pub struct MockProvider {
    addr: SocketAddr,
    state: Arc<ProviderState>,
}

impl MockProvider {
    /// Bind an ephemeral port and start accepting.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ProviderState::default());

        let accept_state = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                accept_state.connections.fetch_add(1, Ordering::SeqCst);
                serve_connection(stream, Arc::clone(&accept_state)).await;
            }
        });

        Self { addr, state }
    }

    /// Feed URL for the gateway configuration.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Subscribe params recorded so far.
    pub fn subscribes(&self) -> Vec<String> {
        self.state.subscribes.lock().unwrap().clone()
    }

    /// Push a raw payload to the currently connected gateway.
    pub fn push(&self, payload: &str) {
        let pusher = self.state.pusher.lock().unwrap();
        pusher
            .as_ref()
            .expect("no gateway connection to push to")
            .send(payload.to_string())
            .unwrap();
    }

    /// Drop the current gateway connection with a close frame.
    pub fn kick(&self) {
        if let Some(kick) = self.state.kick.lock().unwrap().as_ref() {
            kick.cancel();
        }
    }
}

async fn serve_connection(stream: TcpStream, state: Arc<ProviderState>) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    let (mut write, mut read) = ws.split();

    let (push_tx, mut push_rx) = mpsc::unbounded_channel::<String>();
    let kick = CancellationToken::new();
    *state.pusher.lock().unwrap() = Some(push_tx);
    *state.kick.lock().unwrap() = Some(kick.clone());

    let _ = write
        .send(Message::Text(
            r#"[{"ev":"status","status":"connected"}]"#.into(),
        ))
        .await;

    loop {
        tokio::select! {
            () = kick.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return;
            }
            payload = push_rx.recv() => match payload {
                Some(payload) => {
                    if write.send(Message::Text(payload.into())).await.is_err() {
                        return;
                    }
                }
                None => return,
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else {
                        continue;
                    };
                    match value.get("action").and_then(serde_json::Value::as_str) {
                        Some("auth") => {
                            let _ = write
                                .send(Message::Text(
                                    r#"[{"ev":"status","status":"auth_success"}]"#.into(),
                                ))
                                .await;
                        }
                        Some("subscribe") => {
                            if let Some(params) =
                                value.get("params").and_then(serde_json::Value::as_str)
                            {
                                state.subscribes.lock().unwrap().push(params.to_string());
                            }
                        }
                        _ => {}
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
        }
    }
}

// =============================================================================
// Wired Application
// =============================================================================

/// A fully wired gateway + hub + HTTP server for one test.
pub struct TestApp {
    pub gateway: Arc<MassiveGateway>,
    pub hub: Arc<PriceHub>,
    pub status_rx: mpsc::Receiver<StatusNotice>,
    pub http_addr: SocketAddr,
    pub cancel: CancellationToken,
}

impl TestApp {
    /// Wire the service against `provider_url` with a fast backoff so
    /// reconnect tests stay quick.
    pub async fn spawn(provider_url: &str, mode: TickMode, initial_backoff: Duration) -> Self {
        let (status_tx, status_rx) = mpsc::channel(256);
        let (tick_tx, tick_rx) = mpsc::channel(256);

        let mut config = MassiveConfig::new(provider_url, Some("test-key".to_string()), mode);
        config.reconnect = ReconnectConfig {
            initial_delay: initial_backoff,
            max_delay: Duration::from_secs(1),
        };

        let gateway = Arc::new(MassiveGateway::new(config, status_tx, tick_tx));
        let hub = Arc::new(PriceHub::new(
            Arc::clone(&gateway) as Arc<dyn UpstreamControl>
        ));

        let cancel = CancellationToken::new();
        tokio::spawn(Arc::clone(&hub).run(tick_rx, cancel.clone()));

        let state = Arc::new(ServerState::new(
            "test".to_string(),
            Arc::clone(&hub),
            Arc::clone(&gateway),
        ));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let http_addr = listener.local_addr().unwrap();
        let http_cancel = cancel.clone();
        tokio::spawn(async move {
            axum::serve(listener, router(state))
                .with_graceful_shutdown(http_cancel.cancelled_owned())
                .await
                .unwrap();
        });

        Self {
            gateway,
            hub,
            status_rx,
            http_addr,
            cancel,
        }
    }

    /// Connect a downstream price stream client.
    pub async fn connect_client(&self, symbol: &str) -> DownstreamClient {
        let url = format!("ws://{}/ws/prices?symbol={symbol}", self.http_addr);
        let (ws, _response) = timeout(WAIT, connect_async(url)).await.unwrap().unwrap();
        DownstreamClient { ws }
    }

    /// Wait for a status notice matching `pred`.
    pub async fn wait_for_notice(
        &mut self,
        pred: impl Fn(&StatusNotice) -> bool,
    ) -> StatusNotice {
        timeout(WAIT, async {
            loop {
                let notice = self.status_rx.recv().await.expect("status channel closed");
                if pred(&notice) {
                    return notice;
                }
            }
        })
        .await
        .expect("timed out waiting for status notice")
    }
}

/// One downstream WebSocket client.
pub struct DownstreamClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl DownstreamClient {
    /// Next text frame, parsed as JSON.
    pub async fn recv_json(&mut self) -> serde_json::Value {
        let text = timeout(WAIT, async {
            loop {
                match self.ws.next().await.expect("stream ended") {
                    Ok(Message::Text(text)) => return text.to_string(),
                    Ok(_) => {}
                    Err(e) => panic!("client websocket error: {e}"),
                }
            }
        })
        .await
        .expect("timed out waiting for frame");

        serde_json::from_str(&text).unwrap()
    }

    /// Assert no text frame arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        let got = timeout(window, async {
            loop {
                match self.ws.next().await {
                    Some(Ok(Message::Text(text))) => return text.to_string(),
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => std::future::pending::<()>().await,
                }
            }
        })
        .await;

        assert!(got.is_err(), "expected silence, got frame: {got:?}");
    }

    /// Close the connection.
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Poll `pred` until it holds or the timeout elapses.
pub async fn wait_until(pred: impl Fn() -> bool) {
    timeout(WAIT, async {
        loop {
            if pred() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for condition");
}
