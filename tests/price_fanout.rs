//! Price Fan-Out Integration Tests
//!
//! Drives the full path over real sockets: mock feed → gateway →
//! hub → downstream WebSocket clients.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::time::Duration;

use common::{MockProvider, TestApp, wait_until};
use massive_stream_gateway::{StatusNotice, TickMode};

#[tokio::test]
async fn end_to_end_single_client_receives_matching_tick() {
    let provider = MockProvider::start().await;
    let mut app = TestApp::spawn(&provider.url(), TickMode::Aggregate, Duration::from_millis(1000))
        .await;

    // Client binds before the feed is even started; its subscription
    // is queued and flushed on authentication.
    let mut client = app.connect_client("X:BTCUSD").await;

    let welcome = client.recv_json().await;
    assert_eq!(welcome["type"], "welcome");
    assert_eq!(welcome["symbol"], "X:BTCUSD");

    app.gateway.start();
    app.wait_for_notice(|n| matches!(n, StatusNotice::Authenticated))
        .await;

    wait_until(|| provider.subscribes().iter().any(|p| p.contains("AM.X:BTCUSD"))).await;

    provider.push(r#"[{"ev":"AM","sym":"X:BTCUSD","c":67000.5,"s":1700000000000}]"#);

    let frame = client.recv_json().await;
    assert_eq!(frame["type"], "price");
    assert_eq!(frame["symbol"], "X:BTCUSD");
    assert_eq!(frame["price"], 67000.5);
    assert_eq!(frame["ts"], 1_700_000_000_000_i64);
    assert_eq!(frame["source"], "aggregate");

    app.cancel.cancel();
}

#[tokio::test]
async fn ticks_reach_only_clients_bound_to_the_symbol() {
    let provider = MockProvider::start().await;
    let mut app = TestApp::spawn(&provider.url(), TickMode::Aggregate, Duration::from_millis(1000))
        .await;

    let mut btc_client = app.connect_client("X:BTCUSD").await;
    let mut aapl_client = app.connect_client("AAPL").await;
    btc_client.recv_json().await; // welcome
    aapl_client.recv_json().await; // welcome

    app.gateway.start();
    app.wait_for_notice(|n| matches!(n, StatusNotice::Authenticated))
        .await;
    wait_until(|| !provider.subscribes().is_empty()).await;

    provider.push(r#"[{"ev":"AM","sym":"X:BTCUSD","c":67000.5,"s":1700000000000}]"#);

    let frame = btc_client.recv_json().await;
    assert_eq!(frame["symbol"], "X:BTCUSD");

    aapl_client.expect_silence(Duration::from_millis(300)).await;

    app.cancel.cancel();
}

#[tokio::test]
async fn shared_symbol_causes_exactly_one_upstream_subscribe() {
    let provider = MockProvider::start().await;
    let mut app = TestApp::spawn(&provider.url(), TickMode::Aggregate, Duration::from_millis(1000))
        .await;

    let mut first = app.connect_client("X:ETHUSD").await;
    let mut second = app.connect_client("X:ETHUSD").await;
    first.recv_json().await; // welcome
    second.recv_json().await; // welcome
    assert_eq!(app.hub.client_count(), 2);

    app.gateway.start();
    app.wait_for_notice(|n| matches!(n, StatusNotice::Authenticated))
        .await;
    wait_until(|| !provider.subscribes().is_empty()).await;

    // Give any (wrong) second subscribe a chance to arrive.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let subscribes = provider.subscribes();
    let mentions = subscribes
        .iter()
        .filter(|p| p.contains("AM.X:ETHUSD"))
        .count();
    assert_eq!(mentions, 1, "expected one subscribe, got {subscribes:?}");

    // Both clients still receive the fan-out.
    provider.push(r#"[{"ev":"AM","sym":"X:ETHUSD","c":3500.25,"s":1700000000000}]"#);
    assert_eq!(first.recv_json().await["price"], 3500.25);
    assert_eq!(second.recv_json().await["price"], 3500.25);

    app.cancel.cancel();
}

#[tokio::test]
async fn invalid_prices_are_dropped_before_broadcast() {
    let provider = MockProvider::start().await;
    let mut app = TestApp::spawn(&provider.url(), TickMode::Aggregate, Duration::from_millis(1000))
        .await;

    let mut client = app.connect_client("AAPL").await;
    client.recv_json().await; // welcome

    app.gateway.start();
    app.wait_for_notice(|n| matches!(n, StatusNotice::Authenticated))
        .await;
    wait_until(|| !provider.subscribes().is_empty()).await;

    // Zero and negative close prices must not produce frames; the
    // valid record after them must.
    provider.push(
        r#"[
            {"ev":"AM","sym":"AAPL","c":0,"s":1700000000000},
            {"ev":"AM","sym":"AAPL","c":-12.5,"s":1700000000001},
            {"ev":"AM","sym":"AAPL","c":187.5,"s":1700000000002}
        ]"#,
    );

    let frame = client.recv_json().await;
    assert_eq!(frame["price"], 187.5);
    assert_eq!(frame["ts"], 1_700_000_000_002_i64);

    app.cancel.cancel();
}

#[tokio::test]
async fn malformed_payloads_do_not_disturb_the_stream() {
    let provider = MockProvider::start().await;
    let mut app = TestApp::spawn(&provider.url(), TickMode::Aggregate, Duration::from_millis(1000))
        .await;

    let mut client = app.connect_client("MSFT").await;
    client.recv_json().await; // welcome

    app.gateway.start();
    app.wait_for_notice(|n| matches!(n, StatusNotice::Authenticated))
        .await;
    wait_until(|| !provider.subscribes().is_empty()).await;

    provider.push("this is not json");
    provider.push(r#"{"ev":"AM","sym":"MSFT","c":402.0,"s":1700000000000}"#);

    // The lone-object payload still decodes; the garbage before it is
    // swallowed without killing the connection.
    let frame = client.recv_json().await;
    assert_eq!(frame["price"], 402.0);

    app.cancel.cancel();
}

#[tokio::test]
async fn departed_client_frees_interest_without_upstream_traffic() {
    let provider = MockProvider::start().await;
    let mut app = TestApp::spawn(&provider.url(), TickMode::Aggregate, Duration::from_millis(1000))
        .await;

    app.gateway.start();
    app.wait_for_notice(|n| matches!(n, StatusNotice::Authenticated))
        .await;

    let mut client = app.connect_client("NVDA").await;
    client.recv_json().await; // welcome
    wait_until(|| provider.subscribes().iter().any(|p| p.contains("AM.NVDA"))).await;
    let baseline = provider.subscribes().len();

    client.close().await;
    wait_until(|| app.hub.client_count() == 0).await;
    wait_until(|| app.hub.stats().symbols == 0).await;

    // The registry entry is gone but nothing further went upstream.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(provider.subscribes().len(), baseline);

    app.cancel.cancel();
}
