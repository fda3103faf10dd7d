//! End-to-end tests of the websocket connection protocol against a real
//! server started through `ServerSupervisor`.

#![allow(clippy::panic)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use nadi_websocket_node::config::NodeConfig;
use nadi_websocket_node::domain::{RangeQuery, Sample};
use nadi_websocket_node::service::{Downsampler, InMemorySeries, QueryError, ServerSupervisor};
use nadi_websocket_node::ws::messages::GREETING;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const QUERY: &str =
    r#"{"command":"get_downsampled_in_range","tmin":0,"tmax":999,"desired_number_of_samples":10}"#;

fn loopback_config() -> NodeConfig {
    NodeConfig {
        bind_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        worker_threads: 2,
        ..NodeConfig::default()
    }
}

fn supervisor() -> ServerSupervisor {
    let series = InMemorySeries::from_samples((0..1_000).map(|t| Sample::new(t, 1.0)).collect());
    ServerSupervisor::new(loopback_config(), Arc::new(series))
}

/// Engine that never finishes on its own; it only returns once its
/// connection's token is cancelled.
#[derive(Debug, Default)]
struct StalledEngine {
    started: AtomicBool,
    saw_cancel: AtomicBool,
}

impl Downsampler for StalledEngine {
    fn downsample(
        &self,
        _query: &RangeQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<Sample>, QueryError> {
        self.started.store(true, Ordering::SeqCst);
        for _ in 0..1_000 {
            if cancel.is_cancelled() {
                self.saw_cancel.store(true, Ordering::SeqCst);
                return Err(QueryError::Cancelled);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        Ok(Vec::new())
    }
}

async fn wait_for_flag(flag: &AtomicBool) -> bool {
    for _ in 0..250 {
        if flag.load(Ordering::SeqCst) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Waits for the server's close frame, skipping keep-alives.
async fn closed_by_server(ws: &mut Ws) -> bool {
    loop {
        match timeout(Duration::from_secs(5), ws.next()).await {
            Ok(Some(Ok(Message::Close(_)))) => return true,
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
            _ => return false,
        }
    }
}

async fn start(supervisor: &ServerSupervisor) -> SocketAddr {
    if supervisor.start(0).is_err() {
        panic!("start failed");
    }
    let Some(addr) = supervisor.wait_until_listening(Duration::from_secs(5)).await else {
        panic!("server never listened");
    };
    addr
}

async fn connect(addr: SocketAddr) -> Ws {
    let Ok((ws, _)) = connect_async(format!("ws://{addr}/ws")).await else {
        panic!("websocket connect failed");
    };
    ws
}

/// Next text frame, or `None` on close, error, or `wait` elapsing.
async fn next_text(ws: &mut Ws, wait: Duration) -> Option<String> {
    loop {
        match timeout(wait, ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return Some(text.as_str().to_string()),
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
            _ => return None,
        }
    }
}

async fn wait_for_len(supervisor: &ServerSupervisor, expected: usize) -> bool {
    for _ in 0..100 {
        if supervisor.connection_count() == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn open_registers_and_greets() {
    let supervisor = supervisor();
    let addr = start(&supervisor).await;

    let mut ws = connect(addr).await;
    let greeting = next_text(&mut ws, Duration::from_secs(5)).await;
    assert_eq!(greeting.as_deref(), Some(GREETING));
    assert_eq!(supervisor.connection_count(), 1);

    let _ = ws.close(None).await;
    assert!(wait_for_len(&supervisor, 0).await);
    assert!(supervisor.stop());
}

#[tokio::test]
async fn returning_client_gets_fresh_connection() {
    let supervisor = supervisor();
    let addr = start(&supervisor).await;

    let mut first = connect(addr).await;
    let _ = next_text(&mut first, Duration::from_secs(5)).await;
    let Some(first_conn) = supervisor.registry().snapshot().first().map(|c| c.id()) else {
        panic!("first connection not registered");
    };
    let _ = first.close(None).await;
    assert!(wait_for_len(&supervisor, 0).await);

    let mut second = connect(addr).await;
    let _ = next_text(&mut second, Duration::from_secs(5)).await;
    assert_eq!(supervisor.connection_count(), 1);
    assert!(!supervisor.registry().contains(first_conn));
    assert!(supervisor.stop());
}

#[tokio::test]
async fn range_query_is_answered() {
    let supervisor = supervisor();
    let addr = start(&supervisor).await;
    let mut ws = connect(addr).await;
    let _ = next_text(&mut ws, Duration::from_secs(5)).await;

    assert!(ws.send(Message::text(QUERY.to_string())).await.is_ok());
    let Some(reply) = next_text(&mut ws, Duration::from_secs(5)).await else {
        panic!("no query reply");
    };
    let json: serde_json::Value = serde_json::from_str(&reply).unwrap_or_default();
    assert_eq!(json["command"], "get_downsampled_in_range");
    assert_eq!(json["samples"].as_array().map(Vec::len), Some(10));
    assert!(supervisor.stop());
}

#[tokio::test]
async fn binary_frames_are_accepted() {
    let supervisor = supervisor();
    let addr = start(&supervisor).await;
    let mut ws = connect(addr).await;
    let _ = next_text(&mut ws, Duration::from_secs(5)).await;

    assert!(ws.send(Message::binary(QUERY.as_bytes().to_vec())).await.is_ok());
    let reply = next_text(&mut ws, Duration::from_secs(5)).await;
    assert!(reply.is_some_and(|r| r.contains("samples")));
    assert!(supervisor.stop());
}

#[tokio::test]
async fn malformed_and_incomplete_messages_are_ignored() {
    let supervisor = supervisor();
    let addr = start(&supervisor).await;
    let mut ws = connect(addr).await;
    let _ = next_text(&mut ws, Duration::from_secs(5)).await;

    for junk in [
        "{not json",
        r#"{"uuid":"0d5c6a3e"}"#,
        r#"{"command":"get_downsampled_in_range","tmin":0,"desired_number_of_samples":10}"#,
    ] {
        assert!(ws.send(Message::text(junk.to_string())).await.is_ok());
    }
    assert_eq!(next_text(&mut ws, Duration::from_millis(300)).await, None);
    assert_eq!(supervisor.connection_count(), 1);

    // Still open: a valid query on the same connection is served.
    assert!(ws.send(Message::text(QUERY.to_string())).await.is_ok());
    assert!(next_text(&mut ws, Duration::from_secs(5)).await.is_some());
    assert!(supervisor.stop());
}

#[tokio::test]
async fn broadcast_reaches_all_clients() {
    let supervisor = supervisor();
    let addr = start(&supervisor).await;

    let mut clients = Vec::new();
    for _ in 0..3 {
        let mut ws = connect(addr).await;
        let _ = next_text(&mut ws, Duration::from_secs(5)).await;
        clients.push(ws);
    }
    assert!(wait_for_len(&supervisor, 3).await);

    assert_eq!(supervisor.registry().broadcast("measurement started"), 3);
    for ws in &mut clients {
        let frame = next_text(ws, Duration::from_secs(5)).await;
        assert_eq!(frame.as_deref(), Some("measurement started"));
    }
    assert!(supervisor.stop());
}

#[tokio::test]
async fn stop_closes_every_connection() {
    let supervisor = supervisor();
    let addr = start(&supervisor).await;
    let mut ws = connect(addr).await;
    let _ = next_text(&mut ws, Duration::from_secs(5)).await;

    assert!(supervisor.stop());
    assert_eq!(supervisor.connection_count(), 0);
    assert!(closed_by_server(&mut ws).await);
    assert!(connect_async(format!("ws://{addr}/ws")).await.is_err());
}

#[tokio::test]
async fn stop_sends_close_frame_every_time() {
    for _ in 0..10 {
        let supervisor = supervisor();
        let addr = start(&supervisor).await;
        let mut ws = connect(addr).await;
        let _ = next_text(&mut ws, Duration::from_secs(5)).await;

        assert!(supervisor.stop());
        assert!(closed_by_server(&mut ws).await);
    }
}

#[tokio::test]
async fn closing_client_cancels_running_query() {
    let engine = Arc::new(StalledEngine::default());
    let downsampler: Arc<dyn Downsampler> = Arc::<StalledEngine>::clone(&engine);
    let supervisor = ServerSupervisor::new(loopback_config(), downsampler);
    let addr = start(&supervisor).await;
    let mut ws = connect(addr).await;
    let _ = next_text(&mut ws, Duration::from_secs(5)).await;

    assert!(ws.send(Message::text(QUERY.to_string())).await.is_ok());
    assert!(wait_for_flag(&engine.started).await);

    let _ = ws.close(None).await;
    assert!(wait_for_flag(&engine.saw_cancel).await);
    assert!(wait_for_len(&supervisor, 0).await);
    // Only the close handshake follows; the cancelled query sends nothing.
    assert_eq!(next_text(&mut ws, Duration::from_millis(300)).await, None);
    assert!(supervisor.stop());
}

#[tokio::test]
async fn cors_probe_returns_no_content() {
    let supervisor = supervisor();
    let addr = start(&supervisor).await;

    let response = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, format!("http://{addr}/cors"))
        .header("Origin", "http://example.com")
        .send()
        .await;
    let Ok(response) = response else {
        panic!("cors request failed");
    };
    assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
    assert!(supervisor.stop());
}
