// Integration tests: HTTP and WebSocket endpoints

mod common;

use axum_test::{TestServer, TestWebSocket, WsMessage};
use common::*;
use netwatch::broadcaster::Broadcaster;
use netwatch::config::AppConfig;
use netwatch::routes;
use std::sync::Arc;
use tokio::time::{Duration, Instant};

const TEST_CONFIG: &str = r#"
[server]
port = 8081
host = "127.0.0.1"
cors_origins = ["http://localhost:3000"]

[monitoring]
tick_interval_ms = 100
history_length = 5

[publishing]
subscriber_buffer = 8
"#;

/// Engine ticked twice with one live connection (pid 42, 500 B/s each way).
fn ticked_harness() -> Harness {
    let mut h = Harness::new(5);
    let conn = tcp("10.0.0.2:50000", Some("1.1.1.1:443"), 42);
    h.tick_with(
        START,
        Ok(counters(START, 1000, 2000)),
        Ok(processes(START, &[(42, 2000, 1000)])),
        Ok(vec![conn.clone()]),
    );
    h.tick_with(
        START + 1.0,
        Ok(counters(START + 1.0, 1500, 2500)),
        Ok(processes(START + 1.0, &[(42, 2500, 1500)])),
        Ok(vec![conn]),
    );
    h
}

fn test_app(h: &Harness) -> (axum::Router, Arc<Broadcaster>) {
    let config = AppConfig::load_from_str(TEST_CONFIG).unwrap();
    let broadcaster = Arc::new(Broadcaster::new(config.publishing.subscriber_buffer));
    let app = routes::app(h.engine.reader(), broadcaster.clone(), &config);
    (app, broadcaster)
}

/// Build TestServer with http_transport (required for WebSocket tests).
fn test_server_with_http(h: &Harness) -> (TestServer, Arc<Broadcaster>) {
    let (app, broadcaster) = test_app(h);
    let server = TestServer::builder().http_transport().build(app);
    (server, broadcaster)
}

#[tokio::test]
async fn test_root_endpoint() {
    let h = Harness::new(5);
    let server = TestServer::new(test_app(&h).0);
    let response = server.get("/").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["name"], "netwatch");
    assert_eq!(json["status"], "running");
}

#[tokio::test]
async fn test_version_endpoint() {
    let h = Harness::new(5);
    let server = TestServer::new(test_app(&h).0);
    let response = server.get("/version").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json.get("name").and_then(|v| v.as_str()), Some("netwatch"));
    assert!(json.get("version").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn test_health_endpoint() {
    let h = ticked_harness();
    h.clock.set(START + 10.0);
    let server = TestServer::new(test_app(&h).0);
    let json: serde_json::Value = server.get("/health").await.json();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["active_connections"], 0);
    assert_eq!(json["uptime"], 10.0);
}

#[tokio::test]
async fn test_connections_endpoint() {
    let h = ticked_harness();
    let server = TestServer::new(test_app(&h).0);
    let response = server.get("/api/connections").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["count"], 1);
    let conn = &json["connections"][0];
    assert_eq!(conn["id"], "TCP_10.0.0.2:50000_1.1.1.1:443_42");
    assert_eq!(conn["protocol"], "TCP");
    assert_eq!(conn["process_name"], "proc42");
    assert_eq!(conn["upload_speed"], 500.0);
    assert_eq!(conn["download_speed"], 500.0);
}

#[tokio::test]
async fn test_stats_endpoint() {
    let h = ticked_harness();
    let server = TestServer::new(test_app(&h).0);
    let json: serde_json::Value = server.get("/api/stats").await.json();
    assert_eq!(json["active_connections"], 1);
    assert_eq!(json["total_upload_speed"], 500.0);
    assert_eq!(json["total_download_speed"], 500.0);
    assert_eq!(json["total_bytes_sent"], 1500);
    assert_eq!(json["total_bytes_received"], 2500);
}

#[tokio::test]
async fn test_bandwidth_history_endpoint() {
    let h = ticked_harness();
    let server = TestServer::new(test_app(&h).0);
    let json: serde_json::Value = server.get("/api/bandwidth-history").await.json();
    assert_eq!(json["count"], 1);
    assert_eq!(json["history"][0]["timestamp"], START + 1.0);
    assert_eq!(json["history"][0]["upload"], 500.0);
    assert_eq!(json["history"][0]["download"], 500.0);
}

#[tokio::test]
async fn test_endpoints_before_first_tick_are_empty() {
    let h = Harness::new(5);
    let server = TestServer::new(test_app(&h).0);
    let connections: serde_json::Value = server.get("/api/connections").await.json();
    assert_eq!(connections["count"], 0);
    let history: serde_json::Value = server.get("/api/bandwidth-history").await.json();
    assert_eq!(history["count"], 0);
    let stats: serde_json::Value = server.get("/api/stats").await.json();
    assert_eq!(stats["active_connections"], 0);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let h = Harness::new(5);
    let server = TestServer::new(test_app(&h).0);
    server.get("/api/nope").expect_failure().await.assert_status_not_found();
}

// --- WebSocket message tests (require http_transport + ws feature) ---

/// Next JSON text frame, skipping keep-alive pings.
async fn receive_json_frame(ws: &mut TestWebSocket) -> serde_json::Value {
    loop {
        match ws.receive_message().await {
            WsMessage::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

async fn wait_for_subscribers(broadcaster: &Broadcaster, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while broadcaster.subscriber_count() != expected {
        assert!(
            Instant::now() < deadline,
            "subscriber count stuck at {}",
            broadcaster.subscriber_count()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_ws_receives_initial_snapshot() {
    let h = ticked_harness();
    let (server, _broadcaster) = test_server_with_http(&h);
    let mut ws = server.get_websocket("/ws").await.into_websocket().await;

    let initial: serde_json::Value = ws.receive_json().await;
    assert_eq!(initial["type"], "initial");
    assert_eq!(initial["data"]["stats"]["active_connections"], 1);
    assert_eq!(
        initial["data"]["connections"][0]["id"],
        "TCP_10.0.0.2:50000_1.1.1.1:443_42"
    );
}

#[tokio::test]
async fn test_ws_ping_gets_pong() {
    let h = Harness::new(5);
    let (server, _broadcaster) = test_server_with_http(&h);
    let mut ws = server.get_websocket("/ws").await.into_websocket().await;
    let _initial: serde_json::Value = ws.receive_json().await;

    ws.send_text(r#"{"type":"ping"}"#).await;
    let pong: serde_json::Value = ws.receive_json().await;
    assert_eq!(pong, serde_json::json!({"type": "pong"}));
}

#[tokio::test]
async fn test_ws_ignores_malformed_messages() {
    let h = Harness::new(5);
    let (server, _broadcaster) = test_server_with_http(&h);
    let mut ws = server.get_websocket("/ws").await.into_websocket().await;
    let _initial: serde_json::Value = ws.receive_json().await;

    ws.send_text("not json").await;
    ws.send_text(r#"{"type":"subscribe"}"#).await;
    ws.send_text(r#"{"type":"ping"}"#).await;
    let pong: serde_json::Value = ws.receive_json().await;
    assert_eq!(pong["type"], "pong");
}

#[tokio::test]
async fn test_ws_receives_published_update() {
    let mut h = ticked_harness();
    let (server, broadcaster) = test_server_with_http(&h);
    let mut ws = server.get_websocket("/ws").await.into_websocket().await;
    let _initial: serde_json::Value = ws.receive_json().await;

    // Connection gone on the next tick.
    let outcome = h.tick_connections(START + 2.0, vec![]);
    broadcaster.publish(outcome.snapshot().unwrap());

    let update: serde_json::Value = ws.receive_json().await;
    assert_eq!(update["type"], "update");
    assert_eq!(update["data"]["stats"]["active_connections"], 0);
    assert_eq!(update["data"]["connections"], serde_json::json!([]));
}

#[tokio::test]
async fn test_ws_subscriber_counted_in_health() {
    let h = Harness::new(5);
    let (server, broadcaster) = test_server_with_http(&h);
    let mut ws = server.get_websocket("/ws").await.into_websocket().await;
    let _initial: serde_json::Value = ws.receive_json().await;
    assert_eq!(broadcaster.subscriber_count(), 1);

    let json: serde_json::Value = server.get("/health").await.json();
    assert_eq!(json["active_connections"], 1);
}

#[tokio::test]
async fn test_ws_close_all_sends_close_frame() {
    let h = Harness::new(5);
    let (server, broadcaster) = test_server_with_http(&h);
    let mut ws = server.get_websocket("/ws").await.into_websocket().await;
    let _initial: serde_json::Value = ws.receive_json().await;

    broadcaster.close_all();
    assert!(matches!(ws.receive_message().await, WsMessage::Close(_)));
}

#[tokio::test]
async fn test_ws_client_disconnect_leaves_live_set() {
    let h = Harness::new(5);
    let (server, broadcaster) = test_server_with_http(&h);
    let mut ws = server.get_websocket("/ws").await.into_websocket().await;
    let _initial: serde_json::Value = ws.receive_json().await;
    assert_eq!(broadcaster.subscriber_count(), 1);

    ws.close().await;
    wait_for_subscribers(&broadcaster, 0).await;

    let json: serde_json::Value = server.get("/health").await.json();
    assert_eq!(json["active_connections"], 0);
}

#[tokio::test(start_paused = true)]
async fn test_ws_sends_keepalive_ping() {
    let h = Harness::new(5);
    let (server, _broadcaster) = test_server_with_http(&h);
    let mut ws = server.get_websocket("/ws").await.into_websocket().await;
    let _initial = receive_json_frame(&mut ws).await;

    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(matches!(ws.receive_message().await, WsMessage::Ping(_)));
}

#[tokio::test(start_paused = true)]
async fn test_ws_idle_client_stays_connected() {
    let h = Harness::new(5);
    let (server, broadcaster) = test_server_with_http(&h);
    let mut ws = server.get_websocket("/ws").await.into_websocket().await;
    let _initial = receive_json_frame(&mut ws).await;

    // Two full receive timeouts with nothing from the client.
    tokio::time::advance(Duration::from_secs(61)).await;
    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(broadcaster.subscriber_count(), 1);

    ws.send_text(r#"{"type":"ping"}"#).await;
    let pong = receive_json_frame(&mut ws).await;
    assert_eq!(pong["type"], "pong");
}
