// WebSocket push channel: initial snapshot, one update per tick, ping/pong keep-alive.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use tokio::time::{Duration, Instant, interval_at, timeout};

use super::AppState;
use crate::broadcaster::{Broadcaster, ServerMessage};
use crate::monitor::MonitorReader;

pub(super) const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
pub(super) const WS_SEND_TIMEOUT: Duration = Duration::from_secs(10);
/// Receive wait; on expiry the server simply keeps waiting.
pub(super) const WS_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct ClientMessage {
    #[serde(rename = "type")]
    kind: String,
}

pub(super) async fn ws_updates(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let reader = state.reader.clone();
    let broadcaster = state.broadcaster.clone();
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = stream_updates(socket, reader, broadcaster).await {
            tracing::info!("Update stream error: {}", e);
        }
    })
}

/// False when the client is gone or too slow.
async fn send(socket: &mut WebSocket, message: Message) -> bool {
    matches!(timeout(WS_SEND_TIMEOUT, socket.send(message)).await, Ok(Ok(())))
}

async fn stream_updates(
    mut socket: WebSocket,
    reader: MonitorReader,
    broadcaster: Arc<Broadcaster>,
) -> anyhow::Result<()> {
    let mut subscription = broadcaster.subscribe(|| reader.snapshot())?;
    let subscriber = subscription.id().as_u64();
    tracing::info!(subscriber, "Client connected to update stream");

    let mut ping_interval = interval_at(Instant::now() + WS_PING_INTERVAL, WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            frame = subscription.recv() => {
                let Some(frame) = frame else {
                    // Dropped by the broadcaster (slow queue or shutdown).
                    let _ = timeout(WS_SEND_TIMEOUT, socket.send(Message::Close(None))).await;
                    break;
                };
                if !send(&mut socket, Message::Text(frame)).await {
                    break;
                }
            }
            incoming = timeout(WS_IDLE_TIMEOUT, socket.recv()) => {
                match incoming {
                    Err(_) => continue,
                    Ok(None) | Ok(Some(Ok(Message::Close(_)))) => break,
                    Ok(Some(Err(e))) => {
                        tracing::debug!(subscriber, error = %e, "WebSocket receive failed");
                        break;
                    }
                    Ok(Some(Ok(Message::Text(text)))) => {
                        match serde_json::from_str::<ClientMessage>(text.as_str()) {
                            Ok(msg) if msg.kind == "ping" => {
                                let pong = ServerMessage::Pong.encode()?;
                                if !send(&mut socket, Message::Text(pong)).await {
                                    break;
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::debug!(subscriber, error = %e, "Ignoring malformed client message");
                            }
                        }
                    }
                    // Protocol-level pings are answered by axum.
                    Ok(Some(Ok(_))) => {}
                }
            }
            _ = ping_interval.tick() => {
                if !send(&mut socket, Message::Ping(Bytes::new())).await {
                    break;
                }
            }
        }
    }
    tracing::info!(subscriber, "Client disconnected from update stream");
    Ok(())
}
