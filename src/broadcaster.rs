// Fan-out of snapshots to live WebSocket subscribers.
// Each subscriber owns a bounded queue; publish never waits on subscriber I/O.

use crate::models::Snapshot;
use axum::extract::ws::Utf8Bytes;
use serde::Serialize;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Serialized message, shared by every subscriber without copying.
pub type Frame = Utf8Bytes;

/// Server -> client messages on /ws.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ServerMessage<'a> {
    Initial(&'a Snapshot),
    Update(&'a Snapshot),
    Pong,
}

impl ServerMessage<'_> {
    pub fn encode(&self) -> Result<Frame, serde_json::Error> {
        serde_json::to_string(self).map(Frame::from)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

pub struct Broadcaster {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<Frame>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl Broadcaster {
    /// `buffer` is the per-subscriber queue length (at least 1).
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Join the live set. `initial` is read under the registry lock, so a publish
    /// racing with this call is either already reflected in it or queued right after.
    pub fn subscribe<S: Borrow<Snapshot>>(
        self: &Arc<Self>,
        initial: impl FnOnce() -> S,
    ) -> Result<Subscription, serde_json::Error> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let count = {
            let mut subscribers = self.lock();
            let initial = initial();
            let frame = ServerMessage::Initial(initial.borrow()).encode()?;
            // Fresh queue with capacity >= 1 always has room.
            let _ = tx.try_send(frame);
            subscribers.insert(id, tx);
            subscribers.len()
        };
        tracing::info!(subscriber = id.0, subscribers = count, "Subscriber joined");
        Ok(Subscription {
            id,
            rx,
            broadcaster: self.clone(),
        })
    }

    /// Idempotent.
    pub fn unsubscribe(&self, id: SubscriberId) {
        let removed = {
            let mut subscribers = self.lock();
            subscribers.remove(&id).map(|_| subscribers.len())
        };
        if let Some(count) = removed {
            tracing::info!(subscriber = id.0, subscribers = count, "Subscriber left");
        }
    }

    /// Serialize once and offer the frame to every subscriber.
    /// Subscribers whose queue is closed or full are dropped. Returns the number delivered.
    pub fn publish(&self, snapshot: &Snapshot) -> usize {
        let frame = match ServerMessage::Update(snapshot).encode() {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, operation = "publish", "snapshot serialization failed");
                return 0;
            }
        };

        let mut subscribers = self.lock();
        subscribers.retain(|id, tx| match tx.try_send(frame.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(subscriber = id.0, "Subscriber too slow; dropping");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(subscriber = id.0, "Subscriber gone; dropping");
                false
            }
        });
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Drop every queue; transport tasks see end-of-stream and close their sockets.
    pub fn close_all(&self) {
        let closed = {
            let mut subscribers = self.lock();
            let n = subscribers.len();
            subscribers.clear();
            n
        };
        tracing::info!(subscribers = closed, "Closed all subscribers");
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, mpsc::Sender<Frame>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A live subscription; leaves the broadcaster when dropped.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Frame>,
    broadcaster: Arc<Broadcaster>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next frame, or None once the broadcaster dropped this subscriber.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// Next queued frame without waiting.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(self.id);
    }
}
