// Per-tick snapshot and aggregate stats

use serde::{Deserialize, Serialize};

use super::Connection;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Sum of per-process upload rates (bytes/sec).
    pub total_upload_speed: f64,
    /// Sum of per-process download rates (bytes/sec).
    pub total_download_speed: f64,
    pub active_connections: usize,
    /// Cumulative host counters from the latest aggregate sample.
    pub total_bytes_sent: u64,
    pub total_bytes_received: u64,
    /// Seconds since the engine started.
    pub uptime: f64,
}

/// Output of one tick. Shared read-only as `Arc<Snapshot>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub connections: Vec<Connection>,
    pub stats: Stats,
}
