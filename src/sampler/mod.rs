// Raw OS data sources consumed by the monitor engine.
// Each source is synchronous; the scheduler runs ticks on the blocking pool.

pub mod connections;
pub mod counters;
mod linux;
pub mod process;

use crate::models::Protocol;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Failure of a single data source. Always absorbed by the engine.
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    /// Tool missing, exited with an error, or platform not supported.
    #[error("sampler unavailable: {0}")]
    Unavailable(String),

    #[error("sampler timed out after {0:?}")]
    Timeout(Duration),

    /// Enumeration needs elevated privileges.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("sampler io: {0}")]
    Io(#[from] std::io::Error),
}

/// Host-wide cumulative byte counters at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterSample {
    /// Unix seconds.
    pub timestamp: f64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessCounters {
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// Cumulative per-process counters at one instant, keyed by pid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessCounterSample {
    pub timestamp: f64,
    pub counters: HashMap<u32, ProcessCounters>,
}

/// One socket as reported by the OS.
#[derive(Debug, Clone, PartialEq)]
pub struct RawConnection {
    pub protocol: Protocol,
    pub local: SocketAddr,
    /// None for listening / unconnected sockets.
    pub remote: Option<SocketAddr>,
    pub state: String,
    pub pid: Option<u32>,
    pub process_name: Option<String>,
}

pub trait CounterSource: Send {
    fn sample(&mut self) -> Result<CounterSample, SamplerError>;
}

pub trait ProcessBandwidthSource: Send {
    fn sample(&mut self) -> Result<ProcessCounterSample, SamplerError>;
}

pub trait ConnectionSource: Send {
    fn list(&mut self) -> Result<Vec<RawConnection>, SamplerError>;
}

/// Current wall-clock time as unix seconds (0.0 if the clock is before the epoch).
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, operation = "get_timestamp", "system time error");
            0.0
        })
}
