// Read handle over the state published by the last completed tick.

use super::Clock;
use crate::models::{BandwidthPoint, Connection, Snapshot, Stats};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Default)]
pub(super) struct Published {
    pub(super) snapshot: Arc<Snapshot>,
    pub(super) history: Vec<BandwidthPoint>,
}

/// Cloneable; safe to use from request handlers while the engine ticks.
/// The lock is only held by the engine for the final swap of a tick.
#[derive(Clone)]
pub struct MonitorReader {
    pub(super) published: Arc<RwLock<Published>>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) started_at: f64,
}

impl MonitorReader {
    /// Latest snapshot as produced (uptime as of that tick).
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.read(|p| p.snapshot.clone())
    }

    /// Latest stats with uptime recomputed now.
    pub fn stats(&self) -> Stats {
        let mut stats = self.read(|p| p.snapshot.stats.clone());
        stats.uptime = self.uptime();
        stats
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.read(|p| p.snapshot.connections.clone())
    }

    /// Oldest to newest, bounded by the configured history length.
    pub fn history(&self) -> Vec<BandwidthPoint> {
        self.read(|p| p.history.clone())
    }

    pub fn uptime(&self) -> f64 {
        (self.clock.now() - self.started_at).max(0.0)
    }

    fn read<T>(&self, f: impl FnOnce(&Published) -> T) -> T {
        // Published is replaced wholesale, so a poisoned lock still holds a whole view.
        let guard = self.published.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }
}
