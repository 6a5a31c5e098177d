// Monitoring engine: turns raw counters and socket listings into rates,
// connection lifetimes and a bounded bandwidth history.
//
// Single writer: only `tick` mutates, and it publishes a fully built view at the end.

mod history;
mod reader;

pub use history::BandwidthHistory;
pub use reader::MonitorReader;

use crate::models::{BandwidthPoint, Connection, ConnectionId, Snapshot, Stats};
use crate::sampler::{
    ConnectionSource, CounterSample, CounterSource, ProcessBandwidthSource, ProcessCounterSample,
    RawConnection, SamplerError,
};
use reader::Published;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Rate limit for repeated sampler warnings (a missing tool would otherwise log every tick).
const DEGRADED_WARN_INTERVAL: Duration = Duration::from_secs(60);

/// Wall-clock source, in unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        crate::sampler::unix_now()
    }
}

/// The three raw data sources polled each tick.
pub struct Sources {
    pub counters: Box<dyn CounterSource>,
    pub processes: Box<dyn ProcessBandwidthSource>,
    pub connections: Box<dyn ConnectionSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Counters,
    Processes,
    Connections,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Source::Counters => "counters",
            Source::Processes => "processes",
            Source::Connections => "connections",
        })
    }
}

/// A sampler failure the tick absorbed.
#[derive(Debug)]
pub struct SamplerIssue {
    pub source: Source,
    pub error: SamplerError,
}

/// Result of one tick.
#[derive(Debug)]
pub enum TickOutcome {
    Healthy(Arc<Snapshot>),
    /// Snapshot produced with one or more sources contributing stale or empty data.
    Degraded(Arc<Snapshot>, Vec<SamplerIssue>),
    /// The tick body itself failed (panic, poisoned engine); nothing was published.
    Failed(anyhow::Error),
}

impl TickOutcome {
    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        match self {
            TickOutcome::Healthy(s) | TickOutcome::Degraded(s, _) => Some(s),
            TickOutcome::Failed(_) => None,
        }
    }
}

/// Upload/download rate of one process, bytes/sec.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessRate {
    pub upload: f64,
    pub download: f64,
}

#[derive(Default)]
struct DegradationLog {
    last_warn: HashMap<Source, Instant>,
    failing: HashSet<Source>,
}

impl DegradationLog {
    fn failed(&mut self, source: Source, error: &SamplerError) {
        self.failing.insert(source);
        let should_warn = self
            .last_warn
            .get(&source)
            .is_none_or(|t| t.elapsed() >= DEGRADED_WARN_INTERVAL);
        if should_warn {
            tracing::warn!(
                error = %error,
                source = %source,
                operation = "tick",
                "sampler degraded; continuing with stale or empty data"
            );
            self.last_warn.insert(source, Instant::now());
        }
    }

    fn succeeded(&mut self, source: Source) {
        if self.failing.remove(&source) {
            tracing::info!(source = %source, operation = "tick", "sampler recovered");
        }
    }
}

pub struct MonitorEngine {
    sources: Sources,
    clock: Arc<dyn Clock>,
    started_at: f64,
    history: BandwidthHistory,
    previous_counters: Option<CounterSample>,
    previous_processes: Option<ProcessCounterSample>,
    process_rates: HashMap<u32, ProcessRate>,
    /// Identity -> first-seen time (unix seconds).
    connections: HashMap<ConnectionId, f64>,
    published: Arc<RwLock<Published>>,
    degradation: DegradationLog,
}

impl MonitorEngine {
    pub fn new(sources: Sources, history_length: usize) -> Self {
        Self::with_clock(sources, history_length, Arc::new(SystemClock))
    }

    pub fn with_clock(sources: Sources, history_length: usize, clock: Arc<dyn Clock>) -> Self {
        let started_at = clock.now();
        Self {
            sources,
            clock,
            started_at,
            history: BandwidthHistory::new(history_length),
            previous_counters: None,
            previous_processes: None,
            process_rates: HashMap::new(),
            connections: HashMap::new(),
            published: Arc::new(RwLock::new(Published::default())),
            degradation: DegradationLog::default(),
        }
    }

    pub fn reader(&self) -> MonitorReader {
        MonitorReader {
            published: self.published.clone(),
            clock: self.clock.clone(),
            started_at: self.started_at,
        }
    }

    /// Run one sampling/reconciliation cycle and publish its snapshot.
    pub fn tick(&mut self) -> TickOutcome {
        let mut issues = Vec::new();

        let counters = self.sample_counters();
        self.record(Source::Counters, counters, &mut issues);

        let processes = self.sample_processes();
        self.record(Source::Processes, processes, &mut issues);

        let listed = self.sources.connections.list();
        let raw = match listed {
            Ok(raw) => {
                self.degradation.succeeded(Source::Connections);
                raw
            }
            Err(e) => {
                self.record(Source::Connections, Err(e), &mut issues);
                Vec::new()
            }
        };

        let now = self.clock.now();
        let connections = self.reconcile(raw, now);
        let snapshot = Arc::new(Snapshot {
            stats: self.build_stats(connections.len(), now),
            connections,
        });
        self.publish(snapshot.clone());

        if issues.is_empty() {
            TickOutcome::Healthy(snapshot)
        } else {
            TickOutcome::Degraded(snapshot, issues)
        }
    }

    pub fn stats(&self) -> Stats {
        self.reader().stats()
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.reader().connections()
    }

    pub fn history(&self) -> Vec<BandwidthPoint> {
        self.reader().history()
    }

    /// Per-process rates from the last successful process sample.
    pub fn process_rates(&self) -> HashMap<u32, ProcessRate> {
        self.process_rates.clone()
    }

    fn record(
        &mut self,
        source: Source,
        result: Result<(), SamplerError>,
        issues: &mut Vec<SamplerIssue>,
    ) {
        match result {
            Ok(()) => self.degradation.succeeded(source),
            Err(error) => {
                self.degradation.failed(source, &error);
                issues.push(SamplerIssue { source, error });
            }
        }
    }

    /// Host-wide rates into history. The first sample only sets the baseline.
    fn sample_counters(&mut self) -> Result<(), SamplerError> {
        let current = self.sources.counters.sample()?;
        if let Some(previous) = self.previous_counters {
            let elapsed = current.timestamp - previous.timestamp;
            if elapsed > 0.0 {
                self.history.push(BandwidthPoint {
                    timestamp: current.timestamp,
                    upload: current.bytes_sent.saturating_sub(previous.bytes_sent) as f64
                        / elapsed,
                    download: current
                        .bytes_received
                        .saturating_sub(previous.bytes_received) as f64
                        / elapsed,
                });
            }
        }
        self.previous_counters = Some(current);
        Ok(())
    }

    /// On failure the last known rates are kept as-is.
    fn sample_processes(&mut self) -> Result<(), SamplerError> {
        let current = self.sources.processes.sample()?;
        if let Some(previous) = &self.previous_processes {
            let elapsed = current.timestamp - previous.timestamp;
            if elapsed > 0.0 {
                // Counters can go backwards when a pid is reused; clamp at zero.
                self.process_rates = current
                    .counters
                    .iter()
                    .filter_map(|(pid, now)| {
                        let before = previous.counters.get(pid)?;
                        Some((
                            *pid,
                            ProcessRate {
                                upload: now.bytes_out.saturating_sub(before.bytes_out) as f64
                                    / elapsed,
                                download: now.bytes_in.saturating_sub(before.bytes_in) as f64
                                    / elapsed,
                            },
                        ))
                    })
                    .collect();
            }
        }
        self.previous_processes = Some(current);
        Ok(())
    }

    /// Match this tick's sockets against the previous table; unseen identities are dropped.
    fn reconcile(&mut self, raw: Vec<RawConnection>, now: f64) -> Vec<Connection> {
        let mut table = HashMap::with_capacity(raw.len());
        let mut views = Vec::with_capacity(raw.len());

        for conn in raw {
            // Listening / unconnected sockets are not connections.
            let Some(remote) = conn.remote else {
                continue;
            };
            let pid = conn.pid.unwrap_or(0);
            let id = ConnectionId {
                protocol: conn.protocol,
                local: conn.local,
                remote,
                pid,
            };
            if table.contains_key(&id) {
                continue;
            }
            let start_time = self.connections.get(&id).copied().unwrap_or(now);
            table.insert(id, start_time);

            let rate = self.process_rates.get(&pid).copied().unwrap_or_default();
            views.push(Connection {
                id: id.to_string(),
                local_addr: conn.local.to_string(),
                remote_addr: remote.to_string(),
                protocol: conn.protocol,
                state: conn.state,
                process_name: conn.process_name.unwrap_or_else(|| "Unknown".into()),
                pid,
                upload_speed: rate.upload,
                download_speed: rate.download,
                duration: (now - start_time).max(0.0),
                bytes_sent: 0,
                bytes_received: 0,
            });
        }

        self.connections = table;
        views
    }

    fn build_stats(&self, active_connections: usize, now: f64) -> Stats {
        let (total_upload_speed, total_download_speed) = self
            .process_rates
            .values()
            .fold((0.0, 0.0), |(up, down), r| (up + r.upload, down + r.download));
        let (total_bytes_sent, total_bytes_received) = self
            .previous_counters
            .map(|c| (c.bytes_sent, c.bytes_received))
            .unwrap_or((0, 0));
        Stats {
            total_upload_speed,
            total_download_speed,
            active_connections,
            total_bytes_sent,
            total_bytes_received,
            uptime: (now - self.started_at).max(0.0),
        }
    }

    fn publish(&self, snapshot: Arc<Snapshot>) {
        let history = self.history.to_vec();
        let mut guard = self.published.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Published { snapshot, history };
    }
}
