// Tick scheduler: drives the monitor engine and hands snapshots to the broadcaster.
// Ticks run on the blocking pool and never overlap; a slow tick delays the next one.

use crate::broadcaster::Broadcaster;
use crate::monitor::{MonitorEngine, TickOutcome};
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::Instrument;

/// Engine, broadcaster and shutdown for the scheduler.
pub struct SchedulerDeps {
    pub engine: MonitorEngine,
    pub broadcaster: Arc<Broadcaster>,
    pub shutdown_rx: tokio::sync::oneshot::Receiver<()>,
}

pub struct SchedulerConfig {
    pub tick_interval_ms: u64,
    /// How often to log app stats (real seconds).
    pub stats_log_interval_secs: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct TickTotals {
    ticks: u64,
    degraded: u64,
    failed: u64,
}

/// Run one tick off the async runtime. Panics and a poisoned engine become `Failed`.
pub async fn run_tick(engine: Arc<Mutex<MonitorEngine>>) -> TickOutcome {
    let joined = tokio::task::spawn_blocking(move || {
        let mut guard = match engine.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                // Readers only ever see a completed publish, so the engine stays usable.
                tracing::warn!(
                    operation = "tick",
                    "engine lock poisoned by an earlier tick; recovering"
                );
                poisoned.into_inner()
            }
        };
        guard.tick()
    })
    .await;
    match joined {
        Ok(outcome) => outcome,
        Err(e) => TickOutcome::Failed(anyhow::anyhow!("tick task join: {}", e)),
    }
}

pub fn spawn(deps: SchedulerDeps, config: SchedulerConfig) -> tokio::task::JoinHandle<()> {
    let SchedulerDeps {
        engine,
        broadcaster,
        mut shutdown_rx,
    } = deps;
    let SchedulerConfig {
        tick_interval_ms,
        stats_log_interval_secs,
    } = config;

    let engine = Arc::new(Mutex::new(engine));

    let task = async move {
        let mut tick = interval(Duration::from_millis(tick_interval_ms));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats_log_tick = interval(Duration::from_secs(stats_log_interval_secs));
        stats_log_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut totals = TickTotals::default();

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    // The select branch body runs to completion, so shutdown waits for this tick.
                    let outcome = run_tick(engine.clone()).await;
                    totals.ticks += 1;
                    match &outcome {
                        TickOutcome::Healthy(_) => {}
                        TickOutcome::Degraded(_, issues) => {
                            totals.degraded += 1;
                            tracing::trace!(issues = issues.len(), "tick degraded");
                        }
                        TickOutcome::Failed(e) => {
                            totals.failed += 1;
                            tracing::error!(
                                error = %e,
                                operation = "tick",
                                "tick failed; continuing"
                            );
                        }
                    }
                    if let Some(snapshot) = outcome.snapshot() {
                        broadcaster.publish(snapshot);
                    }
                }
                _ = &mut shutdown_rx => {
                    tracing::debug!("Scheduler shutting down");
                    break;
                }
                _ = stats_log_tick.tick() => {
                    tracing::info!(
                        subscribers = broadcaster.subscriber_count(),
                        ticks_total = totals.ticks,
                        degraded_ticks_total = totals.degraded,
                        failed_ticks_total = totals.failed,
                        "app stats"
                    );
                }
            }
        }

        broadcaster.close_all();
    };
    tokio::spawn(task.instrument(tracing::debug_span!("scheduler", tick_interval_ms)))
}
