// Shared test helpers: scripted samplers and a manual clock
#![allow(dead_code)]

use netwatch::models::Protocol;
use netwatch::monitor::{Clock, MonitorEngine, Sources, TickOutcome};
use netwatch::sampler::{
    ConnectionSource, CounterSample, CounterSource, ProcessBandwidthSource, ProcessCounterSample,
    ProcessCounters, RawConnection, SamplerError,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub const START: f64 = 1_000.0;

/// Clock the test moves by hand.
#[derive(Clone)]
pub struct ManualClock(Arc<Mutex<f64>>);

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self(Arc::new(Mutex::new(start)))
    }

    pub fn set(&self, now: f64) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.0.lock().unwrap()
    }
}

/// Sampler that replays queued results; an empty queue reports Unavailable.
pub struct Script<T>(Arc<Mutex<VecDeque<Result<T, SamplerError>>>>);

impl<T> Clone for Script<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(VecDeque::new())))
    }
}

impl<T> Script<T> {
    pub fn push(&self, result: Result<T, SamplerError>) {
        self.0.lock().unwrap().push_back(result);
    }

    fn next(&self) -> Result<T, SamplerError> {
        self.0
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SamplerError::Unavailable("script exhausted".into())))
    }
}

impl CounterSource for Script<CounterSample> {
    fn sample(&mut self) -> Result<CounterSample, SamplerError> {
        self.next()
    }
}

impl ProcessBandwidthSource for Script<ProcessCounterSample> {
    fn sample(&mut self) -> Result<ProcessCounterSample, SamplerError> {
        self.next()
    }
}

impl ConnectionSource for Script<Vec<RawConnection>> {
    fn list(&mut self) -> Result<Vec<RawConnection>, SamplerError> {
        self.next()
    }
}

pub fn counters(timestamp: f64, bytes_sent: u64, bytes_received: u64) -> CounterSample {
    CounterSample {
        timestamp,
        bytes_sent,
        bytes_received,
    }
}

/// `(pid, bytes_in, bytes_out)` rows.
pub fn processes(timestamp: f64, rows: &[(u32, u64, u64)]) -> ProcessCounterSample {
    ProcessCounterSample {
        timestamp,
        counters: rows
            .iter()
            .map(|&(pid, bytes_in, bytes_out)| {
                (
                    pid,
                    ProcessCounters {
                        bytes_in,
                        bytes_out,
                    },
                )
            })
            .collect(),
    }
}

pub fn tcp(local: &str, remote: Option<&str>, pid: u32) -> RawConnection {
    RawConnection {
        protocol: Protocol::Tcp,
        local: local.parse().unwrap(),
        remote: remote.map(|r| r.parse().unwrap()),
        state: "ESTABLISHED".into(),
        pid: Some(pid),
        process_name: Some(format!("proc{}", pid)),
    }
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

/// Engine wired to scripted samplers and a manual clock.
pub struct Harness {
    pub engine: MonitorEngine,
    pub clock: ManualClock,
    pub counters: Script<CounterSample>,
    pub processes: Script<ProcessCounterSample>,
    pub connections: Script<Vec<RawConnection>>,
}

impl Harness {
    pub fn new(history_length: usize) -> Self {
        let clock = ManualClock::new(START);
        let counters = Script::default();
        let processes = Script::default();
        let connections = Script::default();
        let engine = MonitorEngine::with_clock(
            Sources {
                counters: Box::new(counters.clone()),
                processes: Box::new(processes.clone()),
                connections: Box::new(connections.clone()),
            },
            history_length,
            Arc::new(clock.clone()),
        );
        Self {
            engine,
            clock,
            counters,
            processes,
            connections,
        }
    }

    /// Queue one result per sampler, move the clock to `now`, and tick.
    pub fn tick_with(
        &mut self,
        now: f64,
        counters: Result<CounterSample, SamplerError>,
        processes: Result<ProcessCounterSample, SamplerError>,
        connections: Result<Vec<RawConnection>, SamplerError>,
    ) -> TickOutcome {
        self.counters.push(counters);
        self.processes.push(processes);
        self.connections.push(connections);
        self.clock.set(now);
        self.engine.tick()
    }

    /// Tick with only connection data changing; counters advance idly.
    pub fn tick_connections(&mut self, now: f64, conns: Vec<RawConnection>) -> TickOutcome {
        self.tick_with(
            now,
            Ok(counters(now, 0, 0)),
            Ok(processes(now, &[])),
            Ok(conns),
        )
    }
}
