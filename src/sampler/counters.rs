// Aggregate interface counters via sysinfo

use super::{CounterSample, CounterSource, SamplerError, unix_now};
use sysinfo::Networks;
use tracing::instrument;

/// Sums cumulative transmitted/received bytes over every interface.
pub struct SysinfoCounters {
    networks: Networks,
}

impl Default for SysinfoCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoCounters {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl CounterSource for SysinfoCounters {
    #[instrument(skip(self), fields(sampler = "counters", operation = "sample"))]
    fn sample(&mut self) -> Result<CounterSample, SamplerError> {
        self.networks.refresh(true);
        let (sent, received) = self
            .networks
            .list()
            .values()
            .fold((0u64, 0u64), |(tx, rx), data| {
                (
                    tx.saturating_add(data.total_transmitted()),
                    rx.saturating_add(data.total_received()),
                )
            });
        if self.networks.list().is_empty() {
            return Err(SamplerError::Unavailable(
                "no network interfaces reported".into(),
            ));
        }
        Ok(CounterSample {
            timestamp: unix_now(),
            bytes_sent: sent,
            bytes_received: received,
        })
    }
}
