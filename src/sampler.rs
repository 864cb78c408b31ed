//! Turns raw host readings into a `Snapshot`, deriving throughput from history.

use crate::history::{CounterSample, RateHistory};
use crate::metrics::HostSensors;
use crate::snapshot::{percent, round1, Snapshot};
use chrono::Utc;
use std::time::Instant;
use tracing::warn;

/// Produces one snapshot per tick from a set of host sensors
pub struct MetricsSampler<S> {
    sensors: S,
    /// Configured interval in seconds (floored at 1), used as the rate divisor
    rate_divisor_secs: f64,
}

impl<S: HostSensors> MetricsSampler<S> {
    pub fn new(sensors: S, rate_divisor_secs: f64) -> Self {
        Self {
            sensors,
            rate_divisor_secs: rate_divisor_secs.max(1.0),
        }
    }

    /// Read all sensors and append the network counters to `history`.
    ///
    /// A failing reading degrades to 0 (or an absent temperature) instead
    /// of aborting the tick.
    pub fn sample(&mut self, history: &mut RateHistory) -> Snapshot {
        let cpu = self.sensors.cpu_percent().unwrap_or_else(|e| {
            warn!(error = %e, "cpu reading unavailable, reporting 0");
            0.0
        });
        let memory = self.sensors.memory_percent().unwrap_or_else(|e| {
            warn!(error = %e, "memory reading unavailable, reporting 0");
            0.0
        });
        let disk = self.sensors.disk_percent().unwrap_or_else(|e| {
            warn!(error = %e, "disk reading unavailable, reporting 0");
            0.0
        });
        let processes = self.sensors.process_count().unwrap_or_else(|e| {
            warn!(error = %e, "process count unavailable, reporting 0");
            0
        });

        let (net_in, net_out) = match self.sensors.net_counters() {
            Ok(counters) => {
                history.push(CounterSample {
                    bytes_received: counters.bytes_received,
                    bytes_sent: counters.bytes_sent,
                    captured_at: Instant::now(),
                });
                history.rates_kbps(self.rate_divisor_secs)
            }
            Err(e) => {
                warn!(error = %e, "network counters unavailable, reporting 0 KB/s");
                (0.0, 0.0)
            }
        };

        Snapshot {
            cpu_percent: percent(cpu),
            memory_percent: percent(memory),
            disk_percent: percent(disk),
            net_in_kbps: round1(net_in),
            net_out_kbps: round1(net_out),
            processes,
            timestamp: Utc::now().timestamp(),
            cpu_temp_celsius: self.sensors.cpu_temperature(),
        }
    }

    #[cfg(test)]
    pub fn sensors_mut(&mut self) -> &mut S {
        &mut self.sensors
    }
}
