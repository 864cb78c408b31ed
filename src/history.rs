//! Rolling buffer of raw network counters used to derive throughput.

use crate::config::HISTORY_CAPACITY;
use std::collections::VecDeque;
use std::time::Instant;
use tracing::debug;

/// Cumulative network byte counters at a point in time
#[derive(Debug, Clone, Copy)]
pub struct CounterSample {
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub captured_at: Instant,
}

/// Insertion-ordered history of counter samples; the oldest is evicted
/// once `capacity` is exceeded.
#[derive(Debug)]
pub struct RateHistory {
    samples: VecDeque<CounterSample>,
    capacity: usize,
}

impl RateHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, sample: CounterSample) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Per-second receive/transmit rates in KB/s between the two newest
    /// samples. Counter resets or wraps yield 0 rather than a negative rate.
    pub fn rates_kbps(&self, elapsed_secs: f64) -> (f64, f64) {
        let n = self.samples.len();
        if n < 2 {
            return (0.0, 0.0);
        }
        let prev = &self.samples[n - 2];
        let curr = &self.samples[n - 1];
        let elapsed = elapsed_secs.max(1.0);
        debug!(
            divisor_secs = elapsed,
            measured_secs = curr.captured_at.duration_since(prev.captured_at).as_secs_f64(),
            "rate window"
        );

        let rate = |now: u64, before: u64| {
            let delta = now as f64 - before as f64;
            (delta / elapsed / 1024.0).max(0.0)
        };

        (
            rate(curr.bytes_received, prev.bytes_received),
            rate(curr.bytes_sent, prev.bytes_sent),
        )
    }

    #[cfg(test)]
    pub fn latest(&self) -> Option<&CounterSample> {
        self.samples.back()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &CounterSample> {
        self.samples.iter()
    }
}

impl Default for RateHistory {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}
