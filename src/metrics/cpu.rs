//! CPU utilization from /proc/stat.

use anyhow::{Context, Result};
use std::fs;
use std::time::Duration;

/// Raw CPU time values from the aggregate `cpu` line of /proc/stat
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    pub fn idle_total(&self) -> u64 {
        self.idle + self.iowait
    }
}

/// CPU collector that averages utilization over a measurement window.
///
/// With a zero window the average is taken since the previous call instead,
/// so the first call after construction reports 0.
pub struct CpuCollector {
    window: Duration,
    prev: Option<CpuTimes>,
}

impl CpuCollector {
    pub fn new(window: Duration) -> Self {
        Self { window, prev: None }
    }

    /// Utilization percentage (0-100). Blocks for the measurement window.
    pub fn utilization(&mut self) -> Result<f64> {
        let start = if self.window.is_zero() {
            self.prev.take()
        } else {
            let first = read_cpu_times()?;
            std::thread::sleep(self.window);
            Some(first)
        };

        let end = read_cpu_times()?;
        let percent = start
            .as_ref()
            .map(|prev| utilization_between(prev, &end))
            .unwrap_or(0.0);
        self.prev = Some(end);
        Ok(percent)
    }
}

fn read_cpu_times() -> Result<CpuTimes> {
    let content = fs::read_to_string("/proc/stat").context("Failed to read /proc/stat")?;
    parse_stat(&content)
}

/// Pull the aggregate `cpu ` line out of /proc/stat content
pub fn parse_stat(content: &str) -> Result<CpuTimes> {
    let line = content
        .lines()
        .find(|line| line.starts_with("cpu "))
        .context("No aggregate cpu line in /proc/stat")?;
    Ok(parse_cpu_line(line))
}

fn parse_cpu_line(line: &str) -> CpuTimes {
    let parts: Vec<u64> = line
        .split_whitespace()
        .skip(1) // Skip "cpu"
        .filter_map(|s| s.parse().ok())
        .collect();

    CpuTimes {
        user: *parts.first().unwrap_or(&0),
        nice: *parts.get(1).unwrap_or(&0),
        system: *parts.get(2).unwrap_or(&0),
        idle: *parts.get(3).unwrap_or(&0),
        iowait: *parts.get(4).unwrap_or(&0),
        irq: *parts.get(5).unwrap_or(&0),
        softirq: *parts.get(6).unwrap_or(&0),
        steal: *parts.get(7).unwrap_or(&0),
    }
}

/// Busy share of the elapsed CPU time between two readings
pub fn utilization_between(prev: &CpuTimes, curr: &CpuTimes) -> f64 {
    let total_delta = curr.total().saturating_sub(prev.total());
    if total_delta == 0 {
        return 0.0;
    }
    let idle_delta = curr.idle_total().saturating_sub(prev.idle_total());
    let busy = 100.0 * (1.0 - (idle_delta as f64 / total_delta as f64));
    busy.clamp(0.0, 100.0)
}
