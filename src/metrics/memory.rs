//! Memory utilization from /proc/meminfo.

use anyhow::{Context, Result};
use std::fs;

/// Collect the percentage of physical memory in use
pub fn used_percent() -> Result<f64> {
    let meminfo = fs::read_to_string("/proc/meminfo").context("Failed to read /proc/meminfo")?;
    parse_used_percent(&meminfo)
}

/// Used share of MemTotal. Prefers MemAvailable and falls back to
/// free + buffers + cached on kernels that lack it.
pub fn parse_used_percent(meminfo: &str) -> Result<f64> {
    let mut total: u64 = 0;
    let mut free: u64 = 0;
    let mut available: Option<u64> = None;
    let mut buffers: u64 = 0;
    let mut cached: u64 = 0;

    for line in meminfo.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }

        let value: u64 = parts[1].parse().unwrap_or(0);

        match parts[0] {
            "MemTotal:" => total = value,
            "MemFree:" => free = value,
            "MemAvailable:" => available = Some(value),
            "Buffers:" => buffers = value,
            "Cached:" => cached = value,
            _ => {}
        }
    }

    anyhow::ensure!(total > 0, "MemTotal missing from /proc/meminfo");

    let used = match available {
        Some(available) => total.saturating_sub(available),
        None => total.saturating_sub(free + buffers + cached),
    };

    Ok(100.0 * used as f64 / total as f64)
}
