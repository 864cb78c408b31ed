//! Cumulative network byte counters from /proc/net/dev.

use anyhow::{Context, Result};
use std::fs;

/// Byte totals summed across non-loopback interfaces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetCounters {
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

/// Collect current cumulative counters
pub fn counters() -> Result<NetCounters> {
    let netdev = fs::read_to_string("/proc/net/dev").context("Failed to read /proc/net/dev")?;
    Ok(parse_net_dev(&netdev))
}

pub fn parse_net_dev(netdev: &str) -> NetCounters {
    let mut totals = NetCounters::default();

    for line in netdev.lines().skip(2) {
        // Skip header lines; "eth0: 123 ..." may lack a space after the colon
        let Some((name, stats)) = line.split_once(':') else {
            continue;
        };
        let interface = name.trim();
        if interface == "lo" {
            continue;
        }

        let parts: Vec<&str> = stats.split_whitespace().collect();
        if parts.len() < 16 {
            continue;
        }

        totals.bytes_received += parts[0].parse::<u64>().unwrap_or(0);
        totals.bytes_sent += parts[8].parse::<u64>().unwrap_or(0);
    }

    totals
}
