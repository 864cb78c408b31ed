//! One tick's worth of host health metrics and its newline-delimited JSON framing.

use serde::{Deserialize, Serialize};

/// Point-in-time health metrics, ready for logging and transmission.
///
/// Field names on the wire are the short keys the device firmware parses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// CPU utilization (0-100)
    #[serde(rename = "cpu")]
    pub cpu_percent: f64,
    /// Virtual memory in use (0-100)
    #[serde(rename = "memory")]
    pub memory_percent: f64,
    /// Root filesystem in use (0-100)
    #[serde(rename = "disk")]
    pub disk_percent: f64,
    /// Receive throughput in KB/s
    #[serde(rename = "net_in")]
    pub net_in_kbps: f64,
    /// Transmit throughput in KB/s
    #[serde(rename = "net_out")]
    pub net_out_kbps: f64,
    /// Number of processes on the host
    pub processes: u64,
    /// Capture time, seconds since the Unix epoch
    pub timestamp: i64,
    /// CPU temperature, only present when a sensor gave a plausible reading
    #[serde(rename = "cpu_temp", default, skip_serializing_if = "Option::is_none")]
    pub cpu_temp_celsius: Option<f64>,
}

impl Snapshot {
    /// Encode as a single JSON line terminated by `\n`.
    pub fn to_frame(&self) -> serde_json::Result<Vec<u8>> {
        let mut frame = serde_json::to_vec(self)?;
        frame.push(b'\n');
        Ok(frame)
    }

    /// Parse one frame, with or without its trailing newline.
    #[cfg(test)]
    pub fn from_frame(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim_end_matches(['\r', '\n']))
    }
}

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Clamp a percentage into 0-100 and round it; NaN becomes 0.
pub fn percent(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    round1(value.clamp(0.0, 100.0))
}
