//! Session configuration and protocol constants.

use std::path::PathBuf;
use std::time::Duration;

/// Serial line speed expected by the device firmware.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Number of raw network counter samples kept for rate calculation.
pub const HISTORY_CAPACITY: usize = 10;

/// Back-to-back write timeouts before a warning is raised.
pub const MAX_CONSECUTIVE_TIMEOUTS: u32 = 3;

/// Unread inbound bytes above which the backlog is discarded before a send.
pub const BACKLOG_DISCARD_THRESHOLD: usize = 1000;

/// Recent operator messages kept for display.
pub const MESSAGE_LOG_CAPACITY: usize = 10;

/// Plausible CPU temperature range in degrees Celsius.
pub const TEMPERATURE_RANGE: std::ops::RangeInclusive<f64> = 20.0..=120.0;

/// Longest accepted sampling interval.
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

pub const DEFAULT_LOG_FILE: &str = "health_monitor.txt";

/// How the loop schedules the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cadence {
    /// Sleep the full interval after each tick's work. Real spacing drifts
    /// by the tick's processing time.
    #[default]
    FixedDelay,
    /// Sleep until `tick_start + interval`.
    FixedRate,
}

/// Serial line parameters (8N1, no flow control is implied)
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub baud_rate: u32,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_secs(1),
            write_timeout: Duration::from_secs(2),
        }
    }
}

/// Everything a monitoring session needs to know up front
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Time between ticks
    pub interval: Duration,
    /// Window over which CPU utilization is averaged
    pub cpu_window: Duration,
    /// Durable session log; `None` disables it
    pub log_path: Option<PathBuf>,
    pub serial: SerialSettings,
    /// Wait after opening the port before reading the device banner
    pub settle_delay: Duration,
    /// Read budget for the device banner after connecting
    pub startup_read_budget: Duration,
    /// Pause between a successful send and reading the reply
    pub response_delay: Duration,
    /// Upper bound on time spent draining inbound lines per tick
    pub read_budget: Duration,
    /// Treat non-timeout transport errors as fatal
    pub stop_on_transport_error: bool,
    pub cadence: Cadence,
    /// Stop after this many samples
    pub max_samples: Option<u64>,
    /// Stop after this much wall time
    pub duration: Option<Duration>,
}

impl MonitorConfig {
    /// Interval in whole seconds, floored at 1, used as the rate divisor.
    pub fn rate_divisor_secs(&self) -> f64 {
        self.interval.as_secs_f64().max(1.0)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            cpu_window: Duration::from_secs(1),
            log_path: Some(PathBuf::from(DEFAULT_LOG_FILE)),
            serial: SerialSettings::default(),
            settle_delay: Duration::from_secs(2),
            startup_read_budget: Duration::from_millis(500),
            response_delay: Duration::from_millis(100),
            read_budget: Duration::from_millis(200),
            stop_on_transport_error: true,
            cadence: Cadence::FixedDelay,
            max_samples: None,
            duration: None,
        }
    }
}
