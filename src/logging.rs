//! Durable session log and diagnostic tracing setup.

use crate::snapshot::Snapshot;
use crate::transmit::DeliveryResult;
use anyhow::{anyhow, Context, Result};
use chrono::{Local, TimeZone};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "healthlink=info";

/// Install the stderr diagnostics subscriber, honouring `RUST_LOG`.
pub fn init_tracing() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}

/// Human-readable log of one monitoring session.
///
/// Each record is flushed as soon as it is written so the file is useful
/// while the session is still running.
pub struct SessionLog {
    writer: BufWriter<Box<dyn Write>>,
    path: PathBuf,
    samples_written: u64,
}

impl SessionLog {
    /// Create (truncating) the log file and write the session header
    pub fn create<P: AsRef<Path>>(path: P, interval: Duration, port: &str) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        Self::with_writer(Box::new(file), path.to_path_buf(), interval, port)
    }

    /// Start a session log on an already-open destination
    pub fn with_writer(
        out: Box<dyn Write>,
        path: PathBuf,
        interval: Duration,
        port: &str,
    ) -> Result<Self> {
        let mut log = Self {
            writer: BufWriter::new(out),
            path,
            samples_written: 0,
        };

        writeln!(
            log.writer,
            "HOST HEALTH MONITOR LOG - Started {}",
            Local::now().format("%Y-%m-%dT%H:%M:%S")
        )?;
        writeln!(log.writer, "Monitoring interval: {} seconds", interval.as_secs_f64())?;
        writeln!(log.writer, "Connected to: {port}")?;
        writeln!(log.writer, "{}", "=".repeat(100))?;
        log.writer.flush()?;

        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    /// Append one sample: a summary line, its JSON, and a separator
    pub fn append(&mut self, count: u64, snapshot: &Snapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot)?;
        let when = Local
            .timestamp_opt(snapshot.timestamp, 0)
            .single()
            .unwrap_or_else(Local::now)
            .format("%Y-%m-%dT%H:%M:%S");

        write!(
            self.writer,
            "[{:04}] {} | CPU={:5.1}% | RAM={:5.1}% | DISK={:5.1}% | NET=↓{:6.1}↑{:6.1} KB/s | PROC={}",
            count,
            when,
            snapshot.cpu_percent,
            snapshot.memory_percent,
            snapshot.disk_percent,
            snapshot.net_in_kbps,
            snapshot.net_out_kbps,
            snapshot.processes,
        )?;
        if let Some(temp) = snapshot.cpu_temp_celsius {
            write!(self.writer, " | TEMP={temp:.1}°C")?;
        }
        writeln!(self.writer)?;
        writeln!(self.writer, "JSON: {json}")?;
        writeln!(self.writer, "{}", "-".repeat(80))?;

        self.samples_written += 1;
        self.writer.flush()?;
        Ok(())
    }

    /// Write the closing trailer with totals and the session summary
    pub fn finish(&mut self, summary: &SessionSummary, runtime: Duration) -> Result<()> {
        writeln!(self.writer)?;
        writeln!(self.writer, "{}", "=".repeat(100))?;
        writeln!(
            self.writer,
            "Monitoring ended at {}",
            Local::now().format("%Y-%m-%dT%H:%M:%S")
        )?;
        writeln!(self.writer, "Total samples collected: {}", summary.samples)?;
        writeln!(
            self.writer,
            "Total runtime: {:.1} minutes",
            runtime.as_secs_f64() / 60.0
        )?;
        for line in summary.lines() {
            writeln!(self.writer, "{line}")?;
        }
        writeln!(self.writer, "{}", "=".repeat(100))?;
        self.writer.flush()?;
        debug!(
            samples = self.samples_written,
            path = %self.path.display(),
            "session log closed"
        );
        Ok(())
    }
}

impl Drop for SessionLog {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Running statistics over a session
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSummary {
    pub samples: u64,
    pub cpu_avg: f64,
    pub cpu_max: f64,
    pub memory_avg: f64,
    pub memory_max: f64,
    pub net_in_peak_kbps: f64,
    pub net_out_peak_kbps: f64,
    pub frames_sent: u64,
    pub write_timeouts: u64,
    pub failed_sends: u64,
}

impl SessionSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sample(&mut self, snapshot: &Snapshot) {
        self.samples += 1;
        let n = self.samples as f64;
        self.cpu_avg = running_avg(self.cpu_avg, snapshot.cpu_percent, n);
        self.memory_avg = running_avg(self.memory_avg, snapshot.memory_percent, n);
        self.cpu_max = self.cpu_max.max(snapshot.cpu_percent);
        self.memory_max = self.memory_max.max(snapshot.memory_percent);
        self.net_in_peak_kbps = self.net_in_peak_kbps.max(snapshot.net_in_kbps);
        self.net_out_peak_kbps = self.net_out_peak_kbps.max(snapshot.net_out_kbps);
    }

    pub fn add_delivery(&mut self, result: &DeliveryResult) {
        if result.ok {
            self.frames_sent += 1;
        } else if result.is_timeout() {
            self.write_timeouts += 1;
        } else {
            self.failed_sends += 1;
        }
    }

    pub fn lines(&self) -> Vec<String> {
        vec![
            format!(
                "CPU:     avg {:5.1}%  max {:5.1}%",
                self.cpu_avg, self.cpu_max
            ),
            format!(
                "Memory:  avg {:5.1}%  max {:5.1}%",
                self.memory_avg, self.memory_max
            ),
            format!(
                "Network: peak in {:.1} KB/s  peak out {:.1} KB/s",
                self.net_in_peak_kbps, self.net_out_peak_kbps
            ),
            format!(
                "Frames:  {} sent, {} write timeouts, {} failed",
                self.frames_sent, self.write_timeouts, self.failed_sends
            ),
        ]
    }
}

fn running_avg(avg: f64, value: f64, n: f64) -> f64 {
    avg + (value - avg) / n
}

/// Destination that accepts a fixed number of writes, then reports a full disk
#[cfg(test)]
pub struct FillingDisk {
    pub writes_left: usize,
}

#[cfg(test)]
impl Write for FillingDisk {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.writes_left == 0 {
            return Err(std::io::Error::other("no space left on device"));
        }
        self.writes_left -= 1;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
