//! healthlink - streams host health metrics to a serial-attached display.
//!
//! Samples CPU, memory, disk, network and process metrics on a fixed
//! interval, sends each sample as one JSON line over serial, and keeps a
//! human-readable session log.

mod config;
mod display;
mod error;
mod history;
mod logging;
mod metrics;
mod monitor;
mod sampler;
mod serial;
mod shutdown;
mod snapshot;
mod transmit;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Cadence, MonitorConfig, DEFAULT_LOG_FILE, MAX_INTERVAL};
use display::{ConsoleSink, NullSink, StatusSink};
use metrics::SystemSensors;
use monitor::MonitorLoop;
use serial::discovery::{self, PortKind};
use serial::SerialPortChannel;
use shutdown::Shutdown;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Stream host health metrics to a serial-attached microcontroller
#[derive(Parser, Debug)]
#[command(name = "healthlink")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial port (auto-detected if omitted)
    #[arg(short, long)]
    port: Option<String>,

    /// Sampling interval in seconds
    #[arg(short, long, default_value = "5")]
    interval: f64,

    /// Session log file
    #[arg(short, long, default_value = DEFAULT_LOG_FILE)]
    file: PathBuf,

    /// Serial baud rate
    #[arg(long, default_value = "115200")]
    baud: u32,

    /// Window over which CPU utilization is measured (milliseconds)
    #[arg(long, default_value = "1000")]
    cpu_window_ms: u64,

    /// Stop after this many samples
    #[arg(long)]
    count: Option<u64>,

    /// Run for specified duration (seconds), then exit with summary
    #[arg(long)]
    duration: Option<u64>,

    /// Schedule ticks from their start time instead of after each tick's work
    #[arg(long)]
    fixed_rate: bool,

    /// Keep running after serial errors other than timeouts
    #[arg(long)]
    keep_going: bool,

    /// Disable the console display
    #[arg(short, long)]
    quiet: bool,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

impl Args {
    fn monitor_config(&self) -> Result<MonitorConfig> {
        let interval = Duration::try_from_secs_f64(self.interval)
            .ok()
            .filter(|interval| !interval.is_zero() && *interval <= MAX_INTERVAL)
            .with_context(|| {
                format!(
                    "--interval must be between 0 and {} seconds, got {}",
                    MAX_INTERVAL.as_secs(),
                    self.interval
                )
            })?;

        let mut config = MonitorConfig {
            interval,
            cpu_window: Duration::from_millis(self.cpu_window_ms),
            log_path: Some(self.file.clone()),
            stop_on_transport_error: !self.keep_going,
            cadence: if self.fixed_rate {
                Cadence::FixedRate
            } else {
                Cadence::FixedDelay
            },
            max_samples: self.count,
            duration: self.duration.map(Duration::from_secs),
            ..MonitorConfig::default()
        };
        config.serial.baud_rate = self.baud;
        Ok(config)
    }
}

fn list_ports() {
    let candidates = discovery::list_candidates();
    if candidates.is_empty() {
        println!("No serial ports found.");
        return;
    }

    let chosen = discovery::pick_port(&candidates);
    for candidate in &candidates {
        let kind = match candidate.kind {
            PortKind::Usb { vid, pid } => format!("usb {vid:04x}:{pid:04x}"),
            PortKind::Bluetooth => "bluetooth".to_string(),
            PortKind::Pci => "pci".to_string(),
            PortKind::Other => "other".to_string(),
        };
        let marker = if chosen.as_deref() == Some(candidate.device.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{marker} {:<20} {:<16} {}",
            candidate.device, kind, candidate.description
        );
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_tracing()?;

    if args.list_ports {
        list_ports();
        return Ok(());
    }

    let config = args.monitor_config()?;
    let port = discovery::resolve_port(args.port.clone()).context("No serial port to connect to")?;

    println!("Connecting to {port} at {} baud...", config.serial.baud_rate);
    println!(
        "Monitoring every {} seconds, logging to {}",
        config.interval.as_secs_f64(),
        args.file.display()
    );
    println!("Press Ctrl+C to stop");

    let sink: Box<dyn StatusSink> = if args.quiet {
        Box::new(NullSink)
    } else {
        Box::new(ConsoleSink::stdout())
    };
    let settings = config.serial.clone();
    let sensors = SystemSensors::new(config.cpu_window);
    let mut monitor = MonitorLoop::new(config, sensors, sink);
    let mut shutdown = Shutdown::new(shutdown::shutdown_signal());

    let report = monitor
        .run(|| SerialPortChannel::open(&port, &settings), &mut shutdown)
        .await
        .with_context(|| format!("Could not monitor over {port}"))?;

    info!(samples = report.samples, "session finished");
    println!();
    println!("Monitoring ended: {}", report.stop_reason);
    println!("Total samples collected: {}", report.samples);
    println!(
        "Total runtime: {:.1} minutes",
        report.runtime.as_secs_f64() / 60.0
    );
    for line in report.summary.lines() {
        println!("{line}");
    }
    if let Some(path) = &report.log_path {
        println!("Log saved to {}", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_build_reference_config() {
        let args = Args::parse_from(["healthlink"]);
        let config = args.monitor_config().unwrap();
        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.log_path, Some(PathBuf::from("health_monitor.txt")));
        assert_eq!(config.cadence, Cadence::FixedDelay);
        assert!(config.stop_on_transport_error);
    }

    #[test]
    fn cli_flags_map_onto_config() {
        let args = Args::parse_from([
            "healthlink",
            "-p",
            "/dev/ttyACM0",
            "-i",
            "1",
            "-f",
            "out.txt",
            "--count",
            "3",
            "--fixed-rate",
            "--keep-going",
        ]);
        assert_eq!(args.port.as_deref(), Some("/dev/ttyACM0"));
        let config = args.monitor_config().unwrap();
        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.max_samples, Some(3));
        assert_eq!(config.cadence, Cadence::FixedRate);
        assert!(!config.stop_on_transport_error);
    }

    #[test]
    fn non_positive_interval_is_rejected() {
        for value in ["0", "-1", "NaN"] {
            let args = Args::parse_from(["healthlink".to_string(), format!("--interval={value}")]);
            assert!(args.monitor_config().is_err(), "{value} accepted");
        }
    }

    #[test]
    fn oversized_interval_is_an_error_not_a_panic() {
        for value in ["1e20", "inf", "86401"] {
            let args = Args::parse_from(["healthlink", "--interval", value]);
            assert!(args.monitor_config().is_err(), "{value} accepted");
        }

        let args = Args::parse_from(["healthlink", "--interval", "86400"]);
        assert_eq!(args.monitor_config().unwrap().interval, MAX_INTERVAL);
    }
}
