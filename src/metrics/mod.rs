//! Host counter readers for CPU, memory, disk, network, processes and temperature.

pub mod cpu;
pub mod disk;
pub mod memory;
pub mod network;
#[cfg_attr(target_os = "linux", allow(dead_code))]
pub mod platform;
pub mod process;
pub mod thermal;

#[cfg(test)]
pub mod fake;

pub use network::NetCounters;

/// Sensors used by the binary on this platform
#[cfg(target_os = "linux")]
pub type SystemSensors = ProcfsSensors;
#[cfg(not(target_os = "linux"))]
pub type SystemSensors = platform::SysinfoSensors;

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;
use thermal::TemperatureProbes;

/// Raw host readings consumed by the sampler.
///
/// Each reading is independent so a failing counter can be degraded to a
/// default without losing the others.
pub trait HostSensors {
    fn cpu_percent(&mut self) -> Result<f64>;
    fn memory_percent(&mut self) -> Result<f64>;
    fn disk_percent(&mut self) -> Result<f64>;
    fn net_counters(&mut self) -> Result<NetCounters>;
    fn process_count(&mut self) -> Result<u64>;
    /// Best-effort; `None` when no probe produced a plausible value.
    fn cpu_temperature(&mut self) -> Option<f64>;
}

/// Sensors backed by /proc, statvfs and the platform thermal sources
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub struct ProcfsSensors {
    cpu: cpu::CpuCollector,
    disk_path: PathBuf,
    thermal: TemperatureProbes,
}

impl ProcfsSensors {
    pub fn new(cpu_window: Duration) -> Self {
        Self {
            cpu: cpu::CpuCollector::new(cpu_window),
            disk_path: PathBuf::from("/"),
            thermal: TemperatureProbes::system(),
        }
    }
}

impl HostSensors for ProcfsSensors {
    fn cpu_percent(&mut self) -> Result<f64> {
        self.cpu.utilization()
    }

    fn memory_percent(&mut self) -> Result<f64> {
        memory::used_percent()
    }

    fn disk_percent(&mut self) -> Result<f64> {
        disk::used_percent(&self.disk_path)
    }

    fn net_counters(&mut self) -> Result<NetCounters> {
        network::counters()
    }

    fn process_count(&mut self) -> Result<u64> {
        process::count()
    }

    fn cpu_temperature(&mut self) -> Option<f64> {
        self.thermal.read()
    }
}
