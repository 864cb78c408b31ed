//! Host sensors backed by sysinfo, for platforms without /proc.

use super::disk::FsUsage;
use super::thermal::TemperatureProbes;
use super::{HostSensors, NetCounters};
use anyhow::{ensure, Context, Result};
use std::path::Path;
use std::time::Duration;
use sysinfo::{Disks, Networks, System, MINIMUM_CPU_UPDATE_INTERVAL};

pub struct SysinfoSensors {
    system: System,
    disks: Disks,
    networks: Networks,
    cpu_window: Duration,
    thermal: TemperatureProbes,
}

impl SysinfoSensors {
    pub fn new(cpu_window: Duration) -> Self {
        Self {
            system: System::new(),
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
            cpu_window: cpu_window.max(MINIMUM_CPU_UPDATE_INTERVAL),
            thermal: TemperatureProbes::system(),
        }
    }
}

impl HostSensors for SysinfoSensors {
    /// Blocks for the measurement window between two CPU refreshes.
    fn cpu_percent(&mut self) -> Result<f64> {
        self.system.refresh_cpu();
        std::thread::sleep(self.cpu_window);
        self.system.refresh_cpu();
        Ok(self.system.global_cpu_info().cpu_usage() as f64)
    }

    fn memory_percent(&mut self) -> Result<f64> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        ensure!(total > 0, "total memory reported as zero");
        let used = total.saturating_sub(self.system.available_memory());
        Ok(100.0 * used as f64 / total as f64)
    }

    fn disk_percent(&mut self) -> Result<f64> {
        self.disks.refresh();
        let mounts: Vec<(&Path, FsUsage)> = self
            .disks
            .list()
            .iter()
            .map(|d| {
                (
                    d.mount_point(),
                    FsUsage {
                        total_bytes: d.total_space(),
                        free_bytes: d.available_space(),
                    },
                )
            })
            .collect();
        let usage = system_disk(&mounts).context("No mounted disks reported")?;
        Ok(usage.used_percent())
    }

    fn net_counters(&mut self) -> Result<NetCounters> {
        self.networks.refresh();
        Ok(self
            .networks
            .list()
            .iter()
            .filter(|(name, _)| !is_loopback(name))
            .fold(NetCounters::default(), |acc, (_, data)| NetCounters {
                bytes_received: acc.bytes_received + data.total_received(),
                bytes_sent: acc.bytes_sent + data.total_transmitted(),
            }))
    }

    fn process_count(&mut self) -> Result<u64> {
        self.system.refresh_processes();
        Ok(self.system.processes().len() as u64)
    }

    fn cpu_temperature(&mut self) -> Option<f64> {
        self.thermal.read()
    }
}

/// The root filesystem, else the `C:` drive, else the first mount.
pub fn system_disk(mounts: &[(&Path, FsUsage)]) -> Option<FsUsage> {
    let find = |wanted: &str| {
        mounts
            .iter()
            .find(|(mount, _)| mount.to_string_lossy().eq_ignore_ascii_case(wanted))
    };
    find("/")
        .or_else(|| find("C:\\"))
        .or_else(|| mounts.first())
        .map(|(_, usage)| *usage)
}

fn is_loopback(name: &str) -> bool {
    name == "lo" || name.starts_with("lo0") || name.contains("Loopback")
}
