//! Scripted host sensors for tests.

use super::{HostSensors, NetCounters};
use anyhow::{anyhow, Result};
use std::collections::VecDeque;

/// Fixed readings plus a queue of network counters. Each `fail_*` flag
/// makes the matching read return an error.
#[derive(Default)]
pub struct ScriptedSensors {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
    pub processes: u64,
    pub temperature: Option<f64>,
    pub counters: VecDeque<NetCounters>,
    pub fail_cpu: bool,
    pub fail_memory: bool,
    pub fail_disk: bool,
    pub fail_net: bool,
    pub fail_processes: bool,
}

impl ScriptedSensors {
    pub fn steady() -> Self {
        Self {
            cpu: 12.34,
            memory: 56.78,
            disk: 40.0,
            processes: 123,
            ..Default::default()
        }
    }

    pub fn with_counters(mut self, counters: &[(u64, u64)]) -> Self {
        self.counters = counters
            .iter()
            .map(|&(bytes_received, bytes_sent)| NetCounters {
                bytes_received,
                bytes_sent,
            })
            .collect();
        self
    }
}

fn scripted<T>(fail: bool, what: &str, value: T) -> Result<T> {
    if fail {
        Err(anyhow!("{what} unavailable"))
    } else {
        Ok(value)
    }
}

impl HostSensors for ScriptedSensors {
    fn cpu_percent(&mut self) -> Result<f64> {
        scripted(self.fail_cpu, "cpu", self.cpu)
    }

    fn memory_percent(&mut self) -> Result<f64> {
        scripted(self.fail_memory, "memory", self.memory)
    }

    fn disk_percent(&mut self) -> Result<f64> {
        scripted(self.fail_disk, "disk", self.disk)
    }

    fn net_counters(&mut self) -> Result<NetCounters> {
        if self.fail_net {
            return Err(anyhow!("network counters unavailable"));
        }
        // Repeat the last scripted value once the queue runs dry
        let next = if self.counters.len() > 1 {
            self.counters.pop_front()
        } else {
            self.counters.front().copied()
        };
        Ok(next.unwrap_or_default())
    }

    fn process_count(&mut self) -> Result<u64> {
        scripted(self.fail_processes, "process list", self.processes)
    }

    fn cpu_temperature(&mut self) -> Option<f64> {
        self.temperature
    }
}
