//! Best-effort CPU temperature probing.
//!
//! Probes are tried in a fixed priority order and the first plausible
//! reading wins. Missing sensors, unreadable files and out-of-range values
//! are skipped silently; temperature is never fatal and never retried
//! within a tick.

use crate::config::TEMPERATURE_RANGE;
use std::fs;
use std::path::PathBuf;
use sysinfo::Components;

/// A single source of CPU temperature readings
pub trait TemperatureProbe {
    fn name(&self) -> &'static str;

    /// Raw readings in probe order, already converted to degrees Celsius.
    fn readings(&mut self) -> Vec<f64>;
}

/// Convert a raw sysfs value; values above 1000 are millidegrees.
pub fn normalize_celsius(raw: f64) -> f64 {
    if raw > 1000.0 {
        raw / 1000.0
    } else {
        raw
    }
}

pub fn is_plausible(celsius: f64) -> bool {
    TEMPERATURE_RANGE.contains(&celsius)
}

fn read_sysfs_celsius(path: &PathBuf) -> Option<f64> {
    let raw = fs::read_to_string(path).ok()?;
    let value: f64 = raw.trim().parse().ok()?;
    Some(normalize_celsius(value))
}

/// Linux thermal zones (/sys/class/thermal/thermal_zoneN/temp)
pub struct ThermalZoneProbe {
    paths: Vec<PathBuf>,
}

impl ThermalZoneProbe {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

impl Default for ThermalZoneProbe {
    fn default() -> Self {
        Self::new(vec![
            PathBuf::from("/sys/class/thermal/thermal_zone0/temp"),
            PathBuf::from("/sys/class/thermal/thermal_zone1/temp"),
        ])
    }
}

impl TemperatureProbe for ThermalZoneProbe {
    fn name(&self) -> &'static str {
        "thermal_zone"
    }

    fn readings(&mut self) -> Vec<f64> {
        self.paths.iter().filter_map(read_sysfs_celsius).collect()
    }
}

/// Linux hardware monitor chips (/sys/class/hwmon/hwmonN/temp1_input)
pub struct HwmonProbe {
    paths: Vec<PathBuf>,
}

impl HwmonProbe {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

impl Default for HwmonProbe {
    fn default() -> Self {
        Self::new(vec![
            PathBuf::from("/sys/class/hwmon/hwmon0/temp1_input"),
            PathBuf::from("/sys/class/hwmon/hwmon1/temp1_input"),
        ])
    }
}

impl TemperatureProbe for HwmonProbe {
    fn name(&self) -> &'static str {
        "hwmon"
    }

    fn readings(&mut self) -> Vec<f64> {
        self.paths.iter().filter_map(read_sysfs_celsius).collect()
    }
}

/// Cross-platform sensor API (components labelled as CPU, core or package)
#[derive(Default)]
pub struct PlatformSensorProbe {
    components: Option<Components>,
}

impl TemperatureProbe for PlatformSensorProbe {
    fn name(&self) -> &'static str {
        "platform"
    }

    fn readings(&mut self) -> Vec<f64> {
        let fresh = self.components.is_none();
        let components = self
            .components
            .get_or_insert_with(Components::new_with_refreshed_list);
        if !fresh {
            components.refresh();
        }

        components
            .list()
            .iter()
            .filter(|c| {
                let label = c.label().to_lowercase();
                label.contains("cpu") || label.contains("core") || label.contains("package")
            })
            .map(|c| c.temperature() as f64)
            .filter(|t| t.is_finite())
            .collect()
    }
}

/// Ordered set of probes
pub struct TemperatureProbes {
    probes: Vec<Box<dyn TemperatureProbe>>,
}

impl TemperatureProbes {
    pub fn new(probes: Vec<Box<dyn TemperatureProbe>>) -> Self {
        Self { probes }
    }

    /// Thermal zones, then hwmon, then the platform sensor API
    pub fn system() -> Self {
        Self::new(vec![
            Box::new(ThermalZoneProbe::default()),
            Box::new(HwmonProbe::default()),
            Box::new(PlatformSensorProbe::default()),
        ])
    }

    /// First plausible reading, rounded to one decimal
    pub fn read(&mut self) -> Option<f64> {
        for probe in &mut self.probes {
            if let Some(celsius) = probe.readings().into_iter().find(|t| is_plausible(*t)) {
                tracing::debug!(probe = probe.name(), celsius, "cpu temperature");
                return Some(crate::snapshot::round1(celsius));
            }
        }
        None
    }
}
