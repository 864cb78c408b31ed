//! Serial port auto-discovery.
//!
//! Heuristic and environment-specific: skip Bluetooth ports, prefer ports
//! that identify as a Raspberry Pi Pico / RP2040, otherwise fall back to
//! the first USB serial device.

use crate::error::ChannelError;
use serialport::SerialPortType;
use std::io::{self, BufRead, IsTerminal, Write};
use tracing::{debug, info, warn};

/// USB vendor id assigned to Raspberry Pi (Pico boards)
const RASPBERRY_PI_VID: u16 = 0x2E8A;

const PREFERRED_MARKERS: [&str; 2] = ["Pico", "RP2040"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Usb { vid: u16, pid: u16 },
    Bluetooth,
    Pci,
    Other,
}

/// An enumerated port and a human-readable description of it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCandidate {
    pub device: String,
    pub description: String,
    pub kind: PortKind,
}

impl PortCandidate {
    pub fn is_bluetooth(&self) -> bool {
        let upper = self.description.to_uppercase();
        self.kind == PortKind::Bluetooth || upper.contains("BLUETOOTH") || upper.contains("BT")
    }

    pub fn is_preferred(&self) -> bool {
        matches!(self.kind, PortKind::Usb { vid, .. } if vid == RASPBERRY_PI_VID)
            || PREFERRED_MARKERS
                .iter()
                .any(|marker| self.description.contains(marker))
    }

    pub fn is_usb(&self) -> bool {
        matches!(self.kind, PortKind::Usb { .. })
    }
}

/// Choose a port: a preferred device first, else the first USB device.
pub fn pick_port(candidates: &[PortCandidate]) -> Option<String> {
    let usable: Vec<&PortCandidate> = candidates.iter().filter(|c| !c.is_bluetooth()).collect();

    usable
        .iter()
        .find(|c| c.is_preferred())
        .or_else(|| usable.iter().find(|c| c.is_usb()))
        .map(|c| c.device.clone())
}

/// Enumerate the serial ports the OS knows about
pub fn list_candidates() -> Vec<PortCandidate> {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            warn!(error = %e, "could not enumerate serial ports");
            return Vec::new();
        }
    };

    ports
        .into_iter()
        .map(|info| {
            let (kind, description) = match info.port_type {
                SerialPortType::UsbPort(usb) => {
                    let description = [usb.manufacturer, usb.product]
                        .into_iter()
                        .flatten()
                        .collect::<Vec<_>>()
                        .join(" ");
                    (
                        PortKind::Usb {
                            vid: usb.vid,
                            pid: usb.pid,
                        },
                        if description.is_empty() {
                            "USB Serial Device".to_string()
                        } else {
                            format!("{description} (USB Serial)")
                        },
                    )
                }
                SerialPortType::BluetoothPort => (PortKind::Bluetooth, "Bluetooth".to_string()),
                SerialPortType::PciPort => (PortKind::Pci, "PCI serial".to_string()),
                SerialPortType::Unknown => (PortKind::Other, "Unknown".to_string()),
            };
            PortCandidate {
                device: info.port_name,
                description,
                kind,
            }
        })
        .collect()
}

/// Scan the system and pick a port, logging what was seen
pub fn discover_port() -> Option<String> {
    let candidates = list_candidates();
    for candidate in &candidates {
        debug!(device = %candidate.device, description = %candidate.description, "serial port candidate");
    }
    pick_port(&candidates)
}

/// Ask the operator for a port when running interactively
pub fn prompt_for_port() -> Option<String> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return None;
    }

    print!("Could not find the device automatically. Enter serial port (e.g. /dev/ttyACM0 or COM9): ");
    io::stdout().flush().ok()?;

    let mut line = String::new();
    stdin.lock().read_line(&mut line).ok()?;
    let port = line.trim();
    (!port.is_empty()).then(|| port.to_string())
}

/// Use the explicit port if given, else discover one, else ask.
pub fn resolve_port(explicit: Option<String>) -> Result<String, ChannelError> {
    if let Some(port) = explicit {
        return Ok(port);
    }
    if let Some(port) = discover_port() {
        info!(port = %port, "auto-detected serial port");
        return Ok(port);
    }
    prompt_for_port().ok_or(ChannelError::NoDevice)
}
