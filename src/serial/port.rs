//! `SerialChannel` over a real serial device.

use super::SerialChannel;
use crate::config::SerialSettings;
use crate::error::ChannelError;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub struct SerialPortChannel {
    name: String,
    port: Option<Box<dyn SerialPort>>,
    settings: SerialSettings,
    /// Bytes read but not yet returned as a complete line
    pending: Vec<u8>,
}

impl SerialPortChannel {
    /// Open `name` at the configured baud rate, 8N1, no flow control.
    pub fn open(name: &str, settings: &SerialSettings) -> Result<Self, ChannelError> {
        let port = serialport::new(name, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(settings.read_timeout)
            .open()
            .map_err(|e| classify_open_error(name, e))?;

        info!(port = name, baud = settings.baud_rate, "serial port opened");

        Ok(Self {
            name: name.to_string(),
            port: Some(port),
            settings: settings.clone(),
            pending: Vec::new(),
        })
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, ChannelError> {
        self.port.as_mut().ok_or(ChannelError::Closed)
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }
}

fn classify_open_error(name: &str, err: serialport::Error) -> ChannelError {
    match err.kind() {
        serialport::ErrorKind::NoDevice => ChannelError::NotFound {
            port: name.to_string(),
        },
        serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            ChannelError::PermissionDenied {
                port: name.to_string(),
            }
        }
        serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => ChannelError::NotFound {
            port: name.to_string(),
        },
        _ => ChannelError::Disconnected(err.to_string()),
    }
}

fn classify_port_error(err: serialport::Error) -> ChannelError {
    match err.kind() {
        serialport::ErrorKind::Io(kind) => ChannelError::from_io(std::io::Error::new(kind, err)),
        _ => ChannelError::Disconnected(err.to_string()),
    }
}

impl SerialChannel for SerialPortChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        let write_timeout = self.settings.write_timeout;
        let read_timeout = self.settings.read_timeout;
        let port = self.port()?;

        port.set_timeout(write_timeout).map_err(classify_port_error)?;
        let result = port.write_all(frame).and_then(|_| port.flush());
        // Restore the read timeout even when the write failed
        let _ = port.set_timeout(read_timeout);

        result.map_err(ChannelError::from_io)?;
        debug!(bytes = frame.len(), "frame written");
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize, ChannelError> {
        let buffered = self.pending.len();
        let waiting = self.port()?.bytes_to_read().map_err(classify_port_error)?;
        Ok(buffered + waiting as usize)
    }

    fn discard_input(&mut self) -> Result<(), ChannelError> {
        self.pending.clear();
        self.port()?
            .clear(ClearBuffer::Input)
            .map_err(classify_port_error)
    }

    fn read_line(&mut self, max_wait: Duration) -> Result<Option<String>, ChannelError> {
        let deadline = Instant::now() + max_wait;
        let read_timeout = self.settings.read_timeout;
        let mut buf = [0u8; 256];

        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let port = self.port()?;
            port.set_timeout((deadline - now).min(read_timeout))
                .map_err(classify_port_error)?;
            match port.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => return Ok(None),
                Err(e) => return Err(ChannelError::from_io(e)),
            }
        }
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            self.pending.clear();
            info!(port = %self.name, "serial port closed");
        }
    }
}

impl Drop for SerialPortChannel {
    fn drop(&mut self) {
        self.close();
    }
}
