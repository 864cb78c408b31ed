//! Error types for the serial channel and the monitoring session.

use thiserror::Error;

/// Failures reported by a serial channel.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("write timed out")]
    Timeout,

    #[error("no serial device found and no port was entered")]
    NoDevice,

    #[error("serial port {port} does not exist")]
    NotFound { port: String },

    #[error("permission denied on {port}: the port is probably open in another program")]
    PermissionDenied { port: String },

    #[error("serial device disconnected: {0}")]
    Disconnected(String),

    #[error("serial channel is closed")]
    Closed,

    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChannelError {
    /// Timeouts are transient and never end a session.
    pub fn is_timeout(&self) -> bool {
        match self {
            ChannelError::Timeout => true,
            ChannelError::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }

    /// Classify an I/O error from a read or write.
    pub fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => ChannelError::Timeout,
            std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::UnexpectedEof => ChannelError::Disconnected(err.to_string()),
            _ => ChannelError::Io(err),
        }
    }
}

/// Failures that end a session before it reaches `Running`.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("connection failed: {0}")]
    Connect(#[source] ChannelError),
}
