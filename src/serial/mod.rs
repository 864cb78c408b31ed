//! Byte-oriented serial transport consumed by the transmit supervisor.

pub mod discovery;
pub mod port;

#[cfg(test)]
pub mod fake;

pub use port::SerialPortChannel;

use crate::error::ChannelError;
use std::time::Duration;

/// An opened serial link to the device.
pub trait SerialChannel {
    /// Port identifier, for logs and the operator surface
    fn name(&self) -> &str;

    /// Write a whole frame within the write timeout.
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), ChannelError>;

    /// Unread inbound bytes currently buffered
    fn bytes_available(&mut self) -> Result<usize, ChannelError>;

    /// Drop all unread inbound bytes.
    fn discard_input(&mut self) -> Result<(), ChannelError>;

    /// Read one line (without its terminator), waiting at most `max_wait`.
    fn read_line(&mut self, max_wait: Duration) -> Result<Option<String>, ChannelError>;

    /// Release the port. Idempotent and silent on an already broken link.
    fn close(&mut self);
}

impl<C: SerialChannel + ?Sized> SerialChannel for Box<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        (**self).write_frame(frame)
    }

    fn bytes_available(&mut self) -> Result<usize, ChannelError> {
        (**self).bytes_available()
    }

    fn discard_input(&mut self) -> Result<(), ChannelError> {
        (**self).discard_input()
    }

    fn read_line(&mut self, max_wait: Duration) -> Result<Option<String>, ChannelError> {
        (**self).read_line(max_wait)
    }

    fn close(&mut self) {
        (**self).close()
    }
}
