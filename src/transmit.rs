//! Frame delivery over a serial channel with timeout accounting.

use crate::config::{BACKLOG_DISCARD_THRESHOLD, MAX_CONSECUTIVE_TIMEOUTS};
use crate::display::MessageLog;
use crate::error::ChannelError;
use crate::serial::SerialChannel;
use crate::snapshot::Snapshot;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Back-to-back write timeout accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmitState {
    pub consecutive_timeouts: u32,
    pub max_consecutive_timeouts: u32,
}

impl Default for TransmitState {
    fn default() -> Self {
        Self {
            consecutive_timeouts: 0,
            max_consecutive_timeouts: MAX_CONSECUTIVE_TIMEOUTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Write did not complete within the write timeout
    Timeout,
    /// Any other channel failure (device gone, permission, closed)
    Transport(String),
    /// The snapshot could not be serialized
    Encode(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout => write!(f, "write timeout"),
            FailureReason::Transport(msg) => write!(f, "transport error: {msg}"),
            FailureReason::Encode(msg) => write!(f, "encode error: {msg}"),
        }
    }
}

/// Outcome of one send attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    pub ok: bool,
    pub reason: Option<FailureReason>,
}

impl DeliveryResult {
    pub fn delivered() -> Self {
        Self { ok: true, reason: None }
    }

    pub fn failed(reason: FailureReason) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.reason, Some(FailureReason::Timeout))
    }

    /// Only permanent transport errors can end a session.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self.reason, Some(FailureReason::Transport(_)))
    }
}

#[derive(Debug, Default)]
pub struct TransmitSupervisor {
    state: TransmitState,
    last_frame: Option<String>,
}

impl TransmitSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &TransmitState {
        &self.state
    }

    /// The last frame handed to the channel, successful or not.
    pub fn last_frame(&self) -> Option<&str> {
        self.last_frame.as_deref()
    }

    /// Encode `snapshot` and make a single write attempt.
    pub fn send<C: SerialChannel + ?Sized>(
        &mut self,
        channel: &mut C,
        snapshot: &Snapshot,
        messages: &mut MessageLog,
    ) -> DeliveryResult {
        let frame = match snapshot.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "failed to encode snapshot");
                messages.push(format!("Encode error: {e}"));
                return DeliveryResult::failed(FailureReason::Encode(e.to_string()));
            }
        };
        self.last_frame = Some(String::from_utf8_lossy(&frame).into_owned());

        if let Err(e) = discard_backlog(channel) {
            return self.record_error(e, messages);
        }

        match channel.write_frame(&frame) {
            Ok(()) => {
                self.state.consecutive_timeouts = 0;
                debug!(bytes = frame.len(), port = channel.name(), "frame delivered");
                DeliveryResult::delivered()
            }
            Err(e) => self.record_error(e, messages),
        }
    }

    fn record_error(&mut self, err: ChannelError, messages: &mut MessageLog) -> DeliveryResult {
        if err.is_timeout() {
            return self.record_timeout(messages);
        }
        error!(error = %err, "serial write failed");
        messages.push(format!("Serial error: {err}"));
        DeliveryResult::failed(FailureReason::Transport(err.to_string()))
    }

    fn record_timeout(&mut self, messages: &mut MessageLog) -> DeliveryResult {
        let threshold = self.state.max_consecutive_timeouts;
        self.state.consecutive_timeouts += 1;
        let consecutive = self.state.consecutive_timeouts;
        messages.push(format!("Write timeout ({consecutive}/{threshold})"));

        if consecutive >= threshold {
            warn!(consecutive, threshold, "too many consecutive write timeouts");
            messages.push("Too many consecutive timeouts; device may be busy");
            self.state.consecutive_timeouts = 0;
        } else {
            debug!(consecutive, threshold, "write timed out");
        }
        DeliveryResult::failed(FailureReason::Timeout)
    }
}

/// Drop the inbound backlog if it has grown past the threshold.
fn discard_backlog<C: SerialChannel + ?Sized>(channel: &mut C) -> Result<(), ChannelError> {
    let waiting = channel.bytes_available()?;
    if waiting > BACKLOG_DISCARD_THRESHOLD {
        debug!(bytes = waiting, "discarding inbound backlog");
        channel.discard_input()?;
    }
    Ok(())
}

/// Read complete inbound lines while bytes are waiting, for at most `budget`.
///
/// An idle channel returns at once. Errors end the drain early; they are
/// logged, not propagated.
pub fn drain_inbound<C: SerialChannel + ?Sized>(channel: &mut C, budget: Duration) -> Vec<String> {
    let deadline = Instant::now() + budget;
    let mut lines = Vec::new();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match channel.bytes_available() {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "failed to poll device for input");
                break;
            }
        }
        match channel.read_line(remaining) {
            Ok(Some(line)) if line.is_empty() => continue,
            Ok(Some(line)) => lines.push(line),
            Ok(None) => break,
            Err(e) if e.is_timeout() => break,
            Err(e) => {
                warn!(error = %e, "failed to read from device");
                break;
            }
        }
    }

    if !lines.is_empty() {
        debug!(count = lines.len(), "drained inbound lines");
    }
    lines
}
