//! Scripted in-memory serial channel used in tests.

use super::SerialChannel;
use crate::error::ChannelError;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

/// Channel operations in the order they happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    Discard,
    Write,
    Close,
}

#[derive(Default)]
pub struct FakeState {
    pub inbound: VecDeque<u8>,
    pub write_script: VecDeque<Result<(), ChannelError>>,
    pub writes: Vec<Vec<u8>>,
    pub calls: Vec<FakeCall>,
    pub closed: bool,
    pub fail_bytes_available: bool,
    /// A peer that never stops talking: this line, after this pause
    pub chatter: Option<(String, Duration)>,
    pub reads: usize,
}

/// Clones share state, so a test can keep a handle after the loop has
/// taken ownership of the channel.
#[derive(Clone, Default)]
pub struct FakeChannel {
    state: Rc<RefCell<FakeState>>,
}

impl FakeChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of upcoming writes; unscripted writes succeed.
    pub fn script_writes(&self, outcomes: impl IntoIterator<Item = Result<(), ChannelError>>) {
        self.state.borrow_mut().write_script.extend(outcomes);
    }

    pub fn push_inbound(&self, bytes: &[u8]) {
        self.state.borrow_mut().inbound.extend(bytes.iter().copied());
    }

    pub fn state(&self) -> std::cell::Ref<'_, FakeState> {
        self.state.borrow()
    }

    pub fn state_mut(&self) -> std::cell::RefMut<'_, FakeState> {
        self.state.borrow_mut()
    }

    pub fn written_lines(&self) -> Vec<String> {
        self.state
            .borrow()
            .writes
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }
}

impl SerialChannel for FakeChannel {
    fn name(&self) -> &str {
        "fake0"
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        let mut state = self.state.borrow_mut();
        if state.closed {
            return Err(ChannelError::Closed);
        }
        state.calls.push(FakeCall::Write);
        let outcome = state.write_script.pop_front().unwrap_or(Ok(()));
        if outcome.is_ok() {
            state.writes.push(frame.to_vec());
        }
        outcome
    }

    fn bytes_available(&mut self) -> Result<usize, ChannelError> {
        let state = self.state.borrow();
        if state.fail_bytes_available {
            return Err(ChannelError::Disconnected("device vanished".into()));
        }
        match &state.chatter {
            Some((line, _)) => Ok(line.len() + 1),
            None => Ok(state.inbound.len()),
        }
    }

    fn discard_input(&mut self) -> Result<(), ChannelError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(FakeCall::Discard);
        state.inbound.clear();
        Ok(())
    }

    fn read_line(&mut self, max_wait: Duration) -> Result<Option<String>, ChannelError> {
        let mut state = self.state.borrow_mut();
        state.reads += 1;
        if let Some((line, pause)) = &state.chatter {
            std::thread::sleep((*pause).min(max_wait));
            return Ok(Some(line.clone()));
        }
        let Some(end) = state.inbound.iter().position(|b| *b == b'\n') else {
            return Ok(None);
        };
        let line: Vec<u8> = state.inbound.drain(..=end).collect();
        Ok(Some(String::from_utf8_lossy(&line).trim().to_string()))
    }

    fn close(&mut self) {
        let mut state = self.state.borrow_mut();
        if !state.closed {
            state.closed = true;
            state.calls.push(FakeCall::Close);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_writes_and_shared_state() {
        let fake = FakeChannel::new();
        fake.script_writes([Err(ChannelError::Timeout)]);
        let mut channel = fake.clone();

        assert!(channel.write_frame(b"a\n").unwrap_err().is_timeout());
        channel.write_frame(b"b\n").unwrap();
        assert_eq!(fake.written_lines(), vec!["b\n".to_string()]);
        assert_eq!(fake.state().calls, vec![FakeCall::Write, FakeCall::Write]);
    }

    #[test]
    fn reads_complete_lines_only() {
        let mut fake = FakeChannel::new();
        fake.push_inbound(b"hello\r\npartial");
        assert_eq!(fake.read_line(Duration::ZERO).unwrap().as_deref(), Some("hello"));
        assert_eq!(fake.read_line(Duration::ZERO).unwrap(), None);
        assert_eq!(fake.bytes_available().unwrap(), "partial".len());
    }

    #[test]
    fn chatter_never_runs_dry() {
        let mut fake = FakeChannel::new();
        fake.state_mut().chatter = Some(("tick".into(), Duration::ZERO));
        for _ in 0..3 {
            assert_eq!(fake.read_line(Duration::ZERO).unwrap().as_deref(), Some("tick"));
        }
        assert_eq!(fake.bytes_available().unwrap(), 5);
        assert_eq!(fake.state().reads, 3);
    }

    #[test]
    fn close_is_idempotent() {
        let mut fake = FakeChannel::new();
        fake.close();
        fake.close();
        assert_eq!(fake.state().calls, vec![FakeCall::Close]);
        assert!(matches!(fake.write_frame(b"x"), Err(ChannelError::Closed)));
    }
}
