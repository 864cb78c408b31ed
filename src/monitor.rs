//! The sampling/transport loop and its session lifecycle.
//!
//! One logical task does everything in order: sample, log, send, read the
//! device's reply, render, then sleep until the next tick. Stop requests
//! are honoured between ticks, never in the middle of one.

use crate::config::{Cadence, MonitorConfig};
use crate::display::{MessageLog, StatusSink, StatusView};
use crate::error::{ChannelError, MonitorError};
use crate::history::RateHistory;
use crate::logging::{SessionLog, SessionSummary};
use crate::metrics::HostSensors;
use crate::sampler::MetricsSampler;
use crate::serial::SerialChannel;
use crate::shutdown::Shutdown;
use crate::transmit::{drain_inbound, FailureReason, TransmitSupervisor};
use chrono::Local;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Connecting,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Interrupted,
    SampleLimit,
    DurationElapsed,
    TransportFailure(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Interrupted => write!(f, "stopped by operator"),
            StopReason::SampleLimit => write!(f, "sample limit reached"),
            StopReason::DurationElapsed => write!(f, "duration elapsed"),
            StopReason::TransportFailure(msg) => write!(f, "serial link failed: {msg}"),
        }
    }
}

/// What a finished session did
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub samples: u64,
    pub runtime: Duration,
    pub stop_reason: StopReason,
    pub summary: SessionSummary,
    pub log_path: Option<PathBuf>,
}

pub struct MonitorLoop<S, D> {
    config: MonitorConfig,
    sampler: MetricsSampler<S>,
    history: RateHistory,
    supervisor: TransmitSupervisor,
    messages: MessageLog,
    summary: SessionSummary,
    sink: D,
    state: LoopState,
    sample_count: u64,
    prepared_log: Option<SessionLog>,
}

impl<S: HostSensors, D: StatusSink> MonitorLoop<S, D> {
    pub fn new(config: MonitorConfig, sensors: S, sink: D) -> Self {
        let sampler = MetricsSampler::new(sensors, config.rate_divisor_secs());
        Self {
            config,
            sampler,
            history: RateHistory::default(),
            supervisor: TransmitSupervisor::new(),
            messages: MessageLog::default(),
            summary: SessionSummary::new(),
            sink,
            state: LoopState::Idle,
            sample_count: 0,
            prepared_log: None,
        }
    }

    /// Use `log` instead of creating one from `config.log_path`
    #[cfg(test)]
    pub fn with_session_log(mut self, log: SessionLog) -> Self {
        self.prepared_log = Some(log);
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> LoopState {
        self.state
    }

    #[cfg(test)]
    pub fn messages(&self) -> &MessageLog {
        &self.messages
    }

    #[cfg(test)]
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    fn set_state(&mut self, next: LoopState) {
        debug!(from = ?self.state, to = ?next, "loop state");
        self.state = next;
    }

    /// Connect, run ticks until a stop condition, then shut down cleanly.
    pub async fn run<C, F>(
        &mut self,
        connect: F,
        shutdown: &mut Shutdown,
    ) -> Result<SessionReport, MonitorError>
    where
        C: SerialChannel,
        F: FnOnce() -> Result<C, ChannelError>,
    {
        self.set_state(LoopState::Connecting);
        let mut channel = match connect() {
            Ok(channel) => channel,
            Err(e) => {
                error!(error = %e, "could not open serial channel");
                self.set_state(LoopState::Stopped);
                return Err(MonitorError::Connect(e));
            }
        };
        let port = channel.name().to_string();
        info!(port = %port, "connected");
        self.set_state(LoopState::Running);

        let started = Instant::now();
        let mut stop_reason = None;

        tokio::select! {
            _ = sleep(self.config.settle_delay) => {}
            _ = shutdown.recv() => {
                stop_reason = Some(StopReason::Interrupted);
            }
        }
        for line in drain_inbound(&mut channel, self.config.startup_read_budget) {
            self.messages.push(format!("Device: {line}"));
        }

        // A stop during the settle delay leaves the previous log untouched
        let mut session_log = match stop_reason {
            Some(_) => None,
            None => self.open_log(&port),
        };
        let log_path = session_log.as_ref().map(|log| log.path().to_path_buf());

        let stop_reason = match stop_reason {
            Some(reason) => reason,
            None => {
                self.tick_until_stopped(&mut channel, &mut session_log, &port, started, shutdown)
                    .await
            }
        };

        self.set_state(LoopState::Stopping);
        let runtime = started.elapsed();
        info!(samples = self.sample_count, reason = %stop_reason, "stopping");

        if let Some(log) = session_log.as_mut() {
            if let Err(e) = log.finish(&self.summary, runtime) {
                warn!(error = %e, "failed to write log trailer");
            }
        }
        channel.close();
        self.set_state(LoopState::Stopped);

        Ok(SessionReport {
            samples: self.sample_count,
            runtime,
            stop_reason,
            summary: self.summary.clone(),
            log_path,
        })
    }

    fn open_log(&mut self, port: &str) -> Option<SessionLog> {
        if let Some(log) = self.prepared_log.take() {
            return Some(log);
        }
        let path = self.config.log_path.as_ref()?;
        match SessionLog::create(path, self.config.interval, port) {
            Ok(log) => {
                info!(path = %path.display(), "logging to file");
                Some(log)
            }
            Err(e) => {
                warn!(error = %e, "continuing without a log file");
                self.messages.push(format!("Log file unavailable: {e:#}"));
                None
            }
        }
    }

    async fn tick_until_stopped<C: SerialChannel>(
        &mut self,
        channel: &mut C,
        session_log: &mut Option<SessionLog>,
        port: &str,
        started: Instant,
        shutdown: &mut Shutdown,
    ) -> StopReason {
        loop {
            if shutdown.is_triggered() {
                return StopReason::Interrupted;
            }
            let tick_start = Instant::now();

            let snapshot = self.sampler.sample(&mut self.history);
            self.sample_count += 1;
            self.summary.add_sample(&snapshot);
            debug!(sample = self.sample_count, cpu = snapshot.cpu_percent, "sampled");

            if let Some(log) = session_log.as_mut() {
                if let Err(e) = log.append(self.sample_count, &snapshot) {
                    warn!(error = %e, "failed to append to log file");
                    self.messages.push(format!("Log write failed: {e:#}"));
                }
            }

            let result = self
                .supervisor
                .send(channel, &snapshot, &mut self.messages);
            self.summary.add_delivery(&result);

            if result.ok {
                sleep(self.config.response_delay).await;
                for line in drain_inbound(channel, self.config.read_budget) {
                    self.messages
                        .push(format!("[{}] {line}", Local::now().format("%H:%M:%S")));
                }
            }

            self.sink.render(&StatusView {
                sample_number: self.sample_count,
                snapshot: &snapshot,
                transmit: self.supervisor.state(),
                messages: &self.messages,
                port,
                log_path: session_log.as_ref().map(|log| log.path()),
                runtime: started.elapsed(),
                last_frame: self.supervisor.last_frame(),
            });

            if self.config.stop_on_transport_error {
                if let Some(FailureReason::Transport(msg)) = &result.reason {
                    return StopReason::TransportFailure(msg.clone());
                }
            }
            if self
                .config
                .max_samples
                .is_some_and(|max| self.sample_count >= max)
            {
                return StopReason::SampleLimit;
            }
            if self
                .config
                .duration
                .is_some_and(|limit| started.elapsed() >= limit)
            {
                return StopReason::DurationElapsed;
            }

            // Fixed delay drifts by the tick's own processing time
            let wake = match self.config.cadence {
                Cadence::FixedDelay => Instant::now() + self.config.interval,
                Cadence::FixedRate => tick_start + self.config.interval,
            };
            let interrupted = tokio::select! {
                _ = sleep_until(wake) => false,
                _ = shutdown.recv() => true,
            };
            if interrupted {
                return StopReason::Interrupted;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::FillingDisk;
    use crate::metrics::fake::ScriptedSensors;
    use crate::serial::fake::{FakeCall, FakeChannel};
    use std::cell::RefCell;
    use std::rc::Rc;
    use tokio::sync::broadcast;

    /// Records the sample number and clock time of every render
    #[derive(Clone, Default)]
    struct RecordingSink {
        renders: Rc<RefCell<Vec<u64>>>,
        rendered_at: Rc<RefCell<Vec<Instant>>>,
    }

    impl StatusSink for RecordingSink {
        fn render(&mut self, view: &StatusView<'_>) {
            self.renders.borrow_mut().push(view.sample_number);
            self.rendered_at.borrow_mut().push(Instant::now());
        }
    }

    impl RecordingSink {
        /// Gaps between consecutive renders, in whole milliseconds
        fn gaps_ms(&self) -> Vec<u128> {
            self.rendered_at
                .borrow()
                .windows(2)
                .map(|pair| (pair[1] - pair[0]).as_millis())
                .collect()
        }
    }

    fn test_config(log_path: Option<PathBuf>) -> MonitorConfig {
        MonitorConfig {
            interval: Duration::from_secs(1),
            cpu_window: Duration::ZERO,
            log_path,
            settle_delay: Duration::ZERO,
            startup_read_budget: Duration::from_millis(50),
            response_delay: Duration::ZERO,
            ..MonitorConfig::default()
        }
    }

    fn quiet_shutdown() -> (broadcast::Sender<()>, Shutdown) {
        let (tx, rx) = broadcast::channel(1);
        (tx, Shutdown::new(rx))
    }

    #[tokio::test(start_paused = true)]
    async fn three_ticks_write_three_json_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health_monitor.txt");
        let mut config = test_config(Some(path.clone()));
        config.max_samples = Some(3);

        let sink = RecordingSink::default();
        let mut monitor = MonitorLoop::new(config, ScriptedSensors::steady(), sink.clone());
        let fake = FakeChannel::new();
        let handle = fake.clone();
        let (_tx, mut shutdown) = quiet_shutdown();

        let report = monitor.run(move || Ok(fake), &mut shutdown).await.unwrap();

        assert_eq!(report.samples, 3);
        assert_eq!(report.stop_reason, StopReason::SampleLimit);
        assert_eq!(report.summary.frames_sent, 3);
        assert_eq!(report.log_path.as_deref(), Some(path.as_path()));
        assert_eq!(monitor.state(), LoopState::Stopped);
        assert_eq!(*sink.renders.borrow(), vec![1, 2, 3]);
        assert_eq!(handle.written_lines().len(), 3);
        assert!(handle.state().closed);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().filter(|l| l.starts_with("JSON: ")).count(), 3);
        assert!(content.starts_with("HOST HEALTH MONITOR LOG"));
        assert!(content.contains("Connected to: fake0"));
        assert!(content.contains("Total samples collected: 3"));
    }

    #[tokio::test(start_paused = true)]
    async fn connection_failure_stops_without_running() {
        let mut monitor = MonitorLoop::new(
            test_config(None),
            ScriptedSensors::steady(),
            RecordingSink::default(),
        );
        let (_tx, mut shutdown) = quiet_shutdown();

        let result = monitor
            .run(
                || -> Result<FakeChannel, ChannelError> {
                    Err(ChannelError::PermissionDenied {
                        port: "/dev/ttyACM0".into(),
                    })
                },
                &mut shutdown,
            )
            .await;

        assert!(matches!(
            result,
            Err(MonitorError::Connect(ChannelError::PermissionDenied { .. }))
        ));
        assert_eq!(monitor.state(), LoopState::Stopped);
        assert_eq!(monitor.sample_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_ends_the_session() {
        let fake = FakeChannel::new();
        fake.script_writes([Ok(()), Err(ChannelError::Disconnected("unplugged".into()))]);
        let handle = fake.clone();
        let mut monitor = MonitorLoop::new(
            test_config(None),
            ScriptedSensors::steady(),
            RecordingSink::default(),
        );
        let (_tx, mut shutdown) = quiet_shutdown();

        let report = monitor.run(move || Ok(fake), &mut shutdown).await.unwrap();

        assert_eq!(report.samples, 2);
        assert!(matches!(report.stop_reason, StopReason::TransportFailure(_)));
        assert_eq!(report.summary.failed_sends, 1);
        assert_eq!(handle.state().calls.last(), Some(&FakeCall::Close));
    }

    #[tokio::test(start_paused = true)]
    async fn keep_going_survives_transport_errors() {
        let fake = FakeChannel::new();
        fake.script_writes([Err(ChannelError::Disconnected("glitch".into()))]);
        let mut config = test_config(None);
        config.stop_on_transport_error = false;
        config.max_samples = Some(3);
        let mut monitor = MonitorLoop::new(config, ScriptedSensors::steady(), RecordingSink::default());
        let (_tx, mut shutdown) = quiet_shutdown();

        let report = monitor.run(move || Ok(fake), &mut shutdown).await.unwrap();
        assert_eq!(report.samples, 3);
        assert_eq!(report.summary.failed_sends, 1);
        assert_eq!(report.summary.frames_sent, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_are_never_fatal() {
        let fake = FakeChannel::new();
        fake.script_writes((0..4).map(|_| Err(ChannelError::Timeout)));
        let mut config = test_config(None);
        config.max_samples = Some(5);
        let mut monitor = MonitorLoop::new(config, ScriptedSensors::steady(), RecordingSink::default());
        let (_tx, mut shutdown) = quiet_shutdown();

        let report = monitor.run(move || Ok(fake), &mut shutdown).await.unwrap();
        assert_eq!(report.samples, 5);
        assert_eq!(report.stop_reason, StopReason::SampleLimit);
        assert_eq!(report.summary.write_timeouts, 4);
        assert_eq!(report.summary.frames_sent, 1);
        assert!(monitor
            .messages()
            .iter()
            .any(|m| m == "Too many consecutive timeouts; device may be busy"));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_request_is_honoured_between_ticks() {
        let mut monitor = MonitorLoop::new(
            test_config(None),
            ScriptedSensors::steady(),
            RecordingSink::default(),
        );
        let (tx, mut shutdown) = quiet_shutdown();
        tokio::spawn(async move {
            sleep(Duration::from_millis(2500)).await;
            let _ = tx.send(());
        });

        let report = monitor
            .run(move || Ok(FakeChannel::new()), &mut shutdown)
            .await
            .unwrap();

        assert_eq!(report.stop_reason, StopReason::Interrupted);
        assert_eq!(report.samples, 3);
        assert_eq!(monitor.state(), LoopState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn duration_limit_stops_the_session() {
        let mut config = test_config(None);
        config.duration = Some(Duration::from_millis(1500));
        let mut monitor = MonitorLoop::new(config, ScriptedSensors::steady(), RecordingSink::default());
        let (_tx, mut shutdown) = quiet_shutdown();

        let report = monitor
            .run(move || Ok(FakeChannel::new()), &mut shutdown)
            .await
            .unwrap();
        assert_eq!(report.stop_reason, StopReason::DurationElapsed);
        assert_eq!(report.samples, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unwritable_log_path_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(Some(dir.path().join("missing").join("log.txt")));
        config.max_samples = Some(2);
        let mut monitor = MonitorLoop::new(config, ScriptedSensors::steady(), RecordingSink::default());
        let (_tx, mut shutdown) = quiet_shutdown();

        let report = monitor
            .run(move || Ok(FakeChannel::new()), &mut shutdown)
            .await
            .unwrap();
        assert_eq!(report.samples, 2);
        assert_eq!(report.log_path, None);
        assert!(monitor
            .messages()
            .iter()
            .any(|m| m.starts_with("Log file unavailable")));
    }

    #[tokio::test(start_paused = true)]
    async fn startup_banner_is_recorded() {
        let fake = FakeChannel::new();
        fake.push_inbound(b"Pico health display ready\n");
        let mut config = test_config(None);
        config.max_samples = Some(1);
        let mut monitor = MonitorLoop::new(config, ScriptedSensors::steady(), RecordingSink::default());
        let (_tx, mut shutdown) = quiet_shutdown();

        monitor.run(move || Ok(fake), &mut shutdown).await.unwrap();
        assert!(monitor
            .messages()
            .iter()
            .any(|m| m == "Device: Pico health display ready"));
    }

    async fn render_gaps(cadence: Cadence) -> (Vec<u128>, Duration) {
        let mut config = test_config(None);
        config.cadence = cadence;
        config.response_delay = Duration::from_millis(300);
        config.max_samples = Some(3);
        let sink = RecordingSink::default();
        let mut monitor = MonitorLoop::new(config, ScriptedSensors::steady(), sink.clone());
        let (_tx, mut shutdown) = quiet_shutdown();

        let report = monitor
            .run(move || Ok(FakeChannel::new()), &mut shutdown)
            .await
            .unwrap();
        (sink.gaps_ms(), report.runtime)
    }

    fn near(actual_ms: u128, expected_ms: u128) -> bool {
        actual_ms.abs_diff(expected_ms) <= 5
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_delay_spacing_includes_tick_work() {
        let (gaps, runtime) = render_gaps(Cadence::FixedDelay).await;
        assert_eq!(gaps.len(), 2);
        assert!(gaps.iter().all(|gap| near(*gap, 1300)), "{gaps:?}");
        assert!(near(runtime.as_millis(), 2900), "{runtime:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_rate_spacing_absorbs_tick_work() {
        let (gaps, runtime) = render_gaps(Cadence::FixedRate).await;
        assert_eq!(gaps.len(), 2);
        assert!(gaps.iter().all(|gap| near(*gap, 1000)), "{gaps:?}");
        assert!(near(runtime.as_millis(), 2300), "{runtime:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_settle_keeps_previous_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health_monitor.txt");
        std::fs::write(&path, "previous session\n").unwrap();

        let mut config = test_config(Some(path.clone()));
        config.settle_delay = Duration::from_secs(2);
        let sink = RecordingSink::default();
        let mut monitor = MonitorLoop::new(config, ScriptedSensors::steady(), sink.clone());
        let fake = FakeChannel::new();
        let handle = fake.clone();
        let (tx, mut shutdown) = quiet_shutdown();
        tx.send(()).unwrap();

        let report = monitor.run(move || Ok(fake), &mut shutdown).await.unwrap();

        assert_eq!(report.stop_reason, StopReason::Interrupted);
        assert_eq!(report.samples, 0);
        assert_eq!(report.log_path, None);
        assert!(sink.renders.borrow().is_empty());
        assert!(handle.state().closed);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "previous session\n");
    }

    #[tokio::test(start_paused = true)]
    async fn log_append_failure_is_recorded_and_sampling_continues() {
        let disk = FillingDisk { writes_left: 2 };
        let log = SessionLog::with_writer(
            Box::new(disk),
            PathBuf::from("health_monitor.txt"),
            Duration::from_secs(1),
            "fake0",
        )
        .unwrap();
        let mut config = test_config(None);
        config.max_samples = Some(3);
        let mut monitor = MonitorLoop::new(config, ScriptedSensors::steady(), RecordingSink::default())
            .with_session_log(log);
        let fake = FakeChannel::new();
        let handle = fake.clone();
        let (_tx, mut shutdown) = quiet_shutdown();

        let report = monitor.run(move || Ok(fake), &mut shutdown).await.unwrap();

        assert_eq!(report.samples, 3);
        assert_eq!(report.stop_reason, StopReason::SampleLimit);
        assert_eq!(report.summary.frames_sent, 3);
        assert_eq!(handle.written_lines().len(), 3);
        let failures = monitor
            .messages()
            .iter()
            .filter(|m| m.starts_with("Log write failed"))
            .count();
        assert_eq!(failures, 2);
    }
}
