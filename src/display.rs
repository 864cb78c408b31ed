//! Operator surface: plain console rendering of the current session state.

use crate::config::MESSAGE_LOG_CAPACITY;
use crate::snapshot::Snapshot;
use crate::transmit::TransmitState;
use crossterm::{
    cursor::MoveTo,
    execute,
    style::Stylize,
    terminal::{Clear, ClearType},
};
use num_format::{Locale, ToFormattedString};
use std::collections::VecDeque;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

/// Thresholds above which a metric is flagged on the console
pub const CPU_HOT: f64 = 80.0;
pub const MEMORY_HOT: f64 = 85.0;
pub const DISK_HOT: f64 = 90.0;

const FRAME_PREVIEW_LEN: usize = 70;

/// Most recent operator-visible messages, oldest first
#[derive(Debug, Clone)]
pub struct MessageLog {
    entries: VecDeque<String>,
    capacity: usize,
}

impl MessageLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(message.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    #[cfg(test)]
    pub fn latest(&self) -> Option<&str> {
        self.entries.back().map(String::as_str)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(MESSAGE_LOG_CAPACITY)
    }
}

/// Everything a sink may show after a tick
pub struct StatusView<'a> {
    pub sample_number: u64,
    pub snapshot: &'a Snapshot,
    pub transmit: &'a TransmitState,
    pub messages: &'a MessageLog,
    pub port: &'a str,
    pub log_path: Option<&'a Path>,
    pub runtime: Duration,
    pub last_frame: Option<&'a str>,
}

/// Presentation sink the monitor loop renders into once per tick
pub trait StatusSink {
    fn render(&mut self, view: &StatusView<'_>);
}

impl<T: StatusSink + ?Sized> StatusSink for Box<T> {
    fn render(&mut self, view: &StatusView<'_>) {
        (**self).render(view)
    }
}

/// Discards everything (`--quiet`, tests)
#[derive(Debug, Default)]
pub struct NullSink;

impl StatusSink for NullSink {
    fn render(&mut self, _view: &StatusView<'_>) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Header,
    Normal,
    Hot,
    Dim,
}

/// Redraws the whole terminal each tick
pub struct ConsoleSink<W: Write> {
    out: W,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn draw(&mut self, view: &StatusView<'_>) -> io::Result<()> {
        execute!(self.out, Clear(ClearType::All), MoveTo(0, 0))?;
        for (line, tone) in status_lines(view) {
            match tone {
                Tone::Header => writeln!(self.out, "{}", line.cyan().bold())?,
                Tone::Hot => writeln!(self.out, "{}", line.red().bold())?,
                Tone::Dim => writeln!(self.out, "{}", line.dark_grey())?,
                Tone::Normal => writeln!(self.out, "{line}")?,
            }
        }
        self.out.flush()
    }
}

impl<W: Write> StatusSink for ConsoleSink<W> {
    fn render(&mut self, view: &StatusView<'_>) {
        // A broken terminal must not take the session down
        if let Err(e) = self.draw(view) {
            tracing::debug!(error = %e, "console render failed");
        }
    }
}

/// Lay out the status screen as text lines with a display tone each.
pub fn status_lines(view: &StatusView<'_>) -> Vec<(String, Tone)> {
    let s = view.snapshot;
    let rule = "=".repeat(60);
    let mut lines = vec![
        (rule.clone(), Tone::Header),
        ("HOST HEALTH MONITOR".to_string(), Tone::Header),
        (rule.clone(), Tone::Header),
        (
            format!(
                "Sample #{}  {}",
                view.sample_number,
                chrono::Local::now().format("%H:%M:%S")
            ),
            Tone::Normal,
        ),
        (format!("Port:    {}", view.port), Tone::Normal),
        (
            format!(
                "Log:     {}",
                view.log_path
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(disabled)".to_string())
            ),
            Tone::Dim,
        ),
        (
            format!("Runtime: {:.1} minutes", view.runtime.as_secs_f64() / 60.0),
            Tone::Dim,
        ),
        (String::new(), Tone::Normal),
        metric_line("CPU", s.cpu_percent, CPU_HOT),
        metric_line("RAM", s.memory_percent, MEMORY_HOT),
        metric_line("DISK", s.disk_percent, DISK_HOT),
        (
            format!(
                "NET:  in {}  out {}",
                format_kbps(s.net_in_kbps),
                format_kbps(s.net_out_kbps)
            ),
            Tone::Normal,
        ),
        (
            format!("PROC: {}", s.processes.to_formatted_string(&Locale::en)),
            Tone::Normal,
        ),
    ];

    if let Some(temp) = s.cpu_temp_celsius {
        lines.push((format!("TEMP: {temp:.1}°C"), Tone::Normal));
    }

    if view.transmit.consecutive_timeouts > 0 {
        lines.push((
            format!(
                "Write timeouts: {}/{}",
                view.transmit.consecutive_timeouts, view.transmit.max_consecutive_timeouts
            ),
            Tone::Hot,
        ));
    }

    if let Some(frame) = view.last_frame {
        lines.push((String::new(), Tone::Normal));
        lines.push((
            format!("Sent: {}", truncate_str(frame.trim_end(), FRAME_PREVIEW_LEN)),
            Tone::Dim,
        ));
    }

    if !view.messages.is_empty() {
        lines.push((String::new(), Tone::Normal));
        lines.push(("Recent messages:".to_string(), Tone::Header));
        for message in view.messages.iter() {
            lines.push((format!("  {message}"), Tone::Normal));
        }
    }

    lines.push((String::new(), Tone::Normal));
    lines.push(("Press Ctrl+C to stop".to_string(), Tone::Dim));
    lines
}

fn metric_line(label: &str, value: f64, hot_above: f64) -> (String, Tone) {
    let hot = value > hot_above;
    let text = format!(
        "{:<5} {:>5.1}%{}",
        format!("{label}:"),
        value,
        if hot { "  HIGH" } else { "" }
    );
    (text, if hot { Tone::Hot } else { Tone::Normal })
}

pub fn format_kbps(kbps: f64) -> String {
    if kbps >= 1024.0 {
        format!("{:.1} MB/s", kbps / 1024.0)
    } else {
        format!("{kbps:.1} KB/s")
    }
}

/// Truncate a string to max length, adding ".." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 2 {
        s.chars().take(max_len).collect()
    } else {
        let head: String = s.chars().take(max_len - 2).collect();
        format!("{head}..")
    }
}
