//! Tracing layer that captures log events into a shared [`LogBuffer`].
//!
//! Frontends (the CLI report, the web dashboard) read recent activity from
//! the buffer instead of parsing stderr. The buffer has its own mutex, so
//! logging never contends with registry or collector locks.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::Subscriber;
use tracing_subscriber::layer::Layer;
use tracing_subscriber::registry::LookupSpan;

/// Maximum captured lines kept in memory.
pub const MAX_LOG_LINES: usize = 2000;
/// Trim to this many when the cap is exceeded.
pub const LOG_TRIM_TO: usize = 1200;

/// A single log line captured from tracing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogLine {
    pub time: String,
    pub level: LogLevel,
    pub message: String,
}

/// Log severity level (mirrors tracing levels).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Short fixed-width label for display.
    pub fn label(self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO ",
            Self::Warn => "WARN ",
            Self::Error => "ERROR",
        }
    }
}

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => Self::Trace,
            tracing::Level::DEBUG => Self::Debug,
            tracing::Level::INFO => Self::Info,
            tracing::Level::WARN => Self::Warn,
            tracing::Level::ERROR => Self::Error,
        }
    }
}

/// Bounded, shared buffer of captured log lines.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<LogLine>>>);

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: LogLine) {
        let mut buf = self.lock();
        buf.push(line);
        if buf.len() > MAX_LOG_LINES {
            let trim_to = buf.len() - LOG_TRIM_TO;
            buf.drain(..trim_to);
        }
    }

    /// Remove and return every buffered line.
    pub fn drain(&self) -> Vec<LogLine> {
        std::mem::take(&mut *self.lock())
    }

    /// The last `n` lines, oldest first, without removing them.
    pub fn recent(&self, n: usize) -> Vec<LogLine> {
        let buf = self.lock();
        let start = buf.len().saturating_sub(n);
        buf[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogLine>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A [`tracing_subscriber::Layer`] that records every event it sees into a
/// [`LogBuffer`]. Filtering is left to the subscriber stack.
pub struct ActivityLayer {
    buffer: LogBuffer,
}

impl ActivityLayer {
    /// Create the layer and the buffer it writes to.
    pub fn new() -> (Self, LogBuffer) {
        let buffer = LogBuffer::new();
        (
            Self {
                buffer: buffer.clone(),
            },
            buffer,
        )
    }
}

impl<S: Subscriber + for<'a> LookupSpan<'a>> Layer<S> for ActivityLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        self.buffer.push(LogLine {
            time: Local::now().format("%H:%M:%S").to_string(),
            level: event.metadata().level().into(),
            message: visitor.into_message(),
        });
    }
}

/// Extracts the message and extra fields from a tracing event.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl MessageVisitor {
    fn into_message(self) -> String {
        if self.fields.is_empty() {
            return self.message;
        }
        let extras: Vec<String> = self
            .fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        if self.message.is_empty() {
            extras.join(" ")
        } else {
            format!("{} {{{}}}", self.message, extras.join(", "))
        }
    }
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let raw = format!("{value:?}");
        if field.name() == "message" {
            self.message = raw
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .map(str::to_string)
                .unwrap_or(raw);
        } else {
            self.fields.push((field.name().to_string(), raw));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields
                .push((field.name().to_string(), value.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    fn line(message: &str) -> LogLine {
        LogLine {
            time: "00:00:00".into(),
            level: LogLevel::Info,
            message: message.into(),
        }
    }

    #[test]
    fn level_labels_are_fixed_width() {
        for level in [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
        ] {
            assert_eq!(level.label().len(), 5);
        }
    }

    #[test]
    fn buffer_trims_when_full() {
        let buffer = LogBuffer::new();
        for i in 0..=MAX_LOG_LINES {
            buffer.push(line(&i.to_string()));
        }
        assert_eq!(buffer.len(), LOG_TRIM_TO);
        let recent = buffer.recent(1);
        assert_eq!(recent[0].message, MAX_LOG_LINES.to_string());
    }

    #[test]
    fn recent_keeps_lines_and_drain_removes_them() {
        let buffer = LogBuffer::new();
        buffer.push(line("a"));
        buffer.push(line("b"));
        buffer.push(line("c"));
        let recent: Vec<String> = buffer.recent(2).into_iter().map(|l| l.message).collect();
        assert_eq!(recent, vec!["b", "c"]);
        assert_eq!(buffer.recent(10).len(), 3);
        assert_eq!(buffer.drain().len(), 3);
        assert!(buffer.is_empty());
    }

    #[test]
    fn layer_captures_message_and_fields() {
        let (layer, buffer) = ActivityLayer::new();
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(id = "image-1", "cleanup panicked");
            tracing::info!(count = 3);
        });

        let lines = buffer.drain();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].level, LogLevel::Warn);
        assert_eq!(lines[0].message, "cleanup panicked {id=image-1}");
        assert_eq!(lines[1].message, "count=3");
    }
}
