// Logging module - per-request log capture for the logging panel
//
// A `RequestLogLayer` sits in the process-wide subscriber next to the fmt
// layer. It forwards each event to the sinks that are attached to the current
// thread. The logging panel attaches its sink from an enter hook and detaches
// it from the matching exit hook, so a request only collects the records
// emitted while its own handler is being polled, whichever worker thread runs
// that poll.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Default number of records a sink keeps per request
pub const MAX_LOG_ENTRIES: usize = 1000;

/// A single log entry captured from tracing
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub target: String,
    pub message: String,
    /// `file:line` of the callsite, when the metadata carries one
    pub location: Option<String>,
}

/// Log level for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<&Level> for LogLevel {
    fn from(level: &Level) -> Self {
        match *level {
            Level::ERROR => LogLevel::Error,
            Level::WARN => LogLevel::Warn,
            Level::INFO => LogLevel::Info,
            Level::DEBUG => LogLevel::Debug,
            Level::TRACE => LogLevel::Trace,
        }
    }
}

impl LogLevel {
    /// Get the display string for this log level
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

/// In-memory log buffer with bounded size (ring buffer)
///
/// Clones share the same storage; a clone is what gets attached to a thread.
#[derive(Clone, Debug)]
pub struct LogBuffer {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::with_capacity(MAX_LOG_ENTRIES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(64)))),
            capacity,
        }
    }

    /// Add a log entry, dropping the oldest one when full
    pub fn add(&self, entry: LogEntry) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// All log entries, oldest first
    pub fn get_all(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn same_storage(&self, other: &LogBuffer) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    /// Sinks receiving events emitted on this thread, innermost last
    static ACTIVE_SINKS: RefCell<Vec<LogBuffer>> = const { RefCell::new(Vec::new()) };
}

/// Start routing this thread's events into `buffer`
pub fn attach(buffer: &LogBuffer) {
    ACTIVE_SINKS.with(|sinks| sinks.borrow_mut().push(buffer.clone()));
}

/// Stop routing this thread's events into `buffer`
///
/// Removes the most recent attachment of that buffer; other sinks stay.
pub fn detach(buffer: &LogBuffer) {
    ACTIVE_SINKS.with(|sinks| {
        let mut sinks = sinks.borrow_mut();
        if let Some(pos) = sinks.iter().rposition(|s| s.same_storage(buffer)) {
            sinks.remove(pos);
        }
    });
}

/// Number of sinks attached to the current thread
pub fn attached_count() -> usize {
    ACTIVE_SINKS.with(|sinks| sinks.borrow().len())
}

/// Tracing layer that copies events into the sinks attached to the current thread
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestLogLayer;

impl RequestLogLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestLogLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        ACTIVE_SINKS.with(|sinks| {
            // A sink being modified on this thread means we are inside attach/detach
            let Ok(sinks) = sinks.try_borrow() else {
                return;
            };
            if sinks.is_empty() {
                return;
            }

            let metadata = event.metadata();
            let mut visitor = MessageVisitor::default();
            event.record(&mut visitor);

            let entry = LogEntry {
                timestamp: Utc::now(),
                level: LogLevel::from(metadata.level()),
                target: metadata.target().to_string(),
                message: visitor.finish(),
                location: metadata
                    .file()
                    .map(|file| format!("{}:{}", file, metadata.line().unwrap_or(0))),
            };

            for sink in sinks.iter() {
                sink.add(entry.clone());
            }
        });
    }
}

/// Visitor to extract the message (plus any structured fields) from an event
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }

    fn push_field(&mut self, name: &str, value: std::fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={}", name, value);
    }
}

impl tracing::field::Visit for MessageVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field.name(), format_args!("{:?}", value));
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
            // Remove the quotes that Debug adds
            if self.message.len() >= 2 && self.message.starts_with('"') && self.message.ends_with('"') {
                self.message = self.message[1..self.message.len() - 1].to_string();
            }
        } else {
            self.push_field(field.name(), format_args!("{:?}", value));
        }
    }
}
