//! Injectable logging for the pipeline processors.
//!
//! Each processor receives a [`Logger`] at construction instead of reaching
//! for process-wide state. The default sink forwards to `tracing`; tests can
//! swap in a [`MemorySink`] to capture output, or use [`Logger::disabled`].

use crate::config::LogLevel;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::Level;

/// Destination for log lines emitted by a [`Logger`]
pub trait LogSink: Send + Sync {
    fn emit(&self, level: Level, component: &str, message: &str);
}

/// Sink that forwards every line to the `tracing` subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, level: Level, component: &str, message: &str) {
        match level {
            Level::ERROR => tracing::error!(component, "{}", message),
            Level::WARN => tracing::warn!(component, "{}", message),
            Level::INFO => tracing::info!(component, "{}", message),
            Level::DEBUG => tracing::debug!(component, "{}", message),
            Level::TRACE => tracing::trace!(component, "{}", message),
        }
    }
}

/// A captured log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: Level,
    pub component: String,
    pub message: String,
}

/// Sink that keeps every line in memory
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records captured so far
    pub fn records(&self) -> Vec<LogRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Records emitted at exactly `level`
    pub fn at_level(&self, level: Level) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|record| record.level == level)
            .collect()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, level: Level, component: &str, message: &str) {
        let record = LogRecord {
            level,
            component: component.to_string(),
            message: message.to_string(),
        };
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}

/// Leveled logger handed to each processor
#[derive(Clone)]
pub struct Logger {
    component: String,
    threshold: LogLevel,
    sink: Arc<dyn LogSink>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("component", &self.component)
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(LogLevel::Info, Arc::new(TracingSink))
    }
}

impl Logger {
    pub fn new(threshold: LogLevel, sink: Arc<dyn LogSink>) -> Self {
        Self {
            component: "agri_pipeline".to_string(),
            threshold,
            sink,
        }
    }

    /// Logger backed by `tracing` at the given verbosity
    pub fn tracing(threshold: LogLevel) -> Self {
        Self::new(threshold, Arc::new(TracingSink))
    }

    /// Logger that drops everything
    pub fn disabled() -> Self {
        Self::tracing(LogLevel::None)
    }

    /// Same sink and threshold, tagged with a different component name
    pub fn for_component(&self, component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            threshold: self.threshold,
            sink: Arc::clone(&self.sink),
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn threshold(&self) -> LogLevel {
        self.threshold
    }

    /// Whether a line at `level` would reach the sink
    pub fn enabled(&self, level: Level) -> bool {
        match self.threshold {
            LogLevel::None => false,
            LogLevel::Info => level <= Level::INFO,
            LogLevel::Debug => level <= Level::DEBUG,
        }
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(Level::DEBUG, message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(Level::INFO, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(Level::WARN, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(Level::ERROR, message.as_ref());
    }

    fn log(&self, level: Level, message: &str) {
        if self.enabled(level) {
            self.sink.emit(level, &self.component, message);
        }
    }
}

/// Set up the global `tracing` subscriber for the binary
pub fn init_tracing(level: &str, quiet: bool) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("agri_pipeline={}", level)));

    if quiet {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    tracing::debug!("Logging initialized at level: {}", level);
}
