//! Logging and tracing initialization, plus the export log.
//!
//! Two channels exist side by side: `tracing` for operators, and
//! [`ExportLogger`], an append-only record of export diagnostics that callers
//! read back as raw text (the UI shows it next to a failed export).

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::LoggingConfig;

/// Initialize the tracing subscriber with the given configuration.
///
/// When `config.file` is set, output is appended to that file instead of
/// stdout.
pub fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::fmt::writer::BoxMakeWriter;
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let log_file = config.file.as_ref().and_then(|path| {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("Failed to open log file {}: {e}", path.display());
                None
            }
        }
    });
    let ansi = log_file.is_none();
    let writer = match log_file {
        Some(file) => BoxMakeWriter::new(Mutex::new(file)),
        None => BoxMakeWriter::new(std::io::stdout),
    };

    if config.json {
        let subscriber = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_writer(writer)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    } else {
        let subscriber = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    }
}

/// Severity of an export log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// One line of the export log.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.level.as_str(),
            self.message
        )
    }
}

/// Append-only export log shared by every component of one export service.
///
/// Cloning yields another handle onto the same record.
#[derive(Debug, Clone, Default)]
pub struct ExportLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl ExportLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self, message: impl Into<String>) {
        self.push(LogLevel::Info, message.into());
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.push(LogLevel::Debug, message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.push(LogLevel::Warn, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(LogLevel::Error, message.into());
    }

    /// Snapshot of every entry recorded so far.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    /// Entries rendered as raw text lines.
    pub fn lines(&self) -> Vec<String> {
        self.lock().iter().map(ToString::to_string).collect()
    }

    /// Number of entries at or above `level`.
    pub fn count_at_least(&self, level: LogLevel) -> usize {
        self.lock().iter().filter(|e| e.level >= level).count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn push(&self, level: LogLevel, message: String) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "framecut::export", "{message}"),
            LogLevel::Info => tracing::info!(target: "framecut::export", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "framecut::export", "{message}"),
            LogLevel::Error => tracing::error!(target: "framecut::export", "{message}"),
        }

        self.lock().push(LogEntry {
            timestamp: Utc::now(),
            level,
            message,
        });
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        // A panic while holding the lock cannot leave a half-pushed entry behind.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
