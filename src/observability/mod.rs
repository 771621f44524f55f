//! Observability for mail operations.
//!
//! Provides the audit logger transports report through, the sinks it writes
//! to, and the redaction rules applied before anything is emitted.

mod logger;
mod redact;

use serde::{Deserialize, Serialize};

pub use logger::{
    AuditLogger, AuditLoggerConfig, LogRecord, LogSink, MailLogger, TracingSink, AUDIT_TARGET,
};
pub use redact::{Redactor, REDACTED};

/// Log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level (most verbose).
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Returns the level name.
    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}
