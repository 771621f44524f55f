//! Error types for the mail transport layer.
//!
//! Two shapes of failure exist here. [`MailError`] is the Rust error returned
//! from fallible calls (configuration, message building, the HTTP and SMTP
//! seams). [`ErrorRecord`] is the immutable entry a transport keeps in its
//! [`ErrorHistory`] after a failed `send`; it is what callers inspect once
//! `send` has returned `false`.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Result type for mail operations.
pub type MailResult<T> = Result<T, MailError>;

/// Code recorded for validation failures (no provider involved).
pub const VALIDATION_ERROR_CODE: i64 = 0;

/// Code recorded for network, SMTP and unexpected failures.
pub const GENERIC_ERROR_CODE: i64 = 500;

/// Default number of error records a transport retains.
pub const DEFAULT_ERROR_HISTORY_LIMIT: usize = 100;

/// Mail error kinds categorizing different failure modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MailErrorKind {
    /// Transport or logger configuration is invalid.
    Configuration,
    /// A message builder call was misused.
    InvalidInput,
    /// A message failed the required-field check.
    Validation,
    /// A pre-coded transport failure (provider rejection and similar).
    Transport,
    /// The HTTP exchange could not be completed.
    Http,
    /// The SMTP exchange could not be completed.
    Smtp,
    /// Reading attachment content failed.
    Io,
    /// Encoding or decoding JSON failed.
    Serialization,
    /// Anything else.
    Unexpected,
}

impl MailErrorKind {
    /// Returns true if errors of this kind escape `send` instead of being recorded.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MailErrorKind::Configuration)
    }
}

impl fmt::Display for MailErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailErrorKind::Configuration => write!(f, "Invalid configuration"),
            MailErrorKind::InvalidInput => write!(f, "Invalid input"),
            MailErrorKind::Validation => write!(f, "Validation failed"),
            MailErrorKind::Transport => write!(f, "Transport error"),
            MailErrorKind::Http => write!(f, "HTTP client error"),
            MailErrorKind::Smtp => write!(f, "SMTP error"),
            MailErrorKind::Io => write!(f, "I/O error"),
            MailErrorKind::Serialization => write!(f, "Serialization error"),
            MailErrorKind::Unexpected => write!(f, "Unexpected error"),
        }
    }
}

/// Mail error with detailed information.
#[derive(Error, Debug)]
pub struct MailError {
    kind: MailErrorKind,
    message: String,
    code: Option<i64>,
    details: Option<Value>,
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl MailError {
    /// Creates a new mail error.
    pub fn new(kind: MailErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            details: None,
            cause: None,
        }
    }

    /// Sets the numeric code.
    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    /// Sets the raw details payload.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Sets the underlying cause.
    pub fn with_cause<E: std::error::Error + Send + Sync + 'static>(mut self, cause: E) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> MailErrorKind {
        self.kind
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the numeric code if one was attached.
    pub fn code(&self) -> Option<i64> {
        self.code
    }

    /// Returns the raw details payload if one was attached.
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// Converts the error into the record a transport keeps.
    ///
    /// Pre-coded transport errors keep their code, message and details. HTTP
    /// and SMTP failures are wrapped under the generic code, as is everything
    /// else.
    pub fn to_record(&self) -> ErrorRecord {
        match self.kind {
            MailErrorKind::Validation => ErrorRecord::new(
                self.code.unwrap_or(VALIDATION_ERROR_CODE),
                self.message.clone(),
            ),
            MailErrorKind::Transport => ErrorRecord {
                code: self.code.unwrap_or(GENERIC_ERROR_CODE),
                message: self.message.clone(),
                details: self.details.clone(),
            },
            MailErrorKind::Http => ErrorRecord::new(
                GENERIC_ERROR_CODE,
                format!("HTTP client error: {}", self.message),
            ),
            MailErrorKind::Smtp => ErrorRecord::new(
                GENERIC_ERROR_CODE,
                format!("SMTP error: {}", self.message),
            ),
            _ => ErrorRecord::new(
                GENERIC_ERROR_CODE,
                format!("Unexpected error: {}", self.message),
            ),
        }
    }

    // Convenience constructors

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::Configuration, message)
    }

    /// Creates an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::InvalidInput, message)
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::Validation, message).with_code(VALIDATION_ERROR_CODE)
    }

    /// Creates a pre-coded transport error.
    pub fn transport(code: i64, message: impl Into<String>, details: Option<Value>) -> Self {
        let mut err = Self::new(MailErrorKind::Transport, message).with_code(code);
        err.details = details;
        err
    }

    /// Creates an HTTP client error.
    pub fn http(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::Http, message)
    }

    /// Creates an SMTP error.
    pub fn smtp(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::Smtp, message)
    }

    /// Creates an unexpected error.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::Unexpected, message)
    }
}

impl fmt::Display for MailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(code) = self.code {
            write!(f, " (code: {})", code)?;
        }
        Ok(())
    }
}

impl From<std::io::Error> for MailError {
    fn from(err: std::io::Error) -> Self {
        Self::new(MailErrorKind::Io, err.to_string()).with_cause(err)
    }
}

impl From<serde_json::Error> for MailError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(MailErrorKind::Serialization, err.to_string()).with_cause(err)
    }
}

impl From<reqwest::Error> for MailError {
    fn from(err: reqwest::Error) -> Self {
        Self::http(err.to_string()).with_cause(err)
    }
}

impl From<lettre::transport::smtp::Error> for MailError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        Self::smtp(err.to_string()).with_cause(err)
    }
}

impl From<lettre::error::Error> for MailError {
    fn from(err: lettre::error::Error) -> Self {
        Self::smtp(err.to_string()).with_cause(err)
    }
}

impl From<lettre::address::AddressError> for MailError {
    fn from(err: lettre::address::AddressError) -> Self {
        Self::smtp(err.to_string()).with_cause(err)
    }
}

/// An immutable failure entry kept by a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Provider code, HTTP status, or one of the generic codes.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Raw provider payload or body text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorRecord {
    /// Creates a record without details.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Sets the details payload.
    pub fn with_details(mut self, details: Option<Value>) -> Self {
        self.details = details;
        self
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Bounded, caller-controlled history of error records.
///
/// Once `limit` records are held the oldest is evicted. A limit of zero keeps
/// every record.
#[derive(Debug, Clone)]
pub struct ErrorHistory {
    records: VecDeque<ErrorRecord>,
    limit: usize,
}

impl Default for ErrorHistory {
    fn default() -> Self {
        Self::with_limit(DEFAULT_ERROR_HISTORY_LIMIT)
    }
}

impl ErrorHistory {
    /// Creates a history retaining at most `limit` records.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            records: VecDeque::new(),
            limit,
        }
    }

    /// Returns the retention limit.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Appends a record, evicting the oldest when full.
    pub fn push(&mut self, record: ErrorRecord) {
        if self.limit > 0 && self.records.len() == self.limit {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Returns the most recent record.
    pub fn last(&self) -> Option<&ErrorRecord> {
        self.records.back()
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.records.iter()
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Removes and returns every retained record, oldest first.
    pub fn drain(&mut self) -> Vec<ErrorRecord> {
        self.records.drain(..).collect()
    }
}
