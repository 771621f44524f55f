//! Audit logging for send operations and raw HTTP traffic.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{LogLevel, Redactor};
use crate::http::{HttpRequest, HttpResponse};
use crate::types::Message;

/// `tracing` target used by [`TracingSink`].
pub const AUDIT_TARGET: &str = "integrations_mail::audit";

const DEFAULT_SENSITIVE_HEADERS: &[&str] = &[
    "Authorization",
    "API-Key",
    "X-API-Key",
    "Password",
    "Secret",
    "Bearer",
    "Token",
    "Credentials",
];

const DEFAULT_SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "key",
    "secret",
    "token",
    "auth",
    "credential",
    "apiKey",
    "api_key",
    "access_token",
    "accessToken",
];

/// Logger contract used by transports.
///
/// Every method is best-effort; implementations must not fail or panic.
pub trait MailLogger: Send + Sync {
    /// Logs a message with structured data. `None` uses the default level.
    fn log(&self, message: &str, data: Value, level: Option<LogLevel>);

    /// Logs the outcome of a send.
    fn log_send_operation(&self, message: &Message, success: bool, transport: &str, extra: Value);

    /// Logs an outbound HTTP request.
    fn log_request(&self, request: &HttpRequest, context: &str);

    /// Logs an inbound HTTP response.
    fn log_response(&self, response: &HttpResponse, context: &str);
}

/// A fully redacted log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Severity.
    pub level: LogLevel,
    /// Category the entry belongs to.
    pub category: String,
    /// Short message.
    pub message: String,
    /// Entry body including `message` and `timestamp`.
    pub data: Value,
}

/// Destination for audit log records.
pub trait LogSink: Send + Sync {
    /// Emits a record.
    fn emit(&self, record: LogRecord);
}

/// Sink that forwards records to `tracing` under [`AUDIT_TARGET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, record: LogRecord) {
        let LogRecord {
            level,
            category,
            message,
            data,
        } = record;
        match level {
            LogLevel::Trace => {
                tracing::trace!(target: AUDIT_TARGET, category = %category, fields = %data, "{}", message)
            }
            LogLevel::Debug => {
                tracing::debug!(target: AUDIT_TARGET, category = %category, fields = %data, "{}", message)
            }
            LogLevel::Info => {
                tracing::info!(target: AUDIT_TARGET, category = %category, fields = %data, "{}", message)
            }
            LogLevel::Warn => {
                tracing::warn!(target: AUDIT_TARGET, category = %category, fields = %data, "{}", message)
            }
            LogLevel::Error => {
                tracing::error!(target: AUDIT_TARGET, category = %category, fields = %data, "{}", message)
            }
        }
    }
}

/// Audit logger configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditLoggerConfig {
    /// Master switch; a disabled logger is a no-op.
    pub enabled: bool,
    /// Level for ordinary entries and successful sends.
    pub level: LogLevel,
    /// Level for failed sends.
    pub error_level: LogLevel,
    /// Category attached to every record.
    pub category: String,
    /// Include cc, bcc, reply-to, body flags, attachment count and headers
    /// in send entries. Headers may carry sensitive values.
    pub include_message_details: bool,
    /// Log raw HTTP requests and responses.
    pub log_raw_http: bool,
    /// Byte limit for logged bodies; zero disables truncation.
    pub max_raw_content_length: usize,
    /// Header-name denylist (case-insensitive substring match).
    pub sensitive_headers: Vec<String>,
    /// Field-key denylist (case-insensitive substring match).
    pub sensitive_fields: Vec<String>,
}

impl Default for AuditLoggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: LogLevel::Info,
            error_level: LogLevel::Warn,
            category: "mail".to_string(),
            include_message_details: false,
            log_raw_http: false,
            max_raw_content_length: 4096,
            sensitive_headers: DEFAULT_SENSITIVE_HEADERS.iter().map(|s| s.to_string()).collect(),
            sensitive_fields: DEFAULT_SENSITIVE_FIELDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Structured, redacting logger for mail operations.
pub struct AuditLogger {
    config: AuditLoggerConfig,
    redactor: Redactor,
    sink: Arc<dyn LogSink>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new(AuditLoggerConfig::default())
    }
}

impl AuditLogger {
    /// Creates a logger writing to `tracing`.
    pub fn new(config: AuditLoggerConfig) -> Self {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    /// Creates a logger writing to a custom sink.
    pub fn with_sink(config: AuditLoggerConfig, sink: Arc<dyn LogSink>) -> Self {
        let redactor = Redactor::new(&config.sensitive_headers, &config.sensitive_fields);
        Self {
            config,
            redactor,
            sink,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &AuditLoggerConfig {
        &self.config
    }

    fn truncate(&self, content: &str) -> String {
        let limit = self.config.max_raw_content_length;
        if limit == 0 || content.len() <= limit {
            return content.to_string();
        }
        let mut end = limit;
        while !content.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{} ... [truncated, total length: {}]",
            &content[..end],
            content.len()
        )
    }

    fn prepare_value(&self, mut value: Value) -> Value {
        self.redactor.redact(&mut value);
        let limit = self.config.max_raw_content_length;
        if limit > 0 {
            let rendered = value.to_string();
            if rendered.len() > limit {
                return Value::String(self.truncate(&rendered));
            }
        }
        value
    }

    fn prepare_content(&self, content: &str) -> Value {
        match serde_json::from_str::<Value>(content) {
            Ok(parsed @ (Value::Object(_) | Value::Array(_))) => self.prepare_value(parsed),
            _ => Value::String(self.truncate(content)),
        }
    }

    fn header_map<'a, I>(&self, headers: I) -> Value
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut map: Map<String, Value> = headers
            .into_iter()
            .map(|(name, value)| (name.clone(), Value::String(value.clone())))
            .collect();
        self.redactor.redact_headers(&mut map);
        Value::Object(map)
    }
}

fn emails(recipients: &crate::types::Recipients) -> Value {
    Value::Array(recipients.emails().map(|e| Value::String(e.to_string())).collect())
}

impl MailLogger for AuditLogger {
    fn log(&self, message: &str, data: Value, level: Option<LogLevel>) {
        if !self.config.enabled {
            return;
        }

        let mut entry = Map::new();
        entry.insert("message".into(), Value::String(message.to_string()));
        entry.insert(
            "timestamp".into(),
            Value::String(Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()),
        );
        match data {
            Value::Object(fields) => entry.extend(fields),
            Value::Null => {}
            other => {
                entry.insert("data".into(), other);
            }
        }

        let mut data = Value::Object(entry);
        self.redactor.redact(&mut data);

        self.sink.emit(LogRecord {
            level: level.unwrap_or(self.config.level),
            category: self.config.category.clone(),
            message: message.to_string(),
            data,
        });
    }

    fn log_send_operation(&self, message: &Message, success: bool, transport: &str, extra: Value) {
        if !self.config.enabled {
            return;
        }

        let operation = if success {
            "Email sent successfully"
        } else {
            "Email sending failed"
        };

        let mut data = Map::new();
        data.insert("transport".into(), Value::String(transport.to_string()));
        data.insert("subject".into(), Value::String(message.subject().to_string()));
        data.insert("to".into(), emails(message.to()));
        data.insert("from".into(), emails(message.from()));
        data.insert("successful".into(), Value::Bool(success));

        if self.config.include_message_details {
            data.insert("cc".into(), emails(message.cc()));
            data.insert("bcc".into(), emails(message.bcc()));
            data.insert("reply_to".into(), emails(message.reply_to()));
            data.insert("has_text_body".into(), Value::Bool(!message.text_body().is_empty()));
            data.insert("has_html_body".into(), Value::Bool(!message.html_body().is_empty()));
            data.insert("attachment_count".into(), json!(message.attachments().len()));
            data.insert("headers".into(), json!(message.headers()));
        }

        if let Value::Object(extra) = extra {
            data.extend(extra);
        }

        let level = if success {
            self.config.level
        } else {
            self.config.error_level
        };
        self.log(operation, Value::Object(data), Some(level));
    }

    fn log_request(&self, request: &HttpRequest, context: &str) {
        if !self.config.enabled || !self.config.log_raw_http {
            return;
        }

        let mut data = Map::new();
        data.insert("url".into(), Value::String(request.url.clone()));
        data.insert("method".into(), Value::String(request.method.as_str().to_string()));
        data.insert("headers".into(), self.header_map(&request.headers));
        if let Some(content) = request.body.loggable() {
            data.insert("content".into(), self.prepare_value(content));
        }

        self.log(
            "HTTP Request",
            json!({ "context": context, "request": data }),
            None,
        );
    }

    fn log_response(&self, response: &HttpResponse, context: &str) {
        if !self.config.enabled || !self.config.log_raw_http {
            return;
        }

        let mut data = Map::new();
        data.insert("status_code".into(), json!(response.status));
        data.insert("is_ok".into(), Value::Bool(response.is_ok()));
        data.insert("headers".into(), self.header_map(&response.headers));
        let text = response.text();
        if !text.is_empty() {
            data.insert("content".into(), self.prepare_content(&text));
        }

        self.log(
            "HTTP Response",
            json!({ "context": context, "response": data }),
            None,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RequestBody;
    use crate::mocks::{test_message, MemorySink};
    use crate::observability::REDACTED;

    fn logger(config: AuditLoggerConfig) -> (AuditLogger, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (AuditLogger::with_sink(config, sink.clone()), sink)
    }

    fn raw_http() -> AuditLoggerConfig {
        AuditLoggerConfig {
            log_raw_http: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_log_adds_message_and_timestamp() {
        let (logger, sink) = logger(AuditLoggerConfig::default());
        logger.log("hello", json!({"count": 2}), None);

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, LogLevel::Info);
        assert_eq!(records[0].category, "mail");
        assert_eq!(records[0].data["message"], "hello");
        assert_eq!(records[0].data["count"], 2);
        assert!(records[0].data["timestamp"].is_string());
    }

    #[test]
    fn test_disabled_logger_is_noop() {
        let (logger, sink) = logger(AuditLoggerConfig {
            enabled: false,
            log_raw_http: true,
            ..Default::default()
        });
        logger.log("x", Value::Null, None);
        logger.log_send_operation(&test_message(), true, "Brevo", Value::Null);
        logger.log_response(&HttpResponse::new(200, "ok"), "ctx");
        assert!(sink.records().is_empty());
    }

    #[test]
    fn test_send_operation_levels_and_fields() {
        let (logger, sink) = logger(AuditLoggerConfig::default());
        let message = test_message();

        logger.log_send_operation(&message, true, "Brevo", json!({"message_id": "m1"}));
        logger.log_send_operation(&message, false, "Brevo", json!({"status_code": 400}));

        let records = sink.records();
        assert_eq!(records[0].message, "Email sent successfully");
        assert_eq!(records[0].level, LogLevel::Info);
        assert_eq!(records[0].data["successful"], true);
        assert_eq!(records[0].data["message_id"], "m1");
        assert_eq!(records[0].data["to"], json!(["recipient@example.com"]));
        assert!(records[0].data.get("cc").is_none());

        assert_eq!(records[1].message, "Email sending failed");
        assert_eq!(records[1].level, LogLevel::Warn);
        assert_eq!(records[1].data["status_code"], 400);
    }

    #[test]
    fn test_send_operation_verbose_details() {
        let (logger, sink) = logger(AuditLoggerConfig {
            include_message_details: true,
            ..Default::default()
        });
        let mut message = test_message();
        message
            .set_cc("cc@example.com")
            .add_header("X-Api-Key", "secret-value")
            .add_header("X-Campaign", "spring");

        logger.log_send_operation(&message, true, "SendGrid", Value::Null);

        let data = &sink.records()[0].data;
        assert_eq!(data["cc"], json!(["cc@example.com"]));
        assert_eq!(data["has_text_body"], true);
        assert_eq!(data["has_html_body"], false);
        assert_eq!(data["attachment_count"], 0);
        assert_eq!(data["headers"]["X-Api-Key"], REDACTED);
        assert_eq!(data["headers"]["X-Campaign"], "spring");
    }

    #[test]
    fn test_raw_http_is_opt_in() {
        let (logger, sink) = logger(AuditLoggerConfig::default());
        logger.log_request(&HttpRequest::post("https://example.com"), "ctx");
        assert!(sink.records().is_empty());
    }

    #[test]
    fn test_request_redacts_headers_and_body() {
        let (logger, sink) = logger(raw_http());
        let request = HttpRequest::post("https://api.example.com/send")
            .with_header("Authorization", "Bearer SG.secret")
            .with_header("Accept", "application/json")
            .with_body(RequestBody::Json(json!({
                "subject": "Hi",
                "nested": {"deeper": {"apiKey": "k"}}
            })));

        logger.log_request(&request, "SendGrid API Request");

        let data = &sink.records()[0].data;
        assert_eq!(data["message"], "HTTP Request");
        assert_eq!(data["context"], "SendGrid API Request");
        assert_eq!(data["request"]["method"], "POST");
        assert_eq!(data["request"]["headers"]["Authorization"], REDACTED);
        assert_eq!(data["request"]["headers"]["Accept"], "application/json");
        assert_eq!(data["request"]["content"]["nested"]["deeper"]["apiKey"], REDACTED);
        assert_eq!(data["request"]["content"]["subject"], "Hi");
    }

    #[test]
    fn test_response_truncates_plain_text() {
        let (logger, sink) = logger(AuditLoggerConfig {
            log_raw_http: true,
            max_raw_content_length: 10,
            ..Default::default()
        });
        let response = HttpResponse::new(502, "x".repeat(25));

        logger.log_response(&response, "ctx");

        let data = &sink.records()[0].data;
        assert_eq!(data["response"]["status_code"], 502);
        assert_eq!(data["response"]["is_ok"], false);
        assert_eq!(
            data["response"]["content"],
            format!("{} ... [truncated, total length: 25]", "x".repeat(10))
        );
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let (logger, _) = logger(AuditLoggerConfig {
            max_raw_content_length: 2,
            ..Default::default()
        });
        let truncated = logger.truncate("héllo");
        assert!(truncated.starts_with("h ... "));
    }

    #[test]
    fn test_response_json_is_redacted_structure() {
        let (logger, sink) = logger(raw_http());
        let response = HttpResponse::json(201, &json!({"messageId": "<1@x>", "token": "t"}));

        logger.log_response(&response, "Brevo API Response");

        let content = &sink.records()[0].data["response"]["content"];
        assert_eq!(content["messageId"], "<1@x>");
        assert_eq!(content["token"], REDACTED);
    }
}
