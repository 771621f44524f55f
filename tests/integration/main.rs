//! Integration tests using WireMock
//!
//! These tests run every HTTP transport against a mock server through the
//! real reqwest client, covering request encoding, authentication, and
//! response interpretation.

mod brevo;
mod logging;
mod mailgun;
mod sendgrid;

use std::sync::Arc;

use integrations_mail::mocks::MemorySink;
use integrations_mail::{AuditLogger, AuditLoggerConfig, MailLogger, Message};
use wiremock::MockServer;

/// Helper to start a mock server
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Helper to create a valid message
pub fn message() -> Message {
    let mut message = Message::new();
    message
        .set_from(("sender@example.com", "Sender"))
        .set_to("recipient@example.com")
        .set_subject("Integration")
        .set_text_body("Plain text")
        .set_html_body("<p>HTML</p>");
    message
}

/// Helper to create a logger recording into memory
pub fn recording_logger(config: AuditLoggerConfig) -> (Arc<dyn MailLogger>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let logger: Arc<dyn MailLogger> = Arc::new(AuditLogger::with_sink(config, sink.clone()));
    (logger, sink)
}
