//! Mock implementations for testing.
//!
//! Scripted HTTP and SMTP backends, an in-memory log sink, a scripted
//! transport, and message fixtures.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::errors::{ErrorHistory, ErrorRecord, MailError, MailResult};
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::observability::{LogRecord, LogSink};
use crate::transport::{SmtpMailer, Transport};
use crate::types::Message;

/// Mock HTTP client returning queued responses.
///
/// When the queue is empty every request gets a `200` with body `{}`.
#[derive(Debug, Default)]
pub struct MockHttpClient {
    /// Recorded requests.
    requests: Arc<Mutex<Vec<HttpRequest>>>,
    /// Queued responses.
    responses: Arc<Mutex<VecDeque<HttpResponse>>>,
    /// Simulate failure.
    fail_next: Arc<Mutex<Option<MailError>>>,
}

impl MockHttpClient {
    /// Creates a new mock client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn push(&self, response: HttpResponse) -> &Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    /// Queues a JSON response.
    pub fn push_json(&self, status: u16, body: Value) -> &Self {
        self.push(HttpResponse::json(status, &body))
    }

    /// Fails the next request with the given error.
    pub fn fail_next_with(&self, error: MailError) {
        *self.fail_next.lock().unwrap() = Some(error);
    }

    /// Returns recorded requests.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn send(&self, request: &HttpRequest) -> MailResult<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(error) = self.fail_next.lock().unwrap().take() {
            return Err(error);
        }

        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| HttpResponse::new(200, "{}")))
    }
}

/// Mock SMTP mailer recording rendered messages.
#[derive(Debug, Default)]
pub struct MockSmtpMailer {
    sent: Arc<Mutex<Vec<lettre::Message>>>,
    fail_next: Arc<Mutex<Option<MailError>>>,
}

impl MockSmtpMailer {
    /// Creates a new mock mailer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next send with the given error.
    pub fn fail_next_with(&self, error: MailError) {
        *self.fail_next.lock().unwrap() = Some(error);
    }

    /// Returns messages sent so far.
    pub fn sent(&self) -> Vec<lettre::Message> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SmtpMailer for MockSmtpMailer {
    async fn send(&self, message: lettre::Message) -> MailResult<()> {
        if let Some(error) = self.fail_next.lock().unwrap().take() {
            return Err(error);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

/// Log sink keeping records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns emitted records.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, record: LogRecord) {
        self.records.lock().unwrap().push(record);
    }
}

/// Transport with scripted outcomes.
///
/// Each send pops the next outcome; an empty script means success. A failed
/// send records an error with code 500.
#[derive(Debug, Default)]
pub struct MockTransport {
    outcomes: Arc<Mutex<VecDeque<bool>>>,
    sent: Arc<Mutex<Vec<Message>>>,
    errors: ErrorHistory,
}

impl MockTransport {
    /// Creates a transport that accepts every message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the outcome of a later send.
    pub fn push_outcome(&self, success: bool) -> &Self {
        self.outcomes.lock().unwrap().push_back(success);
        self
    }

    /// Handle to the messages sent so far, shared with clones of the handle.
    pub fn sent_handle(&self) -> Arc<Mutex<Vec<Message>>> {
        self.sent.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn send(&mut self, message: &Message) -> bool {
        self.sent.lock().unwrap().push(message.clone());
        let success = self.outcomes.lock().unwrap().pop_front().unwrap_or(true);
        if !success {
            self.errors
                .push(ErrorRecord::new(500, format!("Mock rejected: {}", message.subject())));
        }
        success
    }

    fn errors(&self) -> &ErrorHistory {
        &self.errors
    }

    fn clear_errors(&mut self) -> Vec<ErrorRecord> {
        self.errors.drain()
    }
}

/// Creates a valid text-only test message.
pub fn test_message() -> Message {
    let mut message = Message::new();
    message
        .set_from("sender@example.com")
        .set_to("recipient@example.com")
        .set_subject("Test Subject")
        .set_text_body("Hello, world!");
    message
}

/// Creates a valid test message with text and HTML bodies.
pub fn test_message_html() -> Message {
    let mut message = test_message();
    message.set_html_body("<html><body><h1>Hello, world!</h1></body></html>");
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_http_client_queue_and_default() {
        let client = MockHttpClient::new();
        client.push_json(201, json!({"id": 1}));

        let request = HttpRequest::post("https://example.com");
        assert_eq!(client.send(&request).await.unwrap().status, 201);
        assert_eq!(client.send(&request).await.unwrap().status, 200);
        assert_eq!(client.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_http_client_failure() {
        let client = MockHttpClient::new();
        client.fail_next_with(MailError::http("Test failure"));

        let request = HttpRequest::post("https://example.com");
        assert!(client.send(&request).await.is_err());
        assert!(client.send(&request).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_transport_script() {
        let mut transport = MockTransport::new();
        transport.push_outcome(false);

        assert!(!transport.send(&test_message()).await);
        assert!(transport.send(&test_message()).await);
        assert_eq!(transport.errors().len(), 1);
        assert_eq!(transport.sent_handle().lock().unwrap().len(), 2);
    }

    #[test]
    fn test_test_message() {
        let message = test_message_html();
        assert_eq!(message.from().first(), Some(("sender@example.com", "")));
        assert_eq!(message.to().len(), 1);
        assert!(!message.html_body().is_empty());
    }
}
