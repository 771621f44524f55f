//! Sender-level mail client.
//!
//! [`Mailer`] owns a [`MailerConfig`] and builds the configured transport on
//! first use. Callers may inject a transport, an HTTP client, or a logger
//! before the first send.

use std::sync::Arc;

use crate::config::MailerConfig;
use crate::errors::MailResult;
use crate::http::HttpClient;
use crate::observability::{AuditLogger, MailLogger};
use crate::transport::{AnyTransport, Transport};
use crate::types::Message;

/// High-level mail client.
pub struct Mailer {
    /// Configuration.
    config: MailerConfig,
    /// Transport, built lazily.
    transport: Option<Box<dyn Transport>>,
    /// Logger, built lazily.
    logger: Option<Arc<dyn MailLogger>>,
    /// HTTP client handed to API transports.
    http_client: Option<Arc<dyn HttpClient>>,
}

impl std::fmt::Debug for Mailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailer")
            .field("config", &self.config)
            .field("transport", &self.transport.as_ref().map(|t| t.name()))
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

impl Mailer {
    /// Creates a mailer. Nothing is built or validated until first use.
    pub fn new(config: MailerConfig) -> Self {
        Self {
            config,
            transport: None,
            logger: None,
            http_client: None,
        }
    }

    /// Uses the given HTTP client when building an API transport.
    pub fn with_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &MailerConfig {
        &self.config
    }

    /// Returns the logger, creating it from configuration on first call.
    ///
    /// Always `None` when `logger_enabled` is off.
    pub fn logger(&mut self) -> Option<Arc<dyn MailLogger>> {
        if !self.config.logger_enabled {
            return None;
        }
        let logger = self.logger.get_or_insert_with(|| {
            tracing::debug!("creating audit logger");
            let logger: Arc<dyn MailLogger> = Arc::new(AuditLogger::new(self.config.logger.clone()));
            logger
        });
        Some(logger.clone())
    }

    /// Replaces the logger. Affects transports built after this call.
    pub fn set_logger(&mut self, logger: Arc<dyn MailLogger>) {
        self.logger = Some(logger);
    }

    /// Replaces the transport.
    pub fn set_transport(&mut self, transport: impl Transport + 'static) {
        self.transport = Some(Box::new(transport));
    }

    /// Returns the transport, building it from configuration on first call.
    ///
    /// Configuration errors surface here rather than from [`Mailer::new`].
    pub fn transport(&mut self) -> MailResult<&mut dyn Transport> {
        let transport = match self.transport.take() {
            Some(transport) => transport,
            None => self.create_transport()?,
        };
        Ok(&mut **self.transport.insert(transport))
    }

    fn create_transport(&mut self) -> MailResult<Box<dyn Transport>> {
        let logger = self.logger();
        let mut transport = AnyTransport::from_config(self.config.effective_transport(), logger)?;
        if let Some(client) = &self.http_client {
            transport = transport.with_http_client(client.clone());
        }
        tracing::info!(transport = transport.name(), "mail transport created");
        Ok(Box::new(transport))
    }

    /// Sends a message. `Ok(false)` means the transport rejected it; the
    /// reason is in the transport's error history.
    pub async fn send(&mut self, message: &Message) -> MailResult<bool> {
        let transport = self.transport()?;
        Ok(transport.send(message).await)
    }

    /// Sends messages in order and returns how many succeeded.
    pub async fn send_multiple(&mut self, messages: &[Message]) -> MailResult<usize> {
        let transport = self.transport()?;
        Ok(transport.send_multiple(messages).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrevoConfig, MailgunConfig};
    use crate::errors::MailErrorKind;
    use crate::mocks::{test_message, MemorySink, MockHttpClient, MockTransport};
    use crate::observability::AuditLoggerConfig;
    use serde_json::json;

    #[tokio::test]
    async fn test_transport_built_once_on_first_send() {
        let client = Arc::new(MockHttpClient::new());
        client.push_json(201, json!({"messageId": "1"}));
        client.push_json(201, json!({"messageId": "2"}));

        let mut mailer =
            Mailer::new(MailerConfig::new(BrevoConfig::new("key"))).with_http_client(client.clone());

        assert!(mailer.send(&test_message()).await.unwrap());
        assert!(mailer.send(&test_message()).await.unwrap());
        assert_eq!(client.requests().len(), 2);
        assert_eq!(mailer.transport().unwrap().name(), "Brevo");
    }

    #[tokio::test]
    async fn test_configuration_error_surfaces_on_send() {
        let mut mailer = Mailer::new(MailerConfig::new(MailgunConfig::new("key", "")));

        let err = mailer.send(&test_message()).await.unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::Configuration);
        assert_eq!(err.message(), "MailgunTransport domain must be set.");
    }

    #[tokio::test]
    async fn test_injected_transport() {
        let transport = MockTransport::new();
        transport.push_outcome(true).push_outcome(false).push_outcome(true);
        let sent = transport.sent_handle();

        let mut mailer = Mailer::new(MailerConfig::new(BrevoConfig::new("")));
        mailer.set_transport(transport);

        let messages = vec![test_message(), test_message(), test_message()];
        assert_eq!(mailer.send_multiple(&messages).await.unwrap(), 2);
        assert_eq!(sent.lock().unwrap().len(), 3);
        assert_eq!(mailer.transport().unwrap().errors().len(), 1);
    }

    #[tokio::test]
    async fn test_injected_logger_reaches_transport() {
        let sink = Arc::new(MemorySink::new());
        let mut mailer = Mailer::new(MailerConfig::new(BrevoConfig::new("key")))
            .with_http_client(Arc::new(MockHttpClient::new()));
        mailer.set_logger(Arc::new(AuditLogger::with_sink(
            AuditLoggerConfig::default(),
            sink.clone(),
        )));

        mailer.transport().unwrap();

        assert_eq!(sink.records()[0].message, "BrevoTransport initialized");
    }

    #[test]
    fn test_logger_disabled() {
        let mut mailer =
            Mailer::new(MailerConfig::new(BrevoConfig::new("key")).with_logger_enabled(false));
        assert!(mailer.logger().is_none());

        let mut mailer = Mailer::new(MailerConfig::new(BrevoConfig::new("key")));
        assert!(mailer.logger().is_some());
    }
}
