//! Transport contract and the machinery shared by every provider.
//!
//! A transport turns a [`Message`] into a delivery attempt. Every transport:
//! - validates the message before any network call
//! - records failures in a bounded [`ErrorHistory`] instead of returning them
//! - reports each attempt to an injected [`MailLogger`]
//!
//! The HTTP providers share [`ApiTransport`], parameterized by an
//! [`ApiAdapter`] that owns the provider-specific payload and response rules.
//! [`AnyTransport`] is the closed set of providers selected from configuration.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::config::{TransportConfig, TransportSettings};
use crate::errors::{ErrorHistory, ErrorRecord, MailError, MailResult, GENERIC_ERROR_CODE};
use crate::http::{HttpClient, HttpRequest, HttpResponse, ReqwestClient};
use crate::observability::MailLogger;
use crate::types::{Message, Recipients};

pub mod brevo;
pub mod mailgun;
pub mod sendgrid;
pub mod smtp;

pub use brevo::{BrevoAdapter, BrevoTransport};
pub use mailgun::{MailgunAdapter, MailgunPayload, MailgunTransport};
pub use sendgrid::{SendGridAdapter, SendGridTransport};
pub use smtp::{LettreMailer, SmtpMailer, SmtpTransport};

/// The delivery contract every transport implements.
///
/// `send` takes `&mut self`: a transport instance serves one logical sender
/// and is never used from two tasks at once.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Provider name used in logs.
    fn name(&self) -> &'static str;

    /// Makes one delivery attempt. Returns false and records the reason on
    /// any failure.
    async fn send(&mut self, message: &Message) -> bool;

    /// Sends each message in order and returns how many succeeded. A failure
    /// does not stop the remaining messages.
    async fn send_multiple(&mut self, messages: &[Message]) -> usize {
        let mut sent = 0;
        for message in messages {
            if self.send(message).await {
                sent += 1;
            }
        }
        sent
    }

    /// Retained error history, oldest first.
    fn errors(&self) -> &ErrorHistory;

    /// Removes and returns the retained error history.
    fn clear_errors(&mut self) -> Vec<ErrorRecord>;

    /// Most recent error.
    fn error(&self) -> Option<&ErrorRecord> {
        self.errors().last()
    }

    /// Returns true if any error is retained.
    fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }
}

/// State and helpers shared by all transports.
pub struct TransportBase {
    name: &'static str,
    settings: TransportSettings,
    logger: Option<Arc<dyn MailLogger>>,
    errors: ErrorHistory,
}

impl std::fmt::Debug for TransportBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportBase")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("logging", &self.logger.is_some())
            .field("errors", &self.errors)
            .finish()
    }
}

impl TransportBase {
    /// Creates the shared state. The logger is dropped when
    /// `settings.enable_logging` is off.
    pub fn new(
        name: &'static str,
        settings: TransportSettings,
        logger: Option<Arc<dyn MailLogger>>,
    ) -> Self {
        let logger = if settings.enable_logging { logger } else { None };
        if logger.is_some() {
            tracing::info!(transport = name, "mail logger enabled");
        } else {
            tracing::info!(transport = name, "mail logger disabled");
        }

        Self {
            name,
            errors: ErrorHistory::with_limit(settings.error_history_limit),
            settings,
            logger,
        }
    }

    /// Provider name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Shared settings.
    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    /// Merges pass-through options into the settings.
    pub fn set_options(&mut self, options: Map<String, Value>) {
        self.settings.set_options(options);
    }

    /// Returns true if a logger is attached.
    pub fn is_logging(&self) -> bool {
        self.logger.is_some()
    }

    /// Retained errors.
    pub fn errors(&self) -> &ErrorHistory {
        &self.errors
    }

    /// Drains retained errors.
    pub fn clear_errors(&mut self) -> Vec<ErrorRecord> {
        self.errors.drain()
    }

    /// Records an error.
    pub fn add_error(&mut self, record: ErrorRecord) {
        self.errors.push(record);
    }

    /// Checks the fields every provider requires.
    pub fn validate_message(&self, message: &Message) -> MailResult<()> {
        if message.from().is_empty() {
            return Err(MailError::validation(
                "Message must have at least one \"from\" address",
            ));
        }

        if message.to().is_empty() {
            return Err(MailError::validation(
                "Message must have at least one \"to\" address",
            ));
        }

        if message.subject().is_empty() {
            return Err(MailError::validation("Message must have a subject"));
        }

        if message.text_body().is_empty() && message.html_body().is_empty() {
            return Err(MailError::validation(
                "Message must have either a text or HTML body",
            ));
        }

        Ok(())
    }

    /// Logs through the attached logger, if any.
    pub fn log(&self, message: &str, data: Value) {
        if let Some(logger) = &self.logger {
            logger.log(message, data, None);
        }
    }

    /// Logs the outcome of a send.
    pub fn log_send_operation(&self, message: &Message, success: bool, extra: Value) {
        if let Some(logger) = &self.logger {
            logger.log_send_operation(message, success, self.name, extra);
        }
    }

    /// Logs an outbound request.
    pub fn log_request(&self, request: &HttpRequest) {
        if let Some(logger) = &self.logger {
            logger.log_request(request, &format!("{} API Request", self.name));
        }
    }

    /// Logs an inbound response.
    pub fn log_response(&self, response: &HttpResponse) {
        if let Some(logger) = &self.logger {
            logger.log_response(response, &format!("{} API Response", self.name));
        }
    }

    /// Logs the pre-send summary.
    pub fn log_preparing(&self, message: &Message) {
        self.log(
            &format!("Preparing to send email via {}", self.name),
            json!({
                "subject": message.subject(),
                "to": message.to().emails().collect::<Vec<_>>(),
                "from": message.from().emails().collect::<Vec<_>>(),
            }),
        );
    }

    /// Records a successful send.
    pub fn succeed(&self, message: &Message, extra: Value) -> bool {
        tracing::debug!(transport = self.name, subject = message.subject(), "email sent");
        self.log_send_operation(message, true, extra);
        true
    }

    /// Records a provider rejection.
    pub fn reject(
        &mut self,
        message: &Message,
        status: u16,
        records: Vec<ErrorRecord>,
        details: Option<Value>,
    ) -> bool {
        for record in records {
            tracing::warn!(transport = self.name, code = record.code, "{}", record.message);
            self.add_error(record);
        }
        self.log_send_operation(
            message,
            false,
            json!({
                "status_code": status,
                "error_details": details,
            }),
        );
        false
    }

    /// Records a failure raised while sending.
    ///
    /// Pre-coded transport and validation errors keep their code, message and
    /// details; HTTP, SMTP and everything else are wrapped under the generic
    /// code.
    pub fn fail(&mut self, message: &Message, err: MailError) -> bool {
        let record = err.to_record();
        tracing::warn!(
            transport = self.name,
            kind = ?err.kind(),
            code = record.code,
            "{}",
            record.message
        );
        self.add_error(record);
        self.log_send_operation(
            message,
            false,
            json!({
                "exception": format!("{:?}", err.kind()),
                "message": err.message(),
            }),
        );
        false
    }
}

/// Merges `overrides` into `target`.
///
/// Objects merge key by key, recursively; any other value replaces the target.
pub fn merge_options(target: &mut Value, overrides: &Map<String, Value>) {
    match target {
        Value::Object(map) => {
            for (key, value) in overrides {
                if let (Some(existing), Value::Object(nested)) = (map.get_mut(key), value) {
                    if existing.is_object() {
                        merge_options(existing, nested);
                        continue;
                    }
                }
                map.insert(key.clone(), value.clone());
            }
        }
        other => *other = Value::Object(overrides.clone()),
    }
}

/// Wraps a failure to create a lazily built handle as a pre-coded transport
/// error, so it is recorded as-is.
pub(crate) fn handle_error(handle: &str, err: MailError) -> MailError {
    MailError::transport(
        GENERIC_ERROR_CODE,
        format!("{} could not be created: {}", handle, err.message()),
        None,
    )
    .with_cause(err)
}

/// `{email, name?}` objects for every address; the name is omitted when empty.
pub(crate) fn address_objects(recipients: &Recipients) -> Value {
    Value::Array(recipients.iter().map(|(e, n)| address_object(e, n)).collect())
}

/// `{email, name?}` for the first address only.
pub(crate) fn first_address_object(recipients: &Recipients) -> Value {
    recipients
        .first()
        .map(|(e, n)| address_object(e, n))
        .unwrap_or(Value::Null)
}

fn address_object(email: &str, name: &str) -> Value {
    let mut object = Map::new();
    object.insert("email".into(), Value::String(email.to_string()));
    if !name.is_empty() {
        object.insert("name".into(), Value::String(name.to_string()));
    }
    Value::Object(object)
}

/// Outcome of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    /// The provider accepted the message.
    Accepted {
        /// Provider message id, when the response carries one.
        message_id: Option<String>,
    },
    /// The provider rejected the message.
    Rejected(Vec<ErrorRecord>),
}

/// Provider-specific half of an HTTP transport.
pub trait ApiAdapter: Send + Sync {
    /// Provider-native payload.
    type Payload: Send;

    /// Provider name used in logs and error messages.
    const NAME: &'static str;

    /// Validates provider configuration.
    fn validate(&self) -> MailResult<()>;

    /// Fields logged when the transport is created.
    fn describe(&self, settings: &TransportSettings) -> Value;

    /// Translates a message into the provider payload, pass-through options
    /// applied.
    fn build_payload(&self, message: &Message, settings: &TransportSettings) -> Self::Payload;

    /// Wraps the payload in a request.
    fn create_request(&self, payload: Self::Payload) -> HttpRequest;

    /// Decides success or failure from the provider response.
    fn interpret_response(&self, response: &HttpResponse) -> ResponseOutcome;
}

/// HTTP transport driven by an [`ApiAdapter`].
pub struct ApiTransport<A: ApiAdapter> {
    adapter: A,
    base: TransportBase,
    client: Option<Arc<dyn HttpClient>>,
}

impl<A: ApiAdapter> ApiTransport<A> {
    /// Creates a transport. Fails on invalid provider configuration.
    pub fn with_adapter(
        adapter: A,
        settings: TransportSettings,
        logger: Option<Arc<dyn MailLogger>>,
    ) -> MailResult<Self> {
        adapter.validate()?;
        let base = TransportBase::new(A::NAME, settings, logger);
        base.log(
            &format!("{}Transport initialized", A::NAME),
            adapter.describe(base.settings()),
        );

        Ok(Self {
            adapter,
            base,
            client: None,
        })
    }

    /// Uses the given HTTP client instead of creating one on first send.
    pub fn with_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Provider adapter.
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Shared settings.
    pub fn settings(&self) -> &TransportSettings {
        self.base.settings()
    }

    /// Merges pass-through options applied to every later payload.
    pub fn set_options(&mut self, options: Map<String, Value>) {
        self.base.set_options(options);
    }

    /// Builds the provider payload for a message.
    pub fn build_payload(&self, message: &Message) -> A::Payload {
        self.adapter.build_payload(message, self.base.settings())
    }

    fn http_client(&mut self) -> MailResult<Arc<dyn HttpClient>> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }
        tracing::debug!(transport = A::NAME, "creating HTTP client");
        let client: Arc<dyn HttpClient> =
            Arc::new(ReqwestClient::new().map_err(|e| handle_error("HTTP client", e))?);
        self.client = Some(client.clone());
        Ok(client)
    }

    async fn dispatch(&mut self, message: &Message) -> MailResult<(HttpResponse, ResponseOutcome)> {
        self.base.validate_message(message)?;

        let payload = self.build_payload(message);
        let request = self.adapter.create_request(payload);
        self.base.log_request(&request);

        let client = self.http_client()?;
        let response = client.send(&request).await?;
        self.base.log_response(&response);

        let outcome = self.adapter.interpret_response(&response);
        Ok((response, outcome))
    }
}

#[async_trait]
impl<A: ApiAdapter> Transport for ApiTransport<A> {
    fn name(&self) -> &'static str {
        A::NAME
    }

    async fn send(&mut self, message: &Message) -> bool {
        self.base.log_preparing(message);

        match self.dispatch(message).await {
            Ok((response, ResponseOutcome::Accepted { message_id })) => self.base.succeed(
                message,
                json!({
                    "status_code": response.status,
                    "message_id": message_id,
                }),
            ),
            Ok((response, ResponseOutcome::Rejected(records))) => {
                self.base
                    .reject(message, response.status, records, response.details())
            }
            Err(err) => self.base.fail(message, err),
        }
    }

    fn errors(&self) -> &ErrorHistory {
        self.base.errors()
    }

    fn clear_errors(&mut self) -> Vec<ErrorRecord> {
        self.base.clear_errors()
    }
}

/// The closed set of transports, selected by configuration.
pub enum AnyTransport {
    /// Brevo HTTP API.
    Brevo(BrevoTransport),
    /// SendGrid HTTP API.
    SendGrid(SendGridTransport),
    /// Mailgun HTTP API.
    Mailgun(MailgunTransport),
    /// SMTP relay.
    Smtp(SmtpTransport),
}

impl AnyTransport {
    /// Builds the transport named by `config`.
    pub fn from_config(
        config: TransportConfig,
        logger: Option<Arc<dyn MailLogger>>,
    ) -> MailResult<Self> {
        Ok(match config {
            TransportConfig::Brevo(c) => AnyTransport::Brevo(BrevoTransport::new(c, logger)?),
            TransportConfig::SendGrid(c) => {
                AnyTransport::SendGrid(SendGridTransport::new(c, logger)?)
            }
            TransportConfig::Mailgun(c) => AnyTransport::Mailgun(MailgunTransport::new(c, logger)?),
            TransportConfig::Smtp(c) => AnyTransport::Smtp(SmtpTransport::new(c, logger)?),
        })
    }

    /// Uses the given HTTP client. No effect on SMTP.
    pub fn with_http_client(self, client: Arc<dyn HttpClient>) -> Self {
        match self {
            AnyTransport::Brevo(t) => AnyTransport::Brevo(t.with_http_client(client)),
            AnyTransport::SendGrid(t) => AnyTransport::SendGrid(t.with_http_client(client)),
            AnyTransport::Mailgun(t) => AnyTransport::Mailgun(t.with_http_client(client)),
            smtp @ AnyTransport::Smtp(_) => smtp,
        }
    }

    fn inner(&self) -> &dyn Transport {
        match self {
            AnyTransport::Brevo(t) => t,
            AnyTransport::SendGrid(t) => t,
            AnyTransport::Mailgun(t) => t,
            AnyTransport::Smtp(t) => t,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Transport {
        match self {
            AnyTransport::Brevo(t) => t,
            AnyTransport::SendGrid(t) => t,
            AnyTransport::Mailgun(t) => t,
            AnyTransport::Smtp(t) => t,
        }
    }
}

#[async_trait]
impl Transport for AnyTransport {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    async fn send(&mut self, message: &Message) -> bool {
        self.inner_mut().send(message).await
    }

    fn errors(&self) -> &ErrorHistory {
        self.inner().errors()
    }

    fn clear_errors(&mut self) -> Vec<ErrorRecord> {
        self.inner_mut().clear_errors()
    }
}
