//! Brevo transactional email API.
//!
//! JSON body posted to `/v3/smtp/email` with the key in an `api-key` header.
//! A 201 means the message was accepted.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::ExposeSecret;
use serde_json::{json, Map, Value};

use super::{
    address_objects, first_address_object, merge_options, ApiAdapter, ApiTransport,
    ResponseOutcome,
};
use crate::config::{BrevoConfig, TransportSettings};
use crate::errors::{ErrorRecord, MailResult, GENERIC_ERROR_CODE};
use crate::http::{HttpRequest, HttpResponse, RequestBody};
use crate::observability::MailLogger;
use crate::types::Message;

/// Status Brevo returns for an accepted message.
pub const BREVO_SUCCESS_STATUS: u16 = 201;

/// Brevo transport.
pub type BrevoTransport = ApiTransport<BrevoAdapter>;

impl BrevoTransport {
    /// Creates a Brevo transport.
    pub fn new(config: BrevoConfig, logger: Option<Arc<dyn MailLogger>>) -> MailResult<Self> {
        let settings = config.settings.clone();
        Self::with_adapter(BrevoAdapter { config }, settings, logger)
    }
}

/// Brevo payload and response rules.
#[derive(Debug, Clone)]
pub struct BrevoAdapter {
    config: BrevoConfig,
}

impl ApiAdapter for BrevoAdapter {
    type Payload = Value;

    const NAME: &'static str = "Brevo";

    fn validate(&self) -> MailResult<()> {
        self.config.validate()
    }

    fn describe(&self, settings: &TransportSettings) -> Value {
        json!({
            "endpoint": self.config.endpoint(),
            "tracking_enabled": settings.enable_tracking,
        })
    }

    fn build_payload(&self, message: &Message, settings: &TransportSettings) -> Value {
        let mut payload = Map::new();
        payload.insert("to".into(), address_objects(message.to()));
        payload.insert("subject".into(), Value::String(message.subject().to_string()));
        payload.insert("sender".into(), first_address_object(message.from()));

        if !message.cc().is_empty() {
            payload.insert("cc".into(), address_objects(message.cc()));
        }
        if !message.bcc().is_empty() {
            payload.insert("bcc".into(), address_objects(message.bcc()));
        }
        if !message.reply_to().is_empty() {
            payload.insert("replyTo".into(), first_address_object(message.reply_to()));
        }

        if !message.html_body().is_empty() {
            payload.insert("htmlContent".into(), Value::String(message.html_body().to_string()));
        }
        if !message.text_body().is_empty() {
            payload.insert("textContent".into(), Value::String(message.text_body().to_string()));
        }

        // Brevo has no content-id concept; embeddings are not sent.
        let attachments: Vec<Value> = message
            .attachments()
            .values()
            .filter(|a| !a.content.is_empty())
            .map(|a| {
                let mut entry = Map::new();
                entry.insert("name".into(), Value::String(a.file_name.clone()));
                entry.insert("content".into(), Value::String(STANDARD.encode(&a.content)));
                if let Some(content_type) = &a.content_type {
                    entry.insert("contentType".into(), Value::String(content_type.clone()));
                }
                Value::Object(entry)
            })
            .collect();
        if !message.attachments().is_empty() {
            payload.insert("attachment".into(), Value::Array(attachments));
        }

        if !message.headers().is_empty() {
            payload.insert("headers".into(), json!(message.headers()));
        }

        if settings.enable_tracking {
            payload.insert("tracking".into(), json!({"opens": true, "clicks": true}));
        }

        let mut payload = Value::Object(payload);
        merge_options(&mut payload, &settings.options);
        merge_options(&mut payload, &self.config.extra_options);
        payload
    }

    fn create_request(&self, payload: Value) -> HttpRequest {
        HttpRequest::post(self.config.endpoint())
            .with_header("api-key", self.config.api_key.expose_secret().as_str())
            .with_header("Content-Type", "application/json")
            .with_header("Accept", "application/json")
            .with_body(RequestBody::Json(payload))
    }

    fn interpret_response(&self, response: &HttpResponse) -> ResponseOutcome {
        let data = response.data();

        if response.status == BREVO_SUCCESS_STATUS {
            let message_id = data
                .as_ref()
                .and_then(|d| d.get("messageId"))
                .and_then(value_to_string);
            return ResponseOutcome::Accepted { message_id };
        }

        let record = match data {
            Some(Value::Object(body)) => {
                let code = body
                    .get("code")
                    .and_then(numeric_code)
                    .unwrap_or(i64::from(response.status));
                let text = body
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown error");
                ErrorRecord::new(code, format!("Brevo API error (code: {}): {}", code, text))
                    .with_details(Some(Value::Object(body)))
            }
            _ => ErrorRecord::new(
                GENERIC_ERROR_CODE,
                format!("Brevo API error (code: {}): Unknown error", response.status),
            )
            .with_details(response.details()),
        };

        ResponseOutcome::Rejected(vec![record])
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn numeric_code(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
