//! SendGrid v3 mail send API.
//!
//! JSON body with recipients under `personalizations[0]`, bearer
//! authentication, and 202 for an accepted message.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::ExposeSecret;
use serde_json::{json, Map, Value};

use super::{
    address_objects, first_address_object, merge_options, ApiAdapter, ApiTransport,
    ResponseOutcome,
};
use crate::config::{SendGridConfig, TransportSettings};
use crate::errors::{ErrorRecord, MailResult};
use crate::http::{HttpRequest, HttpResponse, RequestBody};
use crate::observability::MailLogger;
use crate::types::{Attachment, Message};

/// Status SendGrid returns for an accepted message.
pub const SENDGRID_SUCCESS_STATUS: u16 = 202;

/// SendGrid transport.
pub type SendGridTransport = ApiTransport<SendGridAdapter>;

impl SendGridTransport {
    /// Creates a SendGrid transport.
    pub fn new(config: SendGridConfig, logger: Option<Arc<dyn MailLogger>>) -> MailResult<Self> {
        let settings = config.settings.clone();
        Self::with_adapter(SendGridAdapter { config }, settings, logger)
    }
}

/// SendGrid payload and response rules.
#[derive(Debug, Clone)]
pub struct SendGridAdapter {
    config: SendGridConfig,
}

fn attachment_entry(attachment: &Attachment, disposition: &str, content_id: Option<&str>) -> Value {
    let mut entry = Map::new();
    entry.insert("filename".into(), Value::String(attachment.file_name.clone()));
    entry.insert("content".into(), Value::String(STANDARD.encode(&attachment.content)));
    entry.insert("disposition".into(), Value::String(disposition.to_string()));
    entry.insert(
        "type".into(),
        Value::String(
            attachment
                .content_type
                .clone()
                .unwrap_or_else(|| crate::types::DEFAULT_CONTENT_TYPE.to_string()),
        ),
    );
    if let Some(content_id) = content_id {
        entry.insert("content_id".into(), Value::String(content_id.to_string()));
    }
    Value::Object(entry)
}

fn error_messages(data: Option<&Value>) -> Vec<String> {
    let Some(errors) = data.and_then(|d| d.get("errors")).and_then(Value::as_array) else {
        return Vec::new();
    };

    errors
        .iter()
        .filter_map(|error| {
            let message = error.get("message").and_then(Value::as_str).unwrap_or("");
            if message.is_empty() {
                return None;
            }
            match error.get("field").and_then(Value::as_str) {
                Some(field) if !field.is_empty() => Some(format!("{} (field: {})", message, field)),
                _ => Some(message.to_string()),
            }
        })
        .collect()
}

impl ApiAdapter for SendGridAdapter {
    type Payload = Value;

    const NAME: &'static str = "SendGrid";

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
        let mut personalization = Map::new();
        personalization.insert("to".into(), address_objects(message.to()));
        if !message.cc().is_empty() {
            personalization.insert("cc".into(), address_objects(message.cc()));
        }
        if !message.bcc().is_empty() {
            personalization.insert("bcc".into(), address_objects(message.bcc()));
        }

        let mut payload = Map::new();
        payload.insert(
            "personalizations".into(),
            Value::Array(vec![Value::Object(personalization)]),
        );
        payload.insert("from".into(), first_address_object(message.from()));
        payload.insert("subject".into(), Value::String(message.subject().to_string()));

        if !message.reply_to().is_empty() {
            payload.insert("reply_to".into(), first_address_object(message.reply_to()));
        }

        let mut content = Vec::new();
        if !message.text_body().is_empty() {
            content.push(json!({"type": "text/plain", "value": message.text_body()}));
        }
        if !message.html_body().is_empty() {
            content.push(json!({"type": "text/html", "value": message.html_body()}));
        }
        payload.insert("content".into(), Value::Array(content));

        let mut attachments: Vec<Value> = message
            .attachments()
            .values()
            .filter(|a| !a.content.is_empty())
            .map(|a| attachment_entry(a, "attachment", None))
            .collect();
        attachments.extend(
            message
                .embeddings()
                .iter()
                .filter(|(_, a)| !a.content.is_empty())
                .map(|(cid, a)| attachment_entry(a, "inline", Some(cid))),
        );
        if !message.attachments().is_empty() || !message.embeddings().is_empty() {
            payload.insert("attachments".into(), Value::Array(attachments));
        }

        if !message.headers().is_empty() {
            payload.insert("headers".into(), json!(message.headers()));
        }

        if settings.enable_tracking {
            payload.insert(
                "tracking_settings".into(),
                json!({
                    "click_tracking": {"enable": true},
                    "open_tracking": {"enable": true},
                }),
            );
        }

        let mut payload = Value::Object(payload);
        merge_options(&mut payload, &settings.options);
        merge_options(&mut payload, &self.config.extra_options);
        payload
    }

    fn create_request(&self, payload: Value) -> HttpRequest {
        HttpRequest::post(self.config.endpoint())
            .with_header(
                "Authorization",
                format!("Bearer {}", self.config.api_key.expose_secret()),
            )
            .with_header("Content-Type", "application/json")
            .with_header("Accept", "application/json")
            .with_body(RequestBody::Json(payload))
    }

    fn interpret_response(&self, response: &HttpResponse) -> ResponseOutcome {
        if response.status == SENDGRID_SUCCESS_STATUS {
            return ResponseOutcome::Accepted {
                message_id: response.header("x-message-id").map(str::to_string),
            };
        }

        let data = response.data();
        let mut messages = error_messages(data.as_ref());
        if messages.is_empty() {
            messages.push("Unknown error".to_string());
        }

        let code = i64::from(response.status);
        let details = response.details();
        ResponseOutcome::Rejected(
            messages
                .into_iter()
                .map(|text| {
                    ErrorRecord::new(
                        code,
                        format!("SendGrid API error (code: {}): {}", response.status, text),
                    )
                    .with_details(details.clone())
                })
                .collect(),
        )
    }
}
