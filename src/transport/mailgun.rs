//! Mailgun messages API.
//!
//! Form body posted to `/{domain}/messages` with basic authentication as user
//! `api`. Attachments and inline images travel as multipart file parts.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use super::{ApiAdapter, ApiTransport, ResponseOutcome};
use crate::config::{MailgunConfig, TransportSettings};
use crate::errors::{ErrorRecord, MailResult};
use crate::http::{FormFile, HttpRequest, HttpResponse, RequestBody};
use crate::observability::MailLogger;
use crate::types::{Message, Recipients, DEFAULT_CONTENT_TYPE};

/// Status Mailgun returns for a queued message.
pub const MAILGUN_SUCCESS_STATUS: u16 = 200;

const USER_AGENT: &str = concat!("integrations-mail/", env!("CARGO_PKG_VERSION"));

/// Mailgun transport.
pub type MailgunTransport = ApiTransport<MailgunAdapter>;

impl MailgunTransport {
    /// Creates a Mailgun transport.
    pub fn new(config: MailgunConfig, logger: Option<Arc<dyn MailLogger>>) -> MailResult<Self> {
        let settings = config.settings.clone();
        Self::with_adapter(MailgunAdapter { config }, settings, logger)
    }
}

/// Form fields and file parts of a Mailgun request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MailgunPayload {
    /// Ordered text fields. A repeated option name replaces the earlier value.
    pub fields: Vec<(String, String)>,
    /// Attachment and inline parts.
    pub files: Vec<FormFile>,
}

impl MailgunPayload {
    /// Value of the first field with the given name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    fn set(&mut self, name: &str, value: String) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some(field) => field.1 = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    fn apply_options(&mut self, options: &Map<String, Value>) {
        for (name, value) in options {
            self.set(name, option_value(value));
        }
    }
}

/// Mailgun payload and response rules.
#[derive(Debug, Clone)]
pub struct MailgunAdapter {
    config: MailgunConfig,
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn option_value(value: &Value) -> String {
    match value {
        Value::Bool(flag) => yes_no(*flag).to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(option_value)
            .collect::<Vec<_>>()
            .join(","),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn mailbox(email: &str, name: &str) -> String {
    if name.is_empty() {
        email.to_string()
    } else {
        format!("\"{}\" <{}>", name, email)
    }
}

fn address_list(recipients: &Recipients) -> String {
    recipients
        .iter()
        .map(|(email, name)| mailbox(email, name))
        .collect::<Vec<_>>()
        .join(", ")
}

impl ApiAdapter for MailgunAdapter {
    type Payload = MailgunPayload;

    const NAME: &'static str = "Mailgun";

    fn validate(&self) -> MailResult<()> {
        self.config.validate()
    }

    fn describe(&self, settings: &TransportSettings) -> Value {
        json!({
            "domain": self.config.domain,
            "endpoint": self.config.base_url(),
            "tracking_enabled": settings.enable_tracking,
        })
    }

    fn build_payload(&self, message: &Message, settings: &TransportSettings) -> MailgunPayload {
        let mut payload = MailgunPayload::default();

        if let Some((email, name)) = message.from().first() {
            payload.push("from", mailbox(email, name));
        }
        payload.push("to", address_list(message.to()));
        if !message.cc().is_empty() {
            payload.push("cc", address_list(message.cc()));
        }
        if !message.bcc().is_empty() {
            payload.push("bcc", address_list(message.bcc()));
        }
        payload.push("subject", message.subject());

        if let Some((email, name)) = message.reply_to().first() {
            payload.push("h:Reply-To", mailbox(email, name));
        }

        if !message.html_body().is_empty() {
            payload.push("html", message.html_body());
        }
        if !message.text_body().is_empty() {
            payload.push("text", message.text_body());
        }

        for (name, value) in message.headers() {
            payload.push(format!("h:{}", name), value.as_str());
        }

        let tracking = yes_no(settings.enable_tracking);
        payload.push("o:tracking", tracking);
        payload.push("o:tracking-opens", tracking);
        payload.push("o:tracking-clicks", tracking);

        payload.apply_options(&settings.options);
        payload.apply_options(&self.config.extra_options);

        for attachment in message.attachments().values() {
            if attachment.content.is_empty() {
                continue;
            }
            payload.files.push(FormFile {
                field: format!("attachment[{}]", attachment.file_name),
                file_name: attachment.file_name.clone(),
                content_type: attachment
                    .content_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
                content: attachment.content.clone(),
            });
        }

        // Mailgun matches inline parts to `cid:` references by file name.
        for (cid, embedded) in message.embeddings() {
            if embedded.content.is_empty() {
                continue;
            }
            payload.files.push(FormFile {
                field: "inline".to_string(),
                file_name: cid.clone(),
                content_type: embedded.resolved_content_type(),
                content: embedded.content.clone(),
            });
        }

        payload
    }

    fn create_request(&self, payload: MailgunPayload) -> HttpRequest {
        HttpRequest::post(self.config.messages_url())
            .with_header("Accept", "application/json")
            .with_basic_auth("api", self.config.api_key.clone())
            .with_user_agent(USER_AGENT)
            .with_body(RequestBody::Form {
                fields: payload.fields,
                files: payload.files,
            })
    }

    fn interpret_response(&self, response: &HttpResponse) -> ResponseOutcome {
        let data = response.data();

        let has_error = data.as_ref().is_some_and(|d| d.get("error").is_some());
        if response.status == MAILGUN_SUCCESS_STATUS && !has_error {
            let message_id = data
                .as_ref()
                .and_then(|d| d.get("id"))
                .and_then(Value::as_str)
                .map(str::to_string);
            return ResponseOutcome::Accepted { message_id };
        }

        let text = data
            .as_ref()
            .and_then(|d| d.get("message"))
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or("Unknown error");

        ResponseOutcome::Rejected(vec![ErrorRecord::new(
            i64::from(response.status),
            format!("Mailgun API error (code: {}): {}", response.status, text),
        )
        .with_details(response.details())])
    }
}
