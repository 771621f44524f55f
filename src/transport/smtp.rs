//! SMTP delivery through lettre.
//!
//! The message is rendered to MIME by lettre's builder and handed to an
//! [`SmtpMailer`]. The connection-owning [`LettreMailer`] is created on the
//! first send, so constructing a transport never touches the network.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::header::{ContentType, HeaderName, HeaderValue};
use lettre::message::{
    Attachment as MimeAttachment, Mailbox, MultiPart, MultiPartBuilder, SinglePart,
};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::extension::ClientId;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use secrecy::ExposeSecret;
use serde_json::json;

use super::{handle_error, Transport, TransportBase};
use crate::config::{SmtpConfig, SmtpEncryption};
use crate::errors::{ErrorHistory, ErrorRecord, MailError, MailResult};
use crate::observability::MailLogger;
use crate::types::{Message, Recipients};

/// Delivers a rendered message over SMTP.
#[async_trait]
pub trait SmtpMailer: Send + Sync {
    /// Sends one message.
    async fn send(&self, message: lettre::Message) -> MailResult<()>;
}

/// [`SmtpMailer`] backed by lettre's async SMTP transport.
pub struct LettreMailer {
    inner: AsyncSmtpTransport<Tokio1Executor>,
}

impl std::fmt::Debug for LettreMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LettreMailer").finish_non_exhaustive()
    }
}

impl LettreMailer {
    /// Creates a mailer for the configured relay. No connection is opened
    /// until the first message is sent.
    pub fn from_config(config: &SmtpConfig) -> MailResult<Self> {
        let builder = match config.encryption {
            SmtpEncryption::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(config.host.as_str())
            }
            SmtpEncryption::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            }
            SmtpEncryption::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?,
        };

        let mut builder = builder.port(config.port).timeout(Some(config.timeout));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                password.expose_secret().clone(),
            ));
        }

        if let Some(domain) = &config.local_domain {
            builder = builder.hello_name(ClientId::Domain(domain.clone()));
        }

        Ok(Self {
            inner: builder.build(),
        })
    }
}

#[async_trait]
impl SmtpMailer for LettreMailer {
    async fn send(&self, message: lettre::Message) -> MailResult<()> {
        self.inner.send(message).await?;
        Ok(())
    }
}

/// SMTP transport.
pub struct SmtpTransport {
    config: SmtpConfig,
    base: TransportBase,
    mailer: Option<Arc<dyn SmtpMailer>>,
}

impl std::fmt::Debug for SmtpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpTransport")
            .field("config", &self.config)
            .field("base", &self.base)
            .field("connected", &self.mailer.is_some())
            .finish()
    }
}

enum Body {
    Single(SinglePart),
    Multi(MultiPart),
}

impl Body {
    fn start(self, builder: MultiPartBuilder) -> MultiPart {
        match self {
            Body::Single(part) => builder.singlepart(part),
            Body::Multi(part) => builder.multipart(part),
        }
    }

    fn append_to(self, multi: MultiPart) -> MultiPart {
        match self {
            Body::Single(part) => multi.singlepart(part),
            Body::Multi(part) => multi.multipart(part),
        }
    }
}

fn content_type(value: &str) -> MailResult<ContentType> {
    ContentType::parse(value)
        .map_err(|e| MailError::smtp(format!("Invalid content type \"{}\": {}", value, e)))
}

fn mailbox(email: &str, name: &str) -> MailResult<Mailbox> {
    let name = (!name.is_empty()).then(|| name.to_string());
    Ok(Mailbox::new(name, email.parse()?))
}

fn mailboxes(recipients: &Recipients) -> MailResult<Vec<Mailbox>> {
    recipients
        .iter()
        .map(|(email, name)| mailbox(email, name))
        .collect()
}

fn text_part(mime: &str, charset: &str, body: &str) -> MailResult<SinglePart> {
    Ok(SinglePart::builder()
        .header(content_type(&format!("{}; charset={}", mime, charset))?)
        .body(body.to_string()))
}

impl SmtpTransport {
    /// Creates an SMTP transport. Fails on invalid configuration.
    pub fn new(config: SmtpConfig, logger: Option<Arc<dyn MailLogger>>) -> MailResult<Self> {
        config.validate()?;
        let base = TransportBase::new("SMTP", config.settings.clone(), logger);
        base.log(
            "SmtpTransport initialized",
            json!({
                "host": config.host,
                "port": config.port,
                "encrypted": config.is_encrypted(),
            }),
        );

        Ok(Self {
            config,
            base,
            mailer: None,
        })
    }

    /// Uses the given mailer instead of connecting on first send.
    pub fn with_mailer(mut self, mailer: Arc<dyn SmtpMailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    /// SMTP configuration.
    pub fn config(&self) -> &SmtpConfig {
        &self.config
    }

    fn mailer(&mut self) -> MailResult<Arc<dyn SmtpMailer>> {
        if let Some(mailer) = &self.mailer {
            return Ok(mailer.clone());
        }
        tracing::debug!(host = %self.config.host, port = self.config.port, "creating SMTP mailer");
        let mailer: Arc<dyn SmtpMailer> = Arc::new(
            LettreMailer::from_config(&self.config).map_err(|e| handle_error("SMTP mailer", e))?,
        );
        self.mailer = Some(mailer.clone());
        Ok(mailer)
    }

    fn message_id(&self, message: &Message) -> String {
        let domain = self
            .config
            .local_domain
            .as_deref()
            .or_else(|| {
                message
                    .from()
                    .first()
                    .and_then(|(email, _)| email.rsplit_once('@'))
                    .map(|(_, domain)| domain)
            })
            .unwrap_or("localhost");
        format!(
            "<{}.{}@{}>",
            uuid::Uuid::new_v4().simple(),
            chrono::Utc::now().timestamp(),
            domain
        )
    }

    /// Renders a message to MIME.
    ///
    /// Only the first `from` and `reply_to` entries are used. Embeddings are
    /// placed in a `multipart/related` part next to the HTML body and are
    /// dropped when there is no HTML body.
    pub fn build_message(&self, message: &Message) -> MailResult<lettre::Message> {
        let mut builder = lettre::Message::builder()
            .subject(message.subject())
            .message_id(Some(self.message_id(message)));

        if let Some((email, name)) = message.from().first() {
            builder = builder.from(mailbox(email, name)?);
        }
        if let Some((email, name)) = message.reply_to().first() {
            builder = builder.reply_to(mailbox(email, name)?);
        }
        for to in mailboxes(message.to())? {
            builder = builder.to(to);
        }
        for cc in mailboxes(message.cc())? {
            builder = builder.cc(cc);
        }
        for bcc in mailboxes(message.bcc())? {
            builder = builder.bcc(bcc);
        }

        for (name, value) in message.headers() {
            let header = HeaderName::new_from_ascii(name.clone())
                .map_err(|e| MailError::smtp(format!("Invalid header name \"{}\": {}", name, e)))?;
            builder = builder.raw_header(HeaderValue::new(header, value.clone()));
        }

        let charset = message.charset();
        let text = if message.text_body().is_empty() {
            None
        } else {
            Some(text_part("text/plain", charset, message.text_body())?)
        };

        let html = if message.html_body().is_empty() {
            None
        } else {
            let part = text_part("text/html", charset, message.html_body())?;
            if message.embeddings().is_empty() {
                Some(Body::Single(part))
            } else {
                let mut related = MultiPart::related().singlepart(part);
                for (cid, embedded) in message.embeddings() {
                    related = related.singlepart(
                        MimeAttachment::new_inline(cid.clone()).body(
                            embedded.content.clone(),
                            content_type(&embedded.resolved_content_type())?,
                        ),
                    );
                }
                Some(Body::Multi(related))
            }
        };

        let mut body = match (text, html) {
            (Some(text), Some(html)) => {
                Body::Multi(html.append_to(MultiPart::alternative().singlepart(text)))
            }
            (Some(text), None) => Body::Single(text),
            (None, Some(html)) => html,
            (None, None) => Body::Single(text_part("text/plain", charset, "")?),
        };

        if !message.attachments().is_empty() {
            let mut mixed = body.start(MultiPart::mixed());
            for attachment in message.attachments().values() {
                mixed = mixed.singlepart(
                    MimeAttachment::new(attachment.file_name.clone()).body(
                        attachment.content.clone(),
                        content_type(&attachment.resolved_content_type())?,
                    ),
                );
            }
            body = Body::Multi(mixed);
        }

        let email = match body {
            Body::Single(part) => builder.singlepart(part)?,
            Body::Multi(part) => builder.multipart(part)?,
        };
        Ok(email)
    }

    async fn deliver(&mut self, message: &Message) -> MailResult<Option<String>> {
        self.base.validate_message(message)?;

        let email = self.build_message(message)?;
        let message_id = email
            .headers()
            .get_raw("Message-ID")
            .map(|id| id.to_string());

        let mailer = self.mailer()?;
        mailer.send(email).await?;
        Ok(message_id)
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    fn name(&self) -> &'static str {
        self.base.name()
    }

    async fn send(&mut self, message: &Message) -> bool {
        self.base.log_preparing(message);

        match self.deliver(message).await {
            Ok(message_id) => self
                .base
                .succeed(message, json!({ "message_id": message_id })),
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
