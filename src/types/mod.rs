//! Provider-agnostic message model.
//!
//! This module provides:
//! - [`Recipients`], an ordered address to display-name mapping
//! - [`Attachment`] and [`AttachOptions`] for files and inline embeddings
//! - [`Message`], the mutable envelope handed to a transport
//!
//! Nothing here validates address syntax. That is left to the transport and
//! the provider behind it.

use std::fmt;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::{MailError, MailResult};

/// Default message charset.
pub const DEFAULT_CHARSET: &str = "utf-8";

/// Fallback content type for binary parts.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Ordered mapping of email address to display name.
///
/// A bare address normalizes to an entry with an empty display name. Keys are
/// unique; inserting an existing address replaces its display name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Recipients(IndexMap<String, String>);

impl Recipients {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an address with a display name.
    pub fn insert(&mut self, email: impl Into<String>, name: impl Into<String>) {
        self.0.insert(email.into(), name.into());
    }

    /// Iterates `(email, name)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(email, name)| (email.as_str(), name.as_str()))
    }

    /// Iterates addresses in insertion order.
    pub fn emails(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Returns the first entry.
    pub fn first(&self) -> Option<(&str, &str)> {
        self.0
            .first()
            .map(|(email, name)| (email.as_str(), name.as_str()))
    }

    /// Returns the display name for an address.
    pub fn name_of(&self, email: &str) -> Option<&str> {
        self.0.get(email).map(String::as_str)
    }

    /// Number of addresses.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no addresses.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Recipients {
    fn from(email: &str) -> Self {
        Self::from(email.to_string())
    }
}

impl From<String> for Recipients {
    fn from(email: String) -> Self {
        let mut map = IndexMap::new();
        map.insert(email, String::new());
        Self(map)
    }
}

impl<E: Into<String>, N: Into<String>> From<(E, N)> for Recipients {
    fn from((email, name): (E, N)) -> Self {
        let mut map = IndexMap::new();
        map.insert(email.into(), name.into());
        Self(map)
    }
}

impl<E: Into<String>, N: Into<String>, const LEN: usize> From<[(E, N); LEN]> for Recipients {
    fn from(pairs: [(E, N); LEN]) -> Self {
        pairs.into_iter().collect()
    }
}

impl<E: Into<String>, N: Into<String>> From<Vec<(E, N)>> for Recipients {
    fn from(pairs: Vec<(E, N)>) -> Self {
        pairs.into_iter().collect()
    }
}

impl From<Vec<&str>> for Recipients {
    fn from(emails: Vec<&str>) -> Self {
        emails.into_iter().map(|email| (email, "")).collect()
    }
}

impl From<IndexMap<String, String>> for Recipients {
    fn from(map: IndexMap<String, String>) -> Self {
        Self(map)
    }
}

impl<E: Into<String>, N: Into<String>> FromIterator<(E, N)> for Recipients {
    fn from_iter<I: IntoIterator<Item = (E, N)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(email, name)| (email.into(), name.into()))
                .collect(),
        )
    }
}

/// A file attached to or embedded in a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// File name presented to the recipient.
    pub file_name: String,
    /// Explicit MIME type, if the caller supplied one.
    pub content_type: Option<String>,
    /// Raw content.
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
}

impl Attachment {
    /// Creates an attachment from literal content.
    pub fn new(file_name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            content: content.into(),
        }
    }

    /// Sets the MIME type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Returns the explicit MIME type, or one guessed from the file name.
    pub fn resolved_content_type(&self) -> String {
        match &self.content_type {
            Some(content_type) => content_type.clone(),
            None => mime_guess::from_path(&self.file_name)
                .first_or(mime::APPLICATION_OCTET_STREAM)
                .essence_str()
                .to_string(),
        }
    }
}

/// Options for [`Message::attach`] and [`Message::embed`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachOptions {
    /// File name presented to the recipient.
    pub file_name: Option<String>,
    /// MIME type.
    pub content_type: Option<String>,
    /// Content id for embeddings.
    pub cid: Option<String>,
}

impl AttachOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the file name.
    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// Sets the MIME type.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Sets the content id.
    pub fn cid(mut self, cid: impl Into<String>) -> Self {
        self.cid = Some(cid.into());
        self
    }

    fn required_file_name(&self) -> MailResult<String> {
        self.file_name
            .clone()
            .ok_or_else(|| MailError::invalid_input("The \"file_name\" option is required."))
    }

    fn into_attachment(self, file_name: String, content: Vec<u8>) -> Attachment {
        Attachment {
            file_name,
            content_type: self.content_type,
            content,
        }
    }

    fn content_id(&self) -> String {
        self.cid
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string())
    }
}

/// Provider-agnostic email envelope.
///
/// Setters take `&mut self` and return `&mut Self` so calls chain:
///
/// ```rust
/// use integrations_mail::Message;
///
/// let mut message = Message::new();
/// message
///     .set_from("a@example.com")
///     .set_to(("b@example.com", "B"))
///     .set_subject("Hi")
///     .set_text_body("hello");
/// assert_eq!(message.to().name_of("b@example.com"), Some("B"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    from: Recipients,
    to: Recipients,
    reply_to: Recipients,
    cc: Recipients,
    bcc: Recipients,
    subject: String,
    text_body: String,
    html_body: String,
    attachments: IndexMap<String, Attachment>,
    embeddings: IndexMap<String, Attachment>,
    headers: IndexMap<String, String>,
    charset: String,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            from: Recipients::new(),
            to: Recipients::new(),
            reply_to: Recipients::new(),
            cc: Recipients::new(),
            bcc: Recipients::new(),
            subject: String::new(),
            text_body: String::new(),
            html_body: String::new(),
            attachments: IndexMap::new(),
            embeddings: IndexMap::new(),
            headers: IndexMap::new(),
            charset: DEFAULT_CHARSET.to_string(),
        }
    }
}

impl Message {
    /// Creates an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sender(s).
    pub fn set_from(&mut self, from: impl Into<Recipients>) -> &mut Self {
        self.from = from.into();
        self
    }

    /// Sets the primary recipients.
    pub fn set_to(&mut self, to: impl Into<Recipients>) -> &mut Self {
        self.to = to.into();
        self
    }

    /// Sets the reply-to address(es).
    pub fn set_reply_to(&mut self, reply_to: impl Into<Recipients>) -> &mut Self {
        self.reply_to = reply_to.into();
        self
    }

    /// Sets the carbon-copy recipients.
    pub fn set_cc(&mut self, cc: impl Into<Recipients>) -> &mut Self {
        self.cc = cc.into();
        self
    }

    /// Sets the blind carbon-copy recipients.
    pub fn set_bcc(&mut self, bcc: impl Into<Recipients>) -> &mut Self {
        self.bcc = bcc.into();
        self
    }

    /// Sets the subject, trimming surrounding whitespace.
    pub fn set_subject(&mut self, subject: impl AsRef<str>) -> &mut Self {
        self.subject = subject.as_ref().trim().to_string();
        self
    }

    /// Sets the plain-text body.
    pub fn set_text_body(&mut self, text: impl Into<String>) -> &mut Self {
        self.text_body = text.into();
        self
    }

    /// Sets the HTML body.
    pub fn set_html_body(&mut self, html: impl Into<String>) -> &mut Self {
        self.html_body = html.into();
        self
    }

    /// Sets the charset.
    pub fn set_charset(&mut self, charset: impl Into<String>) -> &mut Self {
        self.charset = charset.into();
        self
    }

    /// Replaces every custom header.
    pub fn set_headers<I, K, V>(&mut self, headers: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers = headers
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect();
        self
    }

    /// Adds a custom header, replacing any earlier value for the same name.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Attaches a file read eagerly from `path`.
    ///
    /// `options.file_name` is required. Re-attaching under the same file name
    /// replaces the earlier entry.
    pub fn attach(&mut self, path: impl AsRef<Path>, options: AttachOptions) -> MailResult<&mut Self> {
        let file_name = options.required_file_name()?;
        let content = std::fs::read(path.as_ref())?;
        self.attachments
            .insert(file_name.clone(), options.into_attachment(file_name, content));
        Ok(self)
    }

    /// Attaches literal content. `options.file_name` is required.
    pub fn attach_content(
        &mut self,
        content: impl Into<Vec<u8>>,
        options: AttachOptions,
    ) -> MailResult<&mut Self> {
        let file_name = options.required_file_name()?;
        self.attachments
            .insert(file_name.clone(), options.into_attachment(file_name, content.into()));
        Ok(self)
    }

    /// Embeds a file read eagerly from `path` and returns its `cid:` reference.
    ///
    /// The file name defaults to the base name of `path`; the content id to a
    /// random token.
    pub fn embed(&mut self, path: impl AsRef<Path>, options: AttachOptions) -> MailResult<String> {
        let path = path.as_ref();
        let file_name = options.file_name.clone().unwrap_or_else(|| {
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "embed.dat".to_string())
        });
        let content = std::fs::read(path)?;
        Ok(self.insert_embedding(file_name, content, options))
    }

    /// Embeds literal content and returns its `cid:` reference.
    /// `options.file_name` is required.
    pub fn embed_content(
        &mut self,
        content: impl Into<Vec<u8>>,
        options: AttachOptions,
    ) -> MailResult<String> {
        let file_name = options.required_file_name()?;
        Ok(self.insert_embedding(file_name, content.into(), options))
    }

    fn insert_embedding(&mut self, file_name: String, content: Vec<u8>, options: AttachOptions) -> String {
        let cid = options.content_id();
        self.embeddings
            .insert(cid.clone(), options.into_attachment(file_name, content));
        format!("cid:{}", cid)
    }

    /// Sender(s).
    pub fn from(&self) -> &Recipients {
        &self.from
    }

    /// Primary recipients.
    pub fn to(&self) -> &Recipients {
        &self.to
    }

    /// Reply-to address(es).
    pub fn reply_to(&self) -> &Recipients {
        &self.reply_to
    }

    /// Carbon-copy recipients.
    pub fn cc(&self) -> &Recipients {
        &self.cc
    }

    /// Blind carbon-copy recipients.
    pub fn bcc(&self) -> &Recipients {
        &self.bcc
    }

    /// Subject line.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Plain-text body, empty if unset.
    pub fn text_body(&self) -> &str {
        &self.text_body
    }

    /// HTML body, empty if unset.
    pub fn html_body(&self) -> &str {
        &self.html_body
    }

    /// Charset.
    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// Custom headers.
    pub fn headers(&self) -> &IndexMap<String, String> {
        &self.headers
    }

    /// Attachments keyed by file name.
    pub fn attachments(&self) -> &IndexMap<String, Attachment> {
        &self.attachments
    }

    /// Embeddings keyed by content id.
    pub fn embeddings(&self) -> &IndexMap<String, Attachment> {
        &self.embeddings
    }
}

fn join_emails(recipients: &Recipients) -> String {
    recipients.emails().collect::<Vec<_>>().join(", ")
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.subject)?;
        writeln!(f, "From: {}", join_emails(&self.from))?;
        writeln!(f, "To: {}", join_emails(&self.to))?;
        if !self.reply_to.is_empty() {
            writeln!(f, "Reply-To: {}", join_emails(&self.reply_to))?;
        }
        if !self.cc.is_empty() {
            writeln!(f, "Cc: {}", join_emails(&self.cc))?;
        }
        if !self.bcc.is_empty() {
            writeln!(f, "Bcc: {}", join_emails(&self.bcc))?;
        }
        writeln!(f)?;
        if self.html_body.is_empty() {
            write!(f, "{}", self.text_body)
        } else {
            write!(f, "{}", self.html_body)
        }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
