//! # Mail Transport Integration Library
//!
//! One message model and one delivery contract over several providers:
//! - Brevo, SendGrid and Mailgun HTTP APIs
//! - SMTP through lettre
//! - Required-field validation before any network call
//! - Bounded per-transport error history
//! - Audit logging with header and field redaction
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use integrations_mail::{Mailer, MailerConfig, Message, SendGridConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut mailer = Mailer::new(MailerConfig::new(SendGridConfig::new("SG.key")));
//!
//!     let mut message = Message::new();
//!     message
//!         .set_from(("sender@example.com", "Sender"))
//!         .set_to("recipient@example.com")
//!         .set_subject("Hello from Rust!")
//!         .set_text_body("This is a test email.");
//!
//!     if !mailer.send(&message).await? {
//!         if let Some(error) = mailer.transport()?.error() {
//!             eprintln!("send failed: {}", error);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod errors;
pub mod types;

// HTTP layer
pub mod http;

// Transport layer
pub mod transport;

// Observability
pub mod observability;

// Client
pub mod client;

// Mocks for testing
pub mod mocks;

// Re-exports for convenience
pub use client::Mailer;
pub use config::{
    BrevoConfig, MailerConfig, MailgunConfig, MailgunRegion, SendGridConfig, SendGridRegion,
    SmtpConfig, SmtpConfigBuilder, SmtpEncryption, TransportConfig, TransportSettings,
};
pub use errors::{ErrorHistory, ErrorRecord, MailError, MailErrorKind, MailResult};
pub use types::{AttachOptions, Attachment, Message, Recipients};
pub use http::{HttpClient, HttpRequest, HttpResponse, ReqwestClient, RequestBody};
pub use observability::{
    AuditLogger, AuditLoggerConfig, LogLevel, LogRecord, LogSink, MailLogger, Redactor,
    TracingSink,
};
pub use transport::{
    AnyTransport, ApiAdapter, ApiTransport, BrevoTransport, MailgunTransport, SendGridTransport,
    SmtpTransport, Transport,
};
