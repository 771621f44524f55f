//! Configuration types for the mail transports.
//!
//! Provides:
//! - [`TransportSettings`], the knobs every transport shares
//! - One configuration per provider (Brevo, SendGrid, Mailgun, SMTP)
//! - [`TransportConfig`], the tagged selector used to pick a transport
//! - [`MailerConfig`], the sender-level configuration for [`crate::Mailer`]
//!
//! All validation happens at construction. A transport built from a config
//! that passed `validate()` never reports a configuration error from `send`.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{MailError, MailResult, DEFAULT_ERROR_HISTORY_LIMIT};
use crate::observability::AuditLoggerConfig;

/// Brevo transactional email endpoint.
pub const BREVO_ENDPOINT: &str = "https://api.brevo.com/v3/smtp/email";

/// SendGrid mail send endpoint.
pub const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

/// SendGrid mail send endpoint for EU regional subusers.
pub const SENDGRID_EU_ENDPOINT: &str = "https://api.eu.sendgrid.com/v3/mail/send";

/// Mailgun API base URL.
pub const MAILGUN_ENDPOINT: &str = "https://api.mailgun.net/v3";

/// Mailgun API base URL for the EU region.
pub const MAILGUN_EU_ENDPOINT: &str = "https://api.eu.mailgun.net/v3";

/// Default SMTP port.
pub const DEFAULT_SMTP_PORT: u16 = 25;

/// Default SMTP connection timeout.
pub const DEFAULT_SMTP_TIMEOUT: Duration = Duration::from_secs(30);

fn default_true() -> bool {
    true
}

fn default_error_history_limit() -> usize {
    DEFAULT_ERROR_HISTORY_LIMIT
}

fn validate_endpoint(endpoint: Option<&str>) -> MailResult<()> {
    if let Some(endpoint) = endpoint {
        url::Url::parse(endpoint).map_err(|e| {
            MailError::configuration(format!("Invalid endpoint URL '{}': {}", endpoint, e))
        })?;
    }
    Ok(())
}

fn require_secret(secret: &SecretString, message: &str) -> MailResult<()> {
    if secret.expose_secret().trim().is_empty() {
        return Err(MailError::configuration(message));
    }
    Ok(())
}

/// Settings shared by every transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportSettings {
    /// Ask the provider to track opens and clicks.
    #[serde(default)]
    pub enable_tracking: bool,
    /// Emit audit log entries. Forced off when the sender disables logging.
    #[serde(default = "default_true")]
    pub enable_logging: bool,
    /// Pass-through options merged over the computed payload.
    #[serde(default)]
    pub options: Map<String, Value>,
    /// Number of error records retained; zero keeps all of them.
    #[serde(default = "default_error_history_limit")]
    pub error_history_limit: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            enable_tracking: false,
            enable_logging: true,
            options: Map::new(),
            error_history_limit: DEFAULT_ERROR_HISTORY_LIMIT,
        }
    }
}

impl TransportSettings {
    /// Merges additional pass-through options, replacing existing keys.
    pub fn set_options(&mut self, options: Map<String, Value>) {
        self.options.extend(options);
    }
}

/// Brevo transport configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BrevoConfig {
    /// API key sent in the `api-key` header.
    pub api_key: SecretString,
    /// Endpoint override (staging hosts, test servers).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Shared settings.
    #[serde(flatten)]
    pub settings: TransportSettings,
    /// Brevo-specific options merged after the shared options.
    #[serde(default)]
    pub extra_options: Map<String, Value>,
}

impl BrevoConfig {
    /// Creates a configuration with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            endpoint: None,
            settings: TransportSettings::default(),
            extra_options: Map::new(),
        }
    }

    /// Overrides the endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Replaces the shared settings.
    pub fn with_settings(mut self, settings: TransportSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the Brevo-specific options.
    pub fn with_extra_options(mut self, options: Map<String, Value>) -> Self {
        self.extra_options = options;
        self
    }

    /// Returns the endpoint requests are sent to.
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(BREVO_ENDPOINT)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> MailResult<()> {
        require_secret(&self.api_key, "BrevoTransport api_key must be set.")?;
        validate_endpoint(self.endpoint.as_deref())
    }
}

/// SendGrid region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendGridRegion {
    /// Global endpoint.
    #[default]
    Global,
    /// EU regional endpoint.
    Eu,
}

/// SendGrid transport configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SendGridConfig {
    /// API key sent as a bearer token.
    pub api_key: SecretString,
    /// Endpoint region.
    #[serde(default)]
    pub region: SendGridRegion,
    /// Endpoint override; takes precedence over `region`.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Shared settings.
    #[serde(flatten)]
    pub settings: TransportSettings,
    /// SendGrid-specific options merged after the shared options.
    #[serde(default)]
    pub extra_options: Map<String, Value>,
}

impl SendGridConfig {
    /// Creates a configuration with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            region: SendGridRegion::Global,
            endpoint: None,
            settings: TransportSettings::default(),
            extra_options: Map::new(),
        }
    }

    /// Selects the endpoint region.
    pub fn with_region(mut self, region: SendGridRegion) -> Self {
        self.region = region;
        self
    }

    /// Overrides the endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Replaces the shared settings.
    pub fn with_settings(mut self, settings: TransportSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the SendGrid-specific options.
    pub fn with_extra_options(mut self, options: Map<String, Value>) -> Self {
        self.extra_options = options;
        self
    }

    /// Returns the endpoint requests are sent to.
    pub fn endpoint(&self) -> &str {
        match (&self.endpoint, self.region) {
            (Some(endpoint), _) => endpoint,
            (None, SendGridRegion::Global) => SENDGRID_ENDPOINT,
            (None, SendGridRegion::Eu) => SENDGRID_EU_ENDPOINT,
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> MailResult<()> {
        require_secret(&self.api_key, "SendGridTransport api_key must be set.")?;
        validate_endpoint(self.endpoint.as_deref())
    }
}

/// Mailgun region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailgunRegion {
    /// US endpoint.
    #[default]
    Us,
    /// EU endpoint.
    Eu,
}

/// Mailgun transport configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MailgunConfig {
    /// API key used for basic authentication as user `api`.
    pub api_key: SecretString,
    /// Sending domain.
    pub domain: String,
    /// API region.
    #[serde(default)]
    pub region: MailgunRegion,
    /// Base URL override; takes precedence over `region`.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Shared settings.
    #[serde(flatten)]
    pub settings: TransportSettings,
    /// Mailgun-specific options merged after the shared options.
    #[serde(default)]
    pub extra_options: Map<String, Value>,
}

impl MailgunConfig {
    /// Creates a configuration with the given API key and domain.
    pub fn new(api_key: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            domain: domain.into(),
            region: MailgunRegion::Us,
            endpoint: None,
            settings: TransportSettings::default(),
            extra_options: Map::new(),
        }
    }

    /// Selects the API region.
    pub fn with_region(mut self, region: MailgunRegion) -> Self {
        self.region = region;
        self
    }

    /// Overrides the base URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Replaces the shared settings.
    pub fn with_settings(mut self, settings: TransportSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the Mailgun-specific options.
    pub fn with_extra_options(mut self, options: Map<String, Value>) -> Self {
        self.extra_options = options;
        self
    }

    /// Returns the API base URL.
    pub fn base_url(&self) -> &str {
        match (&self.endpoint, self.region) {
            (Some(endpoint), _) => endpoint,
            (None, MailgunRegion::Us) => MAILGUN_ENDPOINT,
            (None, MailgunRegion::Eu) => MAILGUN_EU_ENDPOINT,
        }
    }

    /// Returns the messages URL for the configured domain.
    pub fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.base_url().trim_end_matches('/'), self.domain)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> MailResult<()> {
        require_secret(&self.api_key, "MailgunTransport api_key must be set.")?;
        if self.domain.trim().is_empty() {
            return Err(MailError::configuration("MailgunTransport domain must be set."));
        }
        validate_endpoint(self.endpoint.as_deref())
    }
}

/// SMTP connection security.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmtpEncryption {
    /// Plain connection (local relays, test servers).
    #[default]
    None,
    /// Upgrade with STARTTLS.
    #[serde(alias = "tls")]
    StartTls,
    /// Implicit TLS from the first byte.
    #[serde(rename = "ssl")]
    Tls,
}

/// SMTP transport configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    /// Server host.
    pub host: String,
    /// Server port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// Connection security.
    #[serde(default)]
    pub encryption: SmtpEncryption,
    /// Username for authentication.
    #[serde(default)]
    pub username: Option<String>,
    /// Password for authentication.
    #[serde(default)]
    pub password: Option<SecretString>,
    /// Connection timeout.
    #[serde(default = "default_smtp_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Domain announced in EHLO.
    #[serde(default)]
    pub local_domain: Option<String>,
    /// Shared settings. Tracking and options have no SMTP equivalent.
    #[serde(flatten)]
    pub settings: TransportSettings,
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

fn default_smtp_timeout() -> Duration {
    DEFAULT_SMTP_TIMEOUT
}

impl SmtpConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> SmtpConfigBuilder {
        SmtpConfigBuilder::default()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> MailResult<()> {
        if self.host.trim().is_empty() {
            return Err(MailError::configuration("SmtpTransport host must be set."));
        }

        if self.port == 0 {
            return Err(MailError::configuration(
                "SmtpTransport port must be a valid port number.",
            ));
        }

        Ok(())
    }

    /// Returns true if authentication is configured.
    pub fn has_auth(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Returns true if the connection is encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.encryption != SmtpEncryption::None
    }
}

/// Builder for SMTP configuration.
#[derive(Debug, Default)]
pub struct SmtpConfigBuilder {
    host: Option<String>,
    port: Option<u16>,
    encryption: SmtpEncryption,
    username: Option<String>,
    password: Option<SecretString>,
    timeout: Option<Duration>,
    local_domain: Option<String>,
    settings: TransportSettings,
}

impl SmtpConfigBuilder {
    /// Sets the server host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the server port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the connection security.
    pub fn encryption(mut self, encryption: SmtpEncryption) -> Self {
        self.encryption = encryption;
        self
    }

    /// Sets plain credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(SecretString::new(password.into()));
        self
    }

    /// Sets the connection timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the EHLO domain.
    pub fn local_domain(mut self, domain: impl Into<String>) -> Self {
        self.local_domain = Some(domain.into());
        self
    }

    /// Replaces the shared settings.
    pub fn settings(mut self, settings: TransportSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> MailResult<SmtpConfig> {
        let config = SmtpConfig {
            host: self
                .host
                .ok_or_else(|| MailError::configuration("SmtpTransport host must be set."))?,
            port: self.port.unwrap_or(DEFAULT_SMTP_PORT),
            encryption: self.encryption,
            username: self.username,
            password: self.password,
            timeout: self.timeout.unwrap_or(DEFAULT_SMTP_TIMEOUT),
            local_domain: self.local_domain,
            settings: self.settings,
        };

        config.validate()?;
        Ok(config)
    }
}

/// Transport selection, tagged by `transport`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Brevo HTTP API.
    Brevo(BrevoConfig),
    /// SendGrid HTTP API.
    #[serde(rename = "sendgrid")]
    SendGrid(SendGridConfig),
    /// Mailgun HTTP API.
    Mailgun(MailgunConfig),
    /// SMTP relay.
    Smtp(SmtpConfig),
}

impl TransportConfig {
    /// Shared settings of the selected transport.
    pub fn settings(&self) -> &TransportSettings {
        match self {
            TransportConfig::Brevo(c) => &c.settings,
            TransportConfig::SendGrid(c) => &c.settings,
            TransportConfig::Mailgun(c) => &c.settings,
            TransportConfig::Smtp(c) => &c.settings,
        }
    }

    /// Mutable shared settings of the selected transport.
    pub fn settings_mut(&mut self) -> &mut TransportSettings {
        match self {
            TransportConfig::Brevo(c) => &mut c.settings,
            TransportConfig::SendGrid(c) => &mut c.settings,
            TransportConfig::Mailgun(c) => &mut c.settings,
            TransportConfig::Smtp(c) => &mut c.settings,
        }
    }

    /// Validates the selected transport's configuration.
    pub fn validate(&self) -> MailResult<()> {
        match self {
            TransportConfig::Brevo(c) => c.validate(),
            TransportConfig::SendGrid(c) => c.validate(),
            TransportConfig::Mailgun(c) => c.validate(),
            TransportConfig::Smtp(c) => c.validate(),
        }
    }
}

impl From<BrevoConfig> for TransportConfig {
    fn from(config: BrevoConfig) -> Self {
        TransportConfig::Brevo(config)
    }
}

impl From<SendGridConfig> for TransportConfig {
    fn from(config: SendGridConfig) -> Self {
        TransportConfig::SendGrid(config)
    }
}

impl From<MailgunConfig> for TransportConfig {
    fn from(config: MailgunConfig) -> Self {
        TransportConfig::Mailgun(config)
    }
}

impl From<SmtpConfig> for TransportConfig {
    fn from(config: SmtpConfig) -> Self {
        TransportConfig::Smtp(config)
    }
}

/// Sender-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MailerConfig {
    /// Transport to build on first use.
    pub transport: TransportConfig,
    /// Audit logger configuration.
    #[serde(default)]
    pub logger: AuditLoggerConfig,
    /// Master switch; when false no transport logs.
    #[serde(default = "default_true")]
    pub logger_enabled: bool,
}

impl MailerConfig {
    /// Creates a configuration with default logging.
    pub fn new(transport: impl Into<TransportConfig>) -> Self {
        Self {
            transport: transport.into(),
            logger: AuditLoggerConfig::default(),
            logger_enabled: true,
        }
    }

    /// Sets the audit logger configuration.
    pub fn with_logger(mut self, logger: AuditLoggerConfig) -> Self {
        self.logger = logger;
        self
    }

    /// Sets the master logging switch.
    pub fn with_logger_enabled(mut self, enabled: bool) -> Self {
        self.logger_enabled = enabled;
        self
    }

    /// Transport configuration with the master logging switch applied.
    pub fn effective_transport(&self) -> TransportConfig {
        let mut transport = self.transport.clone();
        if !self.logger_enabled {
            transport.settings_mut().enable_logging = false;
        }
        transport
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn test_smtp_builder_defaults() {
        let config = SmtpConfig::builder().host("smtp.example.com").build().unwrap();

        assert_eq!(config.port, DEFAULT_SMTP_PORT);
        assert_eq!(config.timeout, DEFAULT_SMTP_TIMEOUT);
        assert_eq!(config.encryption, SmtpEncryption::None);
        assert!(!config.has_auth());
        assert!(config.settings.enable_logging);
    }

    #[test]
    fn test_smtp_validation() {
        assert!(SmtpConfig::builder().build().is_err());
        assert!(SmtpConfig::builder().host("  ").build().is_err());

        let err = SmtpConfig::builder().host("smtp.example.com").port(0).build().unwrap_err();
        assert!(err.message().contains("port"));
    }

    #[test]
    fn test_api_key_required() {
        assert!(BrevoConfig::new("").validate().is_err());
        assert!(SendGridConfig::new(" ").validate().is_err());
        assert!(BrevoConfig::new("key").validate().is_ok());
    }

    #[test]
    fn test_mailgun_domain_required() {
        let err = MailgunConfig::new("key", "").validate().unwrap_err();
        assert_eq!(err.message(), "MailgunTransport domain must be set.");
    }

    #[test]
    fn test_endpoint_must_parse() {
        let config = BrevoConfig::new("key").with_endpoint("not a url");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_regional_endpoints() {
        let sendgrid = SendGridConfig::new("key").with_region(SendGridRegion::Eu);
        assert_eq!(sendgrid.endpoint(), SENDGRID_EU_ENDPOINT);

        let mailgun = MailgunConfig::new("key", "mg.example.com").with_region(MailgunRegion::Eu);
        assert_eq!(
            mailgun.messages_url(),
            "https://api.eu.mailgun.net/v3/mg.example.com/messages"
        );

        let mailgun = mailgun.with_endpoint("http://127.0.0.1:9000/");
        assert_eq!(mailgun.messages_url(), "http://127.0.0.1:9000/mg.example.com/messages");
    }

    #[test]
    fn test_transport_config_is_tagged() {
        let config: TransportConfig = serde_json::from_value(json!({
            "transport": "sendgrid",
            "api_key": "SG.key",
            "region": "eu",
            "enable_tracking": true
        }))
        .unwrap();

        match &config {
            TransportConfig::SendGrid(c) => {
                assert_eq!(c.endpoint(), SENDGRID_EU_ENDPOINT);
                assert!(c.settings.enable_tracking);
                assert!(c.settings.enable_logging);
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_smtp_config_deserialize() {
        let config: TransportConfig = serde_json::from_value(json!({
            "transport": "smtp",
            "host": "mail.example.com",
            "port": 465,
            "encryption": "ssl",
            "timeout": "10s"
        }))
        .unwrap();

        match config {
            TransportConfig::Smtp(c) => {
                assert_eq!(c.encryption, SmtpEncryption::Tls);
                assert_eq!(c.timeout, Duration::from_secs(10));
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[rstest]
    #[case(SmtpEncryption::None, "\"none\"")]
    #[case(SmtpEncryption::StartTls, "\"start_tls\"")]
    #[case(SmtpEncryption::Tls, "\"ssl\"")]
    fn test_smtp_encryption_round_trip(#[case] encryption: SmtpEncryption, #[case] wire: &str) {
        assert_eq!(serde_json::to_string(&encryption).unwrap(), wire);
        let parsed: SmtpEncryption = serde_json::from_str(wire).unwrap();
        assert_eq!(parsed, encryption);
    }

    #[test]
    fn test_smtp_encryption_tls_means_starttls() {
        let parsed: SmtpEncryption = serde_json::from_str("\"tls\"").unwrap();
        assert_eq!(parsed, SmtpEncryption::StartTls);
    }

    #[test]
    fn test_logger_enabled_cascades() {
        let config = MailerConfig::new(BrevoConfig::new("key")).with_logger_enabled(false);
        assert!(config.transport.settings().enable_logging);
        assert!(!config.effective_transport().settings().enable_logging);
    }

    #[test]
    fn test_secret_not_in_debug() {
        let config = BrevoConfig::new("xkeysib-secret");
        assert!(!format!("{:?}", config).contains("xkeysib-secret"));
    }
}
