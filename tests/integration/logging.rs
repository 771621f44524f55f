//! Integration tests for audit logging and redaction

use super::*;
use integrations_mail::observability::REDACTED;
use integrations_mail::{
    AnyTransport, AuditLoggerConfig, BrevoConfig, MailerConfig, Mailer, Transport,
};
use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, ResponseTemplate};

fn raw_http() -> AuditLoggerConfig {
    AuditLoggerConfig {
        log_raw_http: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_request_log_is_redacted() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"messageId": "<1@brevo>"})))
        .mount(&server)
        .await;

    let config = BrevoConfig::new("xkeysib-secret")
        .with_endpoint(format!("{}/v3/smtp/email", server.uri()))
        .with_extra_options(
            json!({"params": {"password": "hunter2", "plan": "pro"}})
                .as_object()
                .unwrap()
                .clone(),
        );
    let (logger, sink) = recording_logger(raw_http());
    let mut transport = AnyTransport::from_config(config.into(), Some(logger)).unwrap();

    assert!(transport.send(&message()).await);

    let records = sink.records();
    let request = records
        .iter()
        .find(|r| r.message == "HTTP Request")
        .expect("request logged");
    assert_eq!(request.data["context"], "Brevo API Request");
    assert_eq!(request.data["request"]["headers"]["api-key"], REDACTED);
    assert_eq!(request.data["request"]["content"]["params"]["password"], REDACTED);
    assert_eq!(request.data["request"]["content"]["params"]["plan"], "pro");

    let response = records
        .iter()
        .find(|r| r.message == "HTTP Response")
        .expect("response logged");
    assert_eq!(response.data["response"]["status_code"], 201);

    let serialized = serde_json::to_string(&records.iter().map(|r| &r.data).collect::<Vec<_>>()).unwrap();
    assert!(!serialized.contains("xkeysib-secret"));
    assert!(!serialized.contains("hunter2"));
}

#[tokio::test]
async fn test_mailer_logger_switch() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .mount(&server)
        .await;

    let config = BrevoConfig::new("key").with_endpoint(format!("{}/v3/smtp/email", server.uri()));
    let (logger, sink) = recording_logger(raw_http());

    let mut mailer = Mailer::new(MailerConfig::new(config).with_logger_enabled(false));
    mailer.set_logger(logger);

    assert!(mailer.send(&message()).await.unwrap());
    assert!(sink.records().is_empty());
}
