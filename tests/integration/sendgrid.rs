//! Integration tests for the SendGrid transport

use super::*;
use integrations_mail::{SendGridConfig, SendGridTransport, Transport};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

fn transport(server: &MockServer) -> SendGridTransport {
    let config = SendGridConfig::new("SG.test").with_endpoint(format!("{}/v3/mail/send", server.uri()));
    SendGridTransport::new(config, None).expect("valid config")
}

#[tokio::test]
async fn test_sendgrid_integration_success() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/v3/mail/send"))
        .and(header("authorization", "Bearer SG.test"))
        .and(body_partial_json(json!({
            "personalizations": [{"to": [{"email": "recipient@example.com"}]}],
            "from": {"email": "sender@example.com", "name": "Sender"},
            "content": [
                {"type": "text/plain", "value": "Plain text"},
                {"type": "text/html", "value": "<p>HTML</p>"}
            ]
        })))
        .respond_with(ResponseTemplate::new(202).insert_header("X-Message-Id", "sg-1"))
        .expect(1)
        .mount(&server)
        .await;

    let (logger, sink) = recording_logger(Default::default());
    let config = SendGridConfig::new("SG.test").with_endpoint(format!("{}/v3/mail/send", server.uri()));
    let mut transport = SendGridTransport::new(config, Some(logger)).unwrap();

    assert!(transport.send(&message()).await);
    let sent = sink.records().pop().unwrap();
    assert_eq!(sent.message, "Email sent successfully");
    assert_eq!(sent.data["message_id"], "sg-1");
    assert_eq!(sent.data["status_code"], 202);
}

#[tokio::test]
async fn test_sendgrid_integration_200_is_failure() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut transport = transport(&server);

    assert!(!transport.send(&message()).await);
    assert_eq!(
        transport.error().unwrap().message,
        "SendGrid API error (code: 200): Unknown error"
    );
}

#[tokio::test]
async fn test_sendgrid_integration_multiple_errors() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"errors": [
            {"message": "The from address does not match a verified Sender Identity.", "field": "from"},
            {"message": "Invalid reply_to", "field": "reply_to"}
        ]})))
        .mount(&server)
        .await;

    let mut transport = transport(&server);

    assert!(!transport.send(&message()).await);
    assert_eq!(transport.errors().len(), 2);

    let cleared = transport.clear_errors();
    assert_eq!(
        cleared[1].message,
        "SendGrid API error (code: 400): Invalid reply_to (field: reply_to)"
    );
    assert!(!transport.has_errors());
}
