//! Integration tests for the Brevo transport

use super::*;
use integrations_mail::{BrevoConfig, BrevoTransport, Transport};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

fn transport(server: &MockServer) -> BrevoTransport {
    let config = BrevoConfig::new("xkeysib-test")
        .with_endpoint(format!("{}/v3/smtp/email", server.uri()));
    BrevoTransport::new(config, None).expect("valid config")
}

#[tokio::test]
async fn test_brevo_integration_success() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/v3/smtp/email"))
        .and(header("api-key", "xkeysib-test"))
        .and(header("accept", "application/json"))
        .and(body_partial_json(json!({
            "sender": {"email": "sender@example.com", "name": "Sender"},
            "to": [{"email": "recipient@example.com"}],
            "subject": "Integration",
            "htmlContent": "<p>HTML</p>",
            "textContent": "Plain text"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"messageId": "<1@brevo>"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut transport = transport(&server);

    assert!(transport.send(&message()).await);
    assert!(!transport.has_errors());
}

#[tokio::test]
async fn test_brevo_integration_rejection() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"code": "invalid_parameter", "message": "sender is invalid"})),
        )
        .mount(&server)
        .await;

    let mut transport = transport(&server);

    assert!(!transport.send(&message()).await);
    let error = transport.error().unwrap();
    assert_eq!(error.code, 400);
    assert_eq!(error.message, "Brevo API error (code: 400): sender is invalid");
}

#[tokio::test]
async fn test_brevo_integration_connection_failure() {
    let config = BrevoConfig::new("xkeysib-test").with_endpoint("http://127.0.0.1:9/v3/smtp/email");
    let mut transport = BrevoTransport::new(config, None).unwrap();

    assert!(!transport.send(&message()).await);
    let error = transport.error().unwrap();
    assert_eq!(error.code, 500);
    assert!(error.message.starts_with("HTTP client error: "));
}
