//! Integration tests for the Mailgun transport

use super::*;
use integrations_mail::{AttachOptions, MailgunConfig, MailgunTransport, Transport};
use serde_json::json;
use wiremock::matchers::{basic_auth, method, path};
use wiremock::{Mock, ResponseTemplate};

fn transport(server: &MockServer) -> MailgunTransport {
    let config = MailgunConfig::new("key-test", "mg.example.com").with_endpoint(server.uri());
    MailgunTransport::new(config, None).expect("valid config")
}

#[tokio::test]
async fn test_mailgun_integration_form_body() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/mg.example.com/messages"))
        .and(basic_auth("api", "key-test"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "<1@mg.example.com>", "message": "Queued. Thank you."})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut transport = transport(&server);
    assert!(transport.send(&message()).await);

    let requests = server.received_requests().await.unwrap();
    let fields: Vec<(String, String)> = url::form_urlencoded::parse(&requests[0].body)
        .into_owned()
        .collect();
    let field = |name: &str| {
        fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    };

    assert_eq!(field("from"), Some("\"Sender\" <sender@example.com>"));
    assert_eq!(field("to"), Some("recipient@example.com"));
    assert_eq!(field("subject"), Some("Integration"));
    assert_eq!(field("o:tracking"), Some("no"));
}

#[tokio::test]
async fn test_mailgun_integration_multipart_with_attachment() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "<2@mg.example.com>"})))
        .mount(&server)
        .await;

    let mut message = message();
    message
        .attach_content("a,b\n1,2\n", AttachOptions::new().file_name("report.csv").content_type("text/csv"))
        .unwrap();

    let mut transport = transport(&server);
    assert!(transport.send(&message).await);

    let requests = server.received_requests().await.unwrap();
    let content_type = requests[0]
        .headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("multipart/form-data"));

    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"attachment[report.csv]\""));
    assert!(body.contains("a,b\n1,2\n"));
}

#[tokio::test]
async fn test_mailgun_integration_error_field_on_200() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"error": "x", "message": "Sandbox limit"})),
        )
        .mount(&server)
        .await;

    let mut transport = transport(&server);

    assert!(!transport.send(&message()).await);
    assert_eq!(
        transport.error().unwrap().message,
        "Mailgun API error (code: 200): Sandbox limit"
    );
}
