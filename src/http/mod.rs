//! HTTP seam used by the API transports.
//!
//! Transports build an [`HttpRequest`] and hand it to an [`HttpClient`]. The
//! default client wraps `reqwest`; tests swap in [`crate::mocks::MockHttpClient`].

use std::collections::HashMap;

use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};

use crate::errors::MailResult;

/// A file part of a form body.
#[derive(Debug, Clone, PartialEq)]
pub struct FormFile {
    /// Form field name.
    pub field: String,
    /// File name sent with the part.
    pub file_name: String,
    /// MIME type of the part.
    pub content_type: String,
    /// Raw content.
    pub content: Vec<u8>,
}

/// Request body.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// No body.
    Empty,
    /// JSON document.
    Json(Value),
    /// Form fields, URL-encoded when `files` is empty and multipart otherwise.
    Form {
        /// Ordered text fields.
        fields: Vec<(String, String)>,
        /// File parts.
        files: Vec<FormFile>,
    },
}

impl RequestBody {
    /// Structured rendering of the body for audit logging.
    ///
    /// Form bodies become a JSON object so field redaction applies to them;
    /// file parts are summarized by name and size. Repeated names collect
    /// into an array.
    pub fn loggable(&self) -> Option<Value> {
        match self {
            RequestBody::Empty => None,
            RequestBody::Json(value) => Some(value.clone()),
            RequestBody::Form { fields, files } => {
                let mut map = Map::new();
                for (name, value) in fields {
                    insert_repeated(&mut map, name, Value::String(value.clone()));
                }
                for file in files {
                    let summary = format!("{} <{} bytes>", file.file_name, file.content.len());
                    insert_repeated(&mut map, &file.field, Value::String(summary));
                }
                Some(Value::Object(map))
            }
        }
    }

    /// Returns the form field with the given name.
    pub fn form_field(&self, name: &str) -> Option<&str> {
        match self {
            RequestBody::Form { fields, .. } => fields
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }

    /// Returns the JSON document, if this is a JSON body.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            RequestBody::Json(value) => Some(value),
            _ => None,
        }
    }
}

fn insert_repeated(map: &mut Map<String, Value>, name: &str, value: Value) {
    match map.get_mut(name) {
        Some(Value::Array(values)) => values.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(name.to_string(), value);
        }
    }
}

/// Basic authentication credentials.
#[derive(Debug, Clone)]
pub struct BasicAuth {
    /// User name.
    pub username: String,
    /// Password.
    pub password: SecretString,
}

/// HTTP request representation.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Request headers, in the order they were added.
    pub headers: IndexMap<String, String>,
    /// Request body.
    pub body: RequestBody,
    /// Basic authentication, applied by the client.
    pub basic_auth: Option<BasicAuth>,
    /// User agent override.
    pub user_agent: Option<String>,
}

impl HttpRequest {
    /// Creates a new POST request.
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: IndexMap::new(),
            body: RequestBody::Empty,
            basic_auth: None,
            user_agent: None,
        }
    }

    /// Sets a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Sets basic authentication.
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: SecretString) -> Self {
        self.basic_auth = Some(BasicAuth {
            username: username.into(),
            password,
        });
        self
    }

    /// Sets the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Returns a header value, matching the name case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// HTTP response representation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers with lower-case names.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response with a raw body.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Creates a response with a JSON body.
    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
            .with_header("content-type", "application/json")
    }

    /// Sets a header.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Returns true if the status indicates success (2xx).
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decoded body when it is a JSON object or array.
    pub fn data(&self) -> Option<Value> {
        match serde_json::from_slice::<Value>(&self.body) {
            Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
            _ => None,
        }
    }

    /// Body as text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Returns a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Decoded body, falling back to the raw text; `None` when empty.
    pub fn details(&self) -> Option<Value> {
        if let Some(data) = self.data() {
            return Some(data);
        }
        let text = self.text();
        if text.is_empty() {
            None
        } else {
            Some(Value::String(text))
        }
    }
}

/// HTTP client trait.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the full response.
    async fn send(&self, request: &HttpRequest) -> MailResult<HttpResponse>;
}

/// HTTP client implementation using reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    /// Creates a client with reqwest's defaults.
    pub fn new() -> MailResult<Self> {
        let client = Client::builder().build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: &HttpRequest) -> MailResult<HttpResponse> {
        let mut builder = self.client.request(request.method.clone(), &request.url);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(user_agent) = &request.user_agent {
            builder = builder.header(reqwest::header::USER_AGENT, user_agent.as_str());
        }

        if let Some(auth) = &request.basic_auth {
            builder = builder.basic_auth(&auth.username, Some(auth.password.expose_secret()));
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form { fields, files } if files.is_empty() => builder.form(fields),
            RequestBody::Form { fields, files } => {
                let mut form = Form::new();
                for (name, value) in fields {
                    form = form.text(name.clone(), value.clone());
                }
                for file in files {
                    let part = Part::bytes(file.content.clone())
                        .file_name(file.file_name.clone())
                        .mime_str(&file.content_type)?;
                    form = form.part(file.field.clone(), part);
                }
                builder.multipart(form)
            }
        };

        let response = builder.send().await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_data() {
        let response = HttpResponse::json(400, &json!({"message": "bad"}));
        assert_eq!(response.data(), Some(json!({"message": "bad"})));
        assert!(!response.is_ok());

        let response = HttpResponse::new(502, "Bad Gateway");
        assert!(response.data().is_none());
        assert_eq!(response.details(), Some(Value::String("Bad Gateway".into())));

        assert!(HttpResponse::new(500, "").details().is_none());
        assert!(HttpResponse::new(200, "\"scalar\"").data().is_none());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = HttpResponse::new(202, "").with_header("X-Message-Id", "abc");
        assert_eq!(response.header("x-message-id"), Some("abc"));

        let request = HttpRequest::post("https://example.com").with_header("Api-Key", "k");
        assert_eq!(request.header("api-key"), Some("k"));
    }

    #[test]
    fn test_form_loggable_summarizes_files() {
        let body = RequestBody::Form {
            fields: vec![("to".into(), "a@example.com".into())],
            files: vec![FormFile {
                field: "attachment[a.txt]".into(),
                file_name: "a.txt".into(),
                content_type: "text/plain".into(),
                content: b"hello".to_vec(),
            }],
        };

        assert_eq!(
            body.loggable(),
            Some(json!({"to": "a@example.com", "attachment[a.txt]": "a.txt <5 bytes>"}))
        );
        assert_eq!(body.form_field("to"), Some("a@example.com"));
        assert!(RequestBody::Empty.loggable().is_none());
    }

    #[test]
    fn test_form_loggable_keeps_repeated_parts() {
        let inline = |cid: &str| FormFile {
            field: "inline".into(),
            file_name: cid.into(),
            content_type: "image/png".into(),
            content: vec![1, 2, 3],
        };
        let body = RequestBody::Form {
            fields: vec![
                ("to".into(), "a@example.com".into()),
                ("o:tag".into(), "welcome".into()),
                ("o:tag".into(), "onboarding".into()),
            ],
            files: vec![inline("logo"), inline("banner")],
        };

        assert_eq!(
            body.loggable(),
            Some(json!({
                "to": "a@example.com",
                "o:tag": ["welcome", "onboarding"],
                "inline": ["logo <3 bytes>", "banner <3 bytes>"],
            }))
        );
    }
}
