//! Redaction of sensitive headers and fields.

use serde_json::{Map, Value};

/// Sentinel written in place of a redacted value.
pub const REDACTED: &str = "***REDACTED***";

/// Case-insensitive substring denylists for header names and field keys.
///
/// A matching entry keeps its key and has its whole value replaced with
/// [`REDACTED`], including nested objects and arrays.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    headers: Vec<String>,
    fields: Vec<String>,
}

impl Redactor {
    /// Creates a redactor from header and field denylists.
    pub fn new<H, F>(headers: H, fields: F) -> Self
    where
        H: IntoIterator,
        H::Item: AsRef<str>,
        F: IntoIterator,
        F::Item: AsRef<str>,
    {
        Self {
            headers: lowercase_all(headers),
            fields: lowercase_all(fields),
        }
    }

    /// Returns true if a header name matches the header denylist.
    pub fn is_sensitive_header(&self, name: &str) -> bool {
        matches_any(&self.headers, name)
    }

    /// Returns true if a key matches the field denylist.
    pub fn is_sensitive_field(&self, key: &str) -> bool {
        matches_any(&self.fields, key)
    }

    /// Redacts header values in place.
    pub fn redact_headers(&self, headers: &mut Map<String, Value>) {
        for (name, value) in headers.iter_mut() {
            if self.is_sensitive_header(name) {
                *value = Value::String(REDACTED.to_string());
            }
        }
    }

    /// Redacts a value recursively.
    ///
    /// Field rules apply at every depth. Any object stored under a `headers`
    /// key also gets the header rules.
    pub fn redact(&self, value: &mut Value) {
        match value {
            Value::Object(map) => {
                for (key, child) in map.iter_mut() {
                    if self.is_sensitive_field(key) {
                        *child = Value::String(REDACTED.to_string());
                        continue;
                    }
                    if key.eq_ignore_ascii_case("headers") {
                        if let Value::Object(headers) = child {
                            self.redact_headers(headers);
                        }
                    }
                    self.redact(child);
                }
            }
            Value::Array(items) => {
                for item in items.iter_mut() {
                    self.redact(item);
                }
            }
            _ => {}
        }
    }
}

fn lowercase_all<I>(items: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    items
        .into_iter()
        .map(|item| item.as_ref().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

fn matches_any(rules: &[String], candidate: &str) -> bool {
    let candidate = candidate.to_lowercase();
    rules.iter().any(|rule| candidate.contains(rule.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn redactor() -> Redactor {
        Redactor::new(["Authorization", "API-Key"], ["apiKey", "password", "token"])
    }

    #[test]
    fn test_redacts_nested_fields_and_keeps_keys() {
        let mut value = json!({
            "outer": {
                "inner": [{"apiKey": "k1"}, {"name": "x"}],
                "userPassword": "p"
            },
            "ApiKey": "top"
        });
        redactor().redact(&mut value);

        assert_eq!(value["outer"]["inner"][0]["apiKey"], REDACTED);
        assert_eq!(value["outer"]["inner"][1]["name"], "x");
        assert_eq!(value["outer"]["userPassword"], REDACTED);
        assert_eq!(value["ApiKey"], REDACTED);
    }

    #[test]
    fn test_redacts_whole_object_under_sensitive_key() {
        let mut value = json!({"token": {"access": "a", "refresh": "r"}});
        redactor().redact(&mut value);
        assert_eq!(value["token"], REDACTED);
    }

    #[test]
    fn test_header_rules_apply_under_headers_key() {
        let mut value = json!({
            "request": {
                "headers": {"authorization": "Bearer x", "X-Api-Key": "y", "Accept": "application/json"}
            }
        });
        redactor().redact(&mut value);

        let headers = &value["request"]["headers"];
        assert_eq!(headers["authorization"], REDACTED);
        assert_eq!(headers["X-Api-Key"], REDACTED);
        assert_eq!(headers["Accept"], "application/json");
    }

    #[test]
    fn test_empty_rules_never_match() {
        let redactor = Redactor::new(Vec::<String>::new(), [""]);
        assert!(!redactor.is_sensitive_field("anything"));
    }
}
