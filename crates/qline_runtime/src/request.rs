//! Request and response values passed between moments.

use bytes::Bytes;
use indexmap::IndexMap;
use qline_core::{ErrorCode, ResultExt, SdkError, SdkResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Ordered header map with case-insensitive lookup.
///
/// Names keep the casing they were first inserted with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: IndexMap<String, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .keys()
            .position(|key| key.eq_ignore_ascii_case(name))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name)
            .and_then(|i| self.entries.get_index(i))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Sets a header, replacing any value stored under the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) => {
                if let Some((_, slot)) = self.entries.get_index_mut(i) {
                    *slot = value;
                }
            }
            None => {
                self.entries.insert(name, value);
            }
        }
    }

    /// Sets a header only when it is not present yet.
    pub fn insert_if_absent(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if !self.contains(&name) {
            self.entries.insert(name, value.into());
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name)
            .and_then(|i| self.entries.shift_remove_index(i))
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Headers as a JSON object.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

/// Request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Text(String),
    Binary(Bytes),
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Body::Text(value)
    }
}

impl From<&str> for Body {
    fn from(value: &str) -> Self {
        Body::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Body::Binary(Bytes::from(value))
    }
}

/// Everything but the URL needed to send a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInit {
    pub method: String,
    pub headers: Headers,
    pub body: Option<Body>,
}

impl Default for RequestInit {
    fn default() -> Self {
        Self::get()
    }
}

impl RequestInit {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn get() -> Self {
        Self::new("GET")
    }

    pub fn post() -> Self {
        Self::new("POST")
    }

    pub fn patch() -> Self {
        Self::new("PATCH")
    }

    pub fn put() -> Self {
        Self::new("PUT")
    }

    pub fn delete() -> Self {
        Self::new("DELETE")
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `value` as the JSON text body.
    pub fn json<T: Serialize>(mut self, value: &T) -> SdkResult<Self> {
        let text = serde_json::to_string(value).map_sdk_err(ErrorCode::SerializeError)?;
        self.body = Some(Body::Text(text));
        Ok(self)
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

/// Raw response handed from `send` to `parse`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    pub headers: Headers,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            status_text: String::new(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    pub fn status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = text.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// A 200 response carrying `value` as JSON.
    pub fn json(value: &Value) -> Self {
        Self::new(200)
            .status_text("OK")
            .header("Content-Type", "application/json")
            .body(value.to_string())
    }

    /// True for 2xx statuses.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }
}

/// Result produced by the parse moment.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// No body (204, empty responses).
    Empty,
    Json(Value),
    Text(String),
    Binary(Bytes),
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    /// JSON view of the payload. Empty becomes `null`, text a JSON string.
    pub fn into_json(self) -> Value {
        match self {
            Payload::Empty => Value::Null,
            Payload::Json(value) => value,
            Payload::Text(text) => Value::String(text),
            Payload::Binary(bytes) => Value::Array(
                bytes.iter().map(|b| Value::from(*b)).collect(),
            ),
        }
    }

    /// Deserializes the JSON view of the payload.
    pub fn deserialize<T: DeserializeOwned>(self) -> SdkResult<T> {
        serde_json::from_value(self.into_json()).map_err(|e| {
            SdkError::deserialize(format!("failed to decode response payload: {e}"))
        })
    }
}
