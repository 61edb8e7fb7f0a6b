//! JSON `$batch` wire format.
//!
//! Request side: `{ "requests": [ { id, method, url, headers, body? } ] }` with
//! ids `"1".."n"` per chunk and URLs relative to the API version root.
//! Response side: `{ error?, responses: [ { id, status, headers, body } ], nextLink? }`.

use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use indexmap::IndexMap;
use qline_core::{ErrorCode, SdkError, SdkResult};
use qline_runtime::{Body, Payload, RequestInit, Response};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One sub-request of an aggregated call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFragment {
    pub id: String,
    pub method: String,
    pub url: String,
    pub headers: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Body of the aggregated request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequestBody {
    pub requests: Vec<RequestFragment>,
}

/// One sub-response of an aggregated call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseFragment {
    pub id: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl ResponseFragment {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Service-level error envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_error: Option<Value>,
}

/// Body of the aggregated response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponseBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ServiceError>,
    #[serde(default)]
    pub responses: Vec<ResponseFragment>,
    #[serde(default, alias = "@odata.nextLink", skip_serializing_if = "Option::is_none")]
    pub next_link: Option<String>,
}

impl BatchResponseBody {
    /// Decodes the parsed result of the `$batch` call. A top-level `error`
    /// fails the whole chunk.
    pub fn from_payload(payload: Payload) -> SdkResult<Self> {
        let value = match payload {
            Payload::Json(value) => value,
            Payload::Text(text) => serde_json::from_str(&text)
                .map_err(|e| SdkError::parse(format!("batch response is not JSON: {e}")))?,
            Payload::Empty | Payload::Binary(_) => {
                return Err(SdkError::new(
                    ErrorCode::InvalidResponse,
                    "batch response has no JSON body",
                ))
            }
        };
        let body: BatchResponseBody = serde_json::from_value(value)
            .map_err(|e| SdkError::deserialize(format!("malformed batch response: {e}")))?;

        if let Some(error) = body.error {
            let mut err = SdkError::new(
                ErrorCode::BatchError,
                format!("Error making batch request: {} ({})", error.message, error.code),
            )
            .with_extension("code", &error.code);
            if let Some(inner) = error.inner_error {
                err = err.with_extension("innerError", inner);
            }
            return Err(err);
        }
        Ok(body)
    }
}

fn version_prefix() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)^.*?/(?:v1\.0|beta)/").ok())
        .as_ref()
}

/// Strips everything up to and including the API version segment.
pub fn relative_url(url: &str) -> String {
    match version_prefix() {
        Some(re) if re.is_match(url) => re.replace(url, "/").into_owned(),
        _ => url.to_string(),
    }
}

fn fragment_body(body: &Body) -> Value {
    match body {
        Body::Text(text) => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone()))
        }
        Body::Binary(bytes) => Value::String(STANDARD.encode(bytes)),
    }
}

/// Builds the aggregated request body for one chunk. Ids start at 1.
pub fn format_requests<'a, I>(requests: I) -> BatchRequestBody
where
    I: IntoIterator<Item = (&'a str, &'a RequestInit)>,
{
    let requests = requests
        .into_iter()
        .enumerate()
        .map(|(index, (url, init))| {
            let mut headers: IndexMap<String, String> = init
                .headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            let has_content_type = headers
                .keys()
                .any(|k| k.eq_ignore_ascii_case("content-type"));
            if init.is_get() {
                headers.retain(|k, _| !k.eq_ignore_ascii_case("content-type"));
            } else if !has_content_type {
                headers.insert("Content-Type".to_string(), "application/json".to_string());
            }

            RequestFragment {
                id: (index + 1).to_string(),
                method: init.method.clone(),
                url: relative_url(url),
                headers,
                body: init.body.as_ref().map(fragment_body),
            }
        })
        .collect();
    BatchRequestBody { requests }
}

/// Pairs a chunk's requests with their fragments.
///
/// Fragment ids are 1-based positions within the chunk. A fragment whose id
/// is not a number in range takes the slot matching its position in the list,
/// unless a fragment with a valid id already claimed it.
pub fn match_fragments(
    chunk_len: usize,
    fragments: Vec<ResponseFragment>,
) -> Vec<Option<ResponseFragment>> {
    let mut slots: Vec<Option<ResponseFragment>> = vec![None; chunk_len];
    let mut unmatched = Vec::new();
    for (position, fragment) in fragments.into_iter().enumerate() {
        let index = fragment
            .id
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|id| id.checked_sub(1))
            .filter(|i| *i < chunk_len);
        match index {
            Some(index) => slots[index] = Some(fragment),
            None => unmatched.push((position, fragment)),
        }
    }
    for (position, fragment) in unmatched {
        if let Some(slot) = slots.get_mut(position) {
            if slot.is_none() {
                *slot = Some(fragment);
            }
        }
    }
    slots
}

/// Rebuilds an ordinary response from a fragment so the sub-request's own
/// parse observers can handle it.
///
/// - 204: empty body.
/// - 302: becomes a 200 whose JSON body is `{ "location": <Location header> }`.
/// - 200 with an `image/*` content type: body is base64 and decoded to bytes.
/// - anything else: body re-serialized as JSON text.
pub fn build_response(fragment: &ResponseFragment) -> SdkResult<Response> {
    let status_text = fragment.status_text.clone().unwrap_or_default();
    let with_headers = |mut response: Response| {
        for (name, value) in &fragment.headers {
            response.headers.insert(name.as_str(), value.as_str());
        }
        response
    };

    match fragment.status {
        204 => Ok(with_headers(Response::new(204).status_text(status_text))),
        302 => {
            let location = fragment.header("location").map(str::to_string);
            Ok(Response::json(&json!({ "location": location })))
        }
        200 if fragment
            .header("content-type")
            .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("image/")) =>
        {
            let encoded = fragment.body.as_ref().and_then(Value::as_str).ok_or_else(|| {
                SdkError::new(
                    ErrorCode::InvalidResponse,
                    format!("image fragment {} has no base64 body", fragment.id),
                )
            })?;
            let bytes = STANDARD.decode(encoded.trim()).map_err(|e| {
                SdkError::parse(format!("invalid base64 in fragment {}: {e}", fragment.id))
            })?;
            Ok(with_headers(
                Response::new(200).status_text(status_text).body(bytes),
            ))
        }
        status => {
            let body = match &fragment.body {
                Some(value) => serde_json::to_vec(value).map_err(|e| {
                    SdkError::serialize(format!("failed to re-encode fragment body: {e}"))
                })?,
                None => Vec::new(),
            };
            Ok(with_headers(
                Response::new(status).status_text(status_text).body(body),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(value: Value) -> ResponseFragment {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_relative_url() {
        assert_eq!(
            relative_url("https://graph.microsoft.com/v1.0/me/drive?$top=1"),
            "/me/drive?$top=1"
        );
        assert_eq!(relative_url("https://graph.microsoft.com/beta/users"), "/users");
        assert_eq!(relative_url("/me"), "/me");
    }

    #[test]
    fn test_format_requests_content_type_rules() {
        let get = RequestInit::get().header("Content-Type", "application/json");
        let post = RequestInit::post().body("{\"a\":1}");
        let patch = RequestInit::patch()
            .header("content-type", "text/plain")
            .body("not json");

        let body = format_requests([
            ("https://h/v1.0/me", &get),
            ("https://h/v1.0/items", &post),
            ("https://h/v1.0/items/1", &patch),
        ]);

        let ids: Vec<_> = body.requests.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);

        assert!(body.requests[0].headers.is_empty());
        assert_eq!(body.requests[0].body, None);

        assert_eq!(
            body.requests[1].headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(body.requests[1].body, Some(json!({"a": 1})));

        assert_eq!(body.requests[2].headers.len(), 1);
        assert_eq!(body.requests[2].body, Some(json!("not json")));
    }

    #[test]
    fn test_get_fragment_omits_body_key() {
        let init = RequestInit::get();
        let body = format_requests([("https://h/v1.0/me", &init)]);
        let wire = serde_json::to_value(&body).unwrap();
        assert_eq!(
            wire,
            json!({"requests": [{"id": "1", "method": "GET", "url": "/me", "headers": {}}]})
        );
    }

    #[test]
    fn test_no_content_fragment() {
        let response = build_response(&fragment(json!({"id": "1", "status": 204}))).unwrap();
        assert_eq!(response.status, 204);
        assert!(response.body.is_empty());
    }

    #[test]
    fn test_redirect_fragment_becomes_location() {
        let response = build_response(&fragment(json!({
            "id": "1",
            "status": 302,
            "headers": {"Location": "https://download.example/file"}
        })))
        .unwrap();

        assert_eq!(response.status, 200);
        let body: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body, json!({"location": "https://download.example/file"}));
    }

    #[test]
    fn test_image_fragment_is_binary() {
        let response = build_response(&fragment(json!({
            "id": "1",
            "status": 200,
            "headers": {"Content-Type": "image/jpeg"},
            "body": "AQID"
        })))
        .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body.as_ref(), &[1u8, 2, 3]);
        assert_eq!(response.content_type(), Some("image/jpeg"));
    }

    #[test]
    fn test_json_fragment_is_reserialized() {
        let response = build_response(&fragment(json!({
            "id": "2",
            "status": 404,
            "statusText": "Not Found",
            "body": {"error": {"code": "itemNotFound"}}
        })))
        .unwrap();

        assert_eq!(response.status, 404);
        assert_eq!(response.status_text, "Not Found");
        assert_eq!(response.text(), "{\"error\":{\"code\":\"itemNotFound\"}}");
    }

    #[test]
    fn test_match_fragments_by_id() {
        let fragments = vec![
            fragment(json!({"id": "2", "status": 200})),
            fragment(json!({"id": "1", "status": 201})),
            fragment(json!({"id": "x", "status": 202})),
        ];
        let slots = match_fragments(3, fragments);
        let statuses: Vec<_> = slots.iter().map(|s| s.as_ref().map(|f| f.status)).collect();
        assert_eq!(statuses, vec![Some(201), Some(200), Some(202)]);
    }

    #[test]
    fn test_unmatched_fragment_does_not_take_a_claimed_slot() {
        let fragments = vec![
            fragment(json!({"id": "bogus", "status": 500})),
            fragment(json!({"id": "1", "status": 200})),
            fragment(json!({"id": "99", "status": 201})),
        ];
        let slots = match_fragments(2, fragments);
        let statuses: Vec<_> = slots.iter().map(|s| s.as_ref().map(|f| f.status)).collect();
        assert_eq!(statuses, vec![Some(200), None]);
    }

    #[test]
    fn test_service_error_envelope_fails() {
        let payload = Payload::Json(json!({
            "error": {"code": "BadRequest", "message": "Invalid batch payload", "innerError": {"date": "x"}}
        }));
        let err = BatchResponseBody::from_payload(payload).unwrap_err();
        assert_eq!(err.code, ErrorCode::BatchError);
        assert!(err.message.contains("Invalid batch payload"));
        assert!(err.extensions.unwrap().contains_key("innerError"));
    }

    #[test]
    fn test_batch_wire_snapshot() {
        let post = RequestInit::post().body("{\"displayName\":\"Team\"}");
        let body = format_requests([("https://graph.microsoft.com/v1.0/groups", &post)]);
        insta::assert_yaml_snapshot!(body, @r###"
        requests:
          - id: "1"
            method: POST
            url: /groups
            headers:
              Content-Type: application/json
            body:
              displayName: Team
        "###);
    }
}
