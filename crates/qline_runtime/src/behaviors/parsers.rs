//! Response parsers.
//!
//! Every parser registers a `parse` observer that leaves the state alone once
//! a result is present, so parsers can be chained with the error check first
//! and a content-specific decoder after it.

use std::sync::Arc;

use qline_core::{reducer, SdkError, SdkResult};
use serde_json::{json, Value};

use super::Behavior;
use crate::moments::{ParseState, PARSE};
use crate::queryable::Queryable;
use crate::request::{Payload, Response};

/// Raises an HTTP error for non-2xx responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorCheck;

impl Behavior for ErrorCheck {
    fn apply_to(&self, queryable: &Queryable) -> SdkResult<()> {
        queryable.on(
            &PARSE,
            reducer(|state: ParseState| async move {
                if state.result.is_none() && !state.response.ok() {
                    let response = &state.response;
                    return Err(SdkError::http(
                        response.status,
                        response.status_text.clone(),
                        response.text(),
                    ));
                }
                Ok(state)
            }),
        )?;
        Ok(())
    }
}

/// Registers [`ErrorCheck`] followed by `decode`.
pub fn parse_with<F>(decode: F) -> impl Behavior
where
    F: Fn(&Response) -> SdkResult<Payload> + Send + Sync + 'static,
{
    let decode = Arc::new(decode);
    move |queryable: &Queryable| -> SdkResult<()> {
        ErrorCheck.apply_to(queryable)?;
        let decode = decode.clone();
        queryable.on(
            &PARSE,
            reducer(move |mut state: ParseState| {
                let decode = decode.clone();
                async move {
                    if state.result.is_none() {
                        state.result = Some(decode(&state.response)?);
                    }
                    Ok(state)
                }
            }),
        )?;
        Ok(())
    }
}

fn is_empty_response(response: &Response) -> bool {
    response.status == 204
        || response.headers.get("content-length").map(str::trim) == Some("0")
        || response.body.is_empty()
}

fn decode_json(response: &Response) -> SdkResult<Payload> {
    if is_empty_response(response) {
        return Ok(Payload::Empty);
    }
    serde_json::from_slice::<Value>(&response.body)
        .map(Payload::Json)
        .map_err(|e| SdkError::parse(format!("response body is not valid JSON: {e}")))
}

/// Decodes the body as JSON. 204 and empty bodies yield [`Payload::Empty`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParse;

impl Behavior for JsonParse {
    fn apply_to(&self, queryable: &Queryable) -> SdkResult<()> {
        parse_with(decode_json).apply_to(queryable)
    }
}

/// Returns the body as text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextParse;

impl Behavior for TextParse {
    fn apply_to(&self, queryable: &Queryable) -> SdkResult<()> {
        parse_with(|response: &Response| Ok(Payload::Text(response.text()))).apply_to(queryable)
    }
}

/// Returns the raw body bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryParse;

impl Behavior for BinaryParse {
    fn apply_to(&self, queryable: &Queryable) -> SdkResult<()> {
        parse_with(|response: &Response| Ok(Payload::Binary(response.body.clone())))
            .apply_to(queryable)
    }
}

/// Returns the response headers as a JSON object.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderParse;

impl Behavior for HeaderParse {
    fn apply_to(&self, queryable: &Queryable) -> SdkResult<()> {
        parse_with(|response: &Response| Ok(Payload::Json(response.headers.to_json())))
            .apply_to(queryable)
    }
}

/// Returns `{ "data": <json body or null>, "headers": {..} }`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonHeaderParse;

impl Behavior for JsonHeaderParse {
    fn apply_to(&self, queryable: &Queryable) -> SdkResult<()> {
        parse_with(|response: &Response| {
            let data = decode_json(response)?.into_json();
            Ok(Payload::Json(json!({
                "data": data,
                "headers": response.headers.to_json(),
            })))
        })
        .apply_to(queryable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moments::{SendArgs, SEND};
    use qline_core::{responder, ErrorCode};

    fn serving(response: Response) -> Queryable {
        let q = Queryable::new("https://h/items");
        q.on(
            &SEND,
            responder(move |_args: SendArgs| {
                let response = response.clone();
                async move { Ok(response) }
            }),
        )
        .unwrap();
        q
    }

    #[tokio::test]
    async fn test_json_parse() {
        let q = serving(Response::json(&json!({"value": [1, 2]})));
        q.using(JsonParse).unwrap();
        assert_eq!(
            q.execute().await.unwrap(),
            Payload::Json(json!({"value": [1, 2]}))
        );
    }

    #[tokio::test]
    async fn test_json_parse_no_content() {
        let q = serving(Response::new(204));
        q.using(JsonParse).unwrap();
        assert_eq!(q.execute().await.unwrap(), Payload::Empty);
    }

    #[tokio::test]
    async fn test_error_check_raises_http_error() {
        let q = serving(
            Response::new(404)
                .status_text("Not Found")
                .body("{\"error\":{\"code\":\"itemNotFound\"}}"),
        );
        q.using(JsonParse).unwrap();

        let err = q.execute().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::HttpError);
        let http = err.http.unwrap();
        assert_eq!(http.status, 404);
        assert_eq!(http.status_text, "Not Found");
        assert!(http.body.contains("itemNotFound"));
    }

    #[tokio::test]
    async fn test_redirect_is_an_error() {
        let q = serving(Response::new(302).header("Location", "https://elsewhere"));
        q.using(TextParse).unwrap();
        assert_eq!(q.execute().await.unwrap_err().status(), Some(302));
    }

    #[tokio::test]
    async fn test_first_parser_wins() {
        let q = serving(Response::json(&json!({"a": 1})));
        q.using(TextParse).unwrap().using(JsonParse).unwrap();
        assert_eq!(
            q.execute().await.unwrap(),
            Payload::Text("{\"a\":1}".to_string())
        );
    }

    #[tokio::test]
    async fn test_json_header_parse() {
        let q = serving(Response::json(&json!({"id": "1"})).header("ETag", "\"v2\""));
        q.using(JsonHeaderParse).unwrap();

        let value = q.execute().await.unwrap().into_json();
        assert_eq!(value["data"]["id"], "1");
        assert_eq!(value["headers"]["ETag"], "\"v2\"");
    }

    #[tokio::test]
    async fn test_binary_and_header_parse() {
        let q = serving(Response::new(200).header("Content-Type", "image/png").body(vec![1u8, 2, 3]));
        q.using(BinaryParse).unwrap();
        assert_eq!(
            q.execute().await.unwrap(),
            Payload::Binary(bytes::Bytes::from_static(&[1, 2, 3]))
        );

        let q = serving(Response::new(200).header("Content-Type", "image/png"));
        q.using(HeaderParse).unwrap();
        assert_eq!(
            q.execute().await.unwrap().into_json()["Content-Type"],
            "image/png"
        );
    }
}
