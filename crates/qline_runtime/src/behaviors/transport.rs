//! Default `send` observer backed by reqwest.

use std::time::Duration;

use qline_core::{responder, ErrorCode, SdkError, SdkResult};

use super::Behavior;
use crate::moments::{SendArgs, SEND};
use crate::queryable::Queryable;
use crate::request::{Body, Headers, Response};

/// Performs requests over HTTP.
#[derive(Debug, Clone)]
pub struct Transport {
    client: reqwest::Client,
}

impl Transport {
    /// Creates a transport with its own connection pool.
    pub fn new(timeout: Duration) -> SdkResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SdkError::configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Uses an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Behavior for Transport {
    fn apply_to(&self, queryable: &Queryable) -> SdkResult<()> {
        let client = self.client.clone();
        queryable.on(
            &SEND,
            responder(move |args: SendArgs| {
                let client = client.clone();
                async move { send(&client, args).await }
            }),
        )?;
        Ok(())
    }
}

fn map_reqwest_error(err: reqwest::Error) -> SdkError {
    if err.is_timeout() {
        SdkError::timeout()
    } else if err.is_connect() {
        SdkError::new(
            ErrorCode::ConnectionRefused,
            format!("Connection failed: {err}"),
        )
    } else if err.is_builder() {
        SdkError::new(ErrorCode::InvalidUrl, format!("Invalid request: {err}"))
    } else {
        SdkError::network(err.to_string())
    }
}

async fn send(client: &reqwest::Client, args: SendArgs) -> SdkResult<Response> {
    let SendArgs { url, init, .. } = args;
    let method = reqwest::Method::from_bytes(init.method.as_bytes()).map_err(|_| {
        SdkError::new(
            ErrorCode::InvalidRequest,
            format!("invalid HTTP method {}", init.method),
        )
    })?;

    let mut builder = client.request(method, url.as_str());
    for (name, value) in init.headers.iter() {
        builder = builder.header(name, value);
    }
    builder = match init.body {
        Some(Body::Text(text)) => builder.body(text),
        Some(Body::Binary(bytes)) => builder.body(bytes),
        None => builder,
    };

    tracing::trace!(%url, "sending");
    let response = builder.send().await.map_err(map_reqwest_error)?;

    let status = response.status();
    let headers: Headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    let body = response.bytes().await.map_err(map_reqwest_error)?;

    Ok(Response {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        headers,
        body,
    })
}
