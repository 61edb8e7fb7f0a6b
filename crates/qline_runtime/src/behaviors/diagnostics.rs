//! Logging of moment transitions.

use qline_core::{listener, reducer, SdkError, SdkResult, ERROR};

use super::Behavior;
use crate::moments::{ParseState, PostState, PreparedRequest, AUTH, DATA, PARSE, POST, PRE};
use crate::queryable::Queryable;
use crate::request::Payload;

/// Logs every moment transition through `tracing`.
///
/// Events are emitted inside the invocation's `qline.request` span, which
/// carries the request id. With [`Diagnostics::stamp_request_id`] the id is
/// also sent to the service as `client-request-id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Diagnostics {
    stamp_request_id: bool,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stamp_request_id(mut self, stamp: bool) -> Self {
        self.stamp_request_id = stamp;
        self
    }
}

impl Behavior for Diagnostics {
    fn apply_to(&self, queryable: &Queryable) -> SdkResult<()> {
        let stamp = self.stamp_request_id;
        queryable.prepend(
            &PRE,
            reducer(move |mut request: PreparedRequest| async move {
                if stamp {
                    request
                        .init
                        .headers
                        .insert_if_absent("client-request-id", request.id.to_string());
                }
                tracing::debug!(
                    request_id = %request.id,
                    method = %request.init.method,
                    url = %request.url,
                    "pre"
                );
                Ok(request)
            }),
        )?;
        queryable.on(
            &AUTH,
            reducer(|request: PreparedRequest| async move {
                tracing::debug!(
                    authorized = request.init.headers.contains("authorization"),
                    "auth"
                );
                Ok(request)
            }),
        )?;
        queryable.on(
            &PARSE,
            reducer(|state: ParseState| async move {
                tracing::debug!(status = state.response.status, "parse");
                Ok(state)
            }),
        )?;
        queryable.on(
            &POST,
            reducer(|state: PostState| async move {
                tracing::debug!(url = %state.url, "post");
                Ok(state)
            }),
        )?;
        queryable.on(
            &DATA,
            listener(|result: &Payload| {
                tracing::info!(empty = result.is_empty(), "data");
            }),
        )?;
        queryable.on(
            &ERROR,
            listener(|err: &SdkError| {
                tracing::warn!(code = %err.code, error = %err, "error");
            }),
        )?;
        Ok(())
    }
}
