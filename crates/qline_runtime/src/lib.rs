//! Runtime for qline request objects.
//!
//! This crate provides the request pipeline built on `qline_core`:
//! - `queryable`: Request objects and their execution state machine
//! - `moments`: The moments a request passes through and their payloads
//! - `request`: Request init, raw response and parsed payload values
//! - `behaviors`: Parsers, header injection, auth, caching, retry,
//!   diagnostics and the HTTP transport

pub mod behaviors;
pub mod moments;
pub mod queryable;
pub mod request;

pub use behaviors::{
    parse_with, BearerToken, Behavior, BinaryParse, CacheStore, Caching, Diagnostics, ErrorCheck,
    HeaderParse, InjectHeaders, JsonHeaderParse, JsonParse, Retry, RetryConfig, StaticToken,
    TextParse, TokenProvider, Transport,
};
pub use moments::{
    Invocation, ParseState, PostState, PreparedRequest, SendArgs, AUTH, CONSTRUCT, DATA, DISPOSE,
    INIT, PARSE, POST, PRE, SEND,
};
pub use queryable::{combine, Execution, Queryable};
pub use request::{Body, Headers, Payload, RequestInit, Response};
