//! Behaviors: reusable bundles of observers.
//!
//! A behavior registers observers on a [`Queryable`] through
//! [`Behavior::apply_to`], usually via [`Queryable::using`]. Relative order
//! matters where two behaviors touch the same moment:
//!
//! - header injection and auth before anything that inspects the final init,
//! - [`Transport`] before [`Retry`], since retry wraps the current `send`,
//! - batching last, since it takes `send` over.

mod auth;
mod caching;
mod diagnostics;
mod headers;
mod parsers;
mod retry;
mod transport;

pub use auth::{BearerToken, StaticToken, TokenProvider};
pub use caching::{CacheStore, Caching};
pub use diagnostics::Diagnostics;
pub use headers::InjectHeaders;
pub use parsers::{
    parse_with, BinaryParse, ErrorCheck, HeaderParse, JsonHeaderParse, JsonParse, TextParse,
};
pub use retry::{Retry, RetryConfig};
pub use transport::Transport;

use qline_core::SdkResult;

use crate::queryable::Queryable;

/// Something that configures a [`Queryable`].
pub trait Behavior {
    fn apply_to(&self, queryable: &Queryable) -> SdkResult<()>;
}

impl<F> Behavior for F
where
    F: Fn(&Queryable) -> SdkResult<()>,
{
    fn apply_to(&self, queryable: &Queryable) -> SdkResult<()> {
        self(queryable)
    }
}

/// Applies several behaviors in order.
pub struct Stack(pub Vec<Box<dyn Behavior + Send + Sync>>);

impl Behavior for Stack {
    fn apply_to(&self, queryable: &Queryable) -> SdkResult<()> {
        self.0.iter().try_for_each(|b| b.apply_to(queryable))
    }
}
