//! Core of the qline request pipeline.
//!
//! This crate provides the pieces every request object is built on:
//! - `moment`: Named extension points and their combinator kinds
//! - `observers`: Observer lists and the per-moment combinators
//! - `timeline`: The observable engine owning a set of observer lists
//! - `error`: Typed errors shared by every qline crate

pub mod error;
pub mod moment;
pub mod observers;
pub mod timeline;

pub use error::{ErrorCode, HttpErrorDetails, IntoSdkError, ResultExt, SdkError, SdkResult};
pub use moment::{define_moments, Moment, MomentKind, MomentRegistry, ERROR};
pub use observers::{
    listener, reducer, responder, BoxFuture, Listener, Observers, Reducer, Responder,
};
pub use timeline::Timeline;
