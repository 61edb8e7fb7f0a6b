//! Moments of a [`Queryable`](crate::Queryable) and the values they carry.

use std::sync::{Arc, OnceLock};

use qline_core::{define_moments, Listener, Moment, MomentKind, MomentRegistry, Reducer, Responder};
use uuid::Uuid;

use crate::queryable::Queryable;
use crate::request::{Payload, RequestInit, Response};

/// Subject of the `init` and `dispose` moments: one invocation of a queryable.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Correlation id, shared with every later moment of this invocation.
    pub id: Uuid,
    pub queryable: Queryable,
}

/// State threaded through `pre` and `auth`.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// Correlation id of the invocation.
    pub id: Uuid,
    pub url: String,
    pub init: RequestInit,
    /// Setting this during `pre` short-circuits the pipeline.
    pub result: Option<Payload>,
}

/// Input of the `send` moment.
#[derive(Debug, Clone)]
pub struct SendArgs {
    pub id: Uuid,
    pub url: String,
    pub init: RequestInit,
}

/// State threaded through `parse`.
#[derive(Debug, Clone)]
pub struct ParseState {
    pub id: Uuid,
    pub url: String,
    pub response: Response,
    pub result: Option<Payload>,
}

/// State threaded through `post`.
#[derive(Debug, Clone)]
pub struct PostState {
    pub id: Uuid,
    pub url: String,
    pub result: Payload,
}

pub const CONSTRUCT: Moment<Listener<Queryable>> = Moment::new("construct", MomentKind::Lifecycle);
pub const INIT: Moment<Listener<Invocation>> = Moment::new("init", MomentKind::Lifecycle);
pub const PRE: Moment<Reducer<PreparedRequest>> = Moment::new("pre", MomentKind::AsyncReduce);
pub const AUTH: Moment<Reducer<PreparedRequest>> = Moment::new("auth", MomentKind::AsyncReduce);
pub const SEND: Moment<Responder<SendArgs, Response>> = Moment::new("send", MomentKind::Request);
pub const PARSE: Moment<Reducer<ParseState>> = Moment::new("parse", MomentKind::AsyncReduce);
pub const POST: Moment<Reducer<PostState>> = Moment::new("post", MomentKind::AsyncReduce);
pub const DATA: Moment<Listener<Payload>> = Moment::new("data", MomentKind::Broadcast);
pub const DISPOSE: Moment<Listener<Invocation>> = Moment::new("dispose", MomentKind::Lifecycle);

/// Registry shared by every queryable.
pub fn registry() -> Arc<MomentRegistry> {
    static REGISTRY: OnceLock<Arc<MomentRegistry>> = OnceLock::new();
    REGISTRY
        .get_or_init(|| {
            Arc::new(define_moments([
                (CONSTRUCT.name(), CONSTRUCT.kind()),
                (INIT.name(), INIT.kind()),
                (PRE.name(), PRE.kind()),
                (AUTH.name(), AUTH.kind()),
                (SEND.name(), SEND.kind()),
                (PARSE.name(), PARSE.kind()),
                (POST.name(), POST.kind()),
                (DATA.name(), DATA.kind()),
                (DISPOSE.name(), DISPOSE.kind()),
            ]))
        })
        .clone()
}
