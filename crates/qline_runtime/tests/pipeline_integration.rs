//! Integration tests for the queryable pipeline.

use std::sync::{Arc, Mutex};

use qline_core::{listener, reducer, responder, ErrorCode, SdkError};
use qline_runtime::{
    InjectHeaders, JsonParse, ParseState, Payload, PostState, PreparedRequest, Queryable,
    RequestInit, Response, SendArgs, AUTH, CONSTRUCT, DATA, PARSE, POST, PRE, SEND,
};
use serde_json::json;

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn record_pre(q: &Queryable, log: &Log, tag: &'static str) {
    let log = log.clone();
    q.on(
        &PRE,
        reducer(move |req: PreparedRequest| {
            log.lock().unwrap().push(tag.to_string());
            async move { Ok(req) }
        }),
    )
    .unwrap();
}

fn json_send(q: &Queryable, log: &Log, body: serde_json::Value) {
    let log = log.clone();
    q.on(
        &SEND,
        responder(move |_args: SendArgs| {
            log.lock().unwrap().push("send".to_string());
            let body = body.clone();
            async move { Ok(Response::json(&body)) }
        }),
    )
    .unwrap();
}

/// Every moment runs once, in pipeline order.
#[tokio::test]
async fn test_moment_ordering() {
    let q = Queryable::new("https://graph.example/v1.0/me");
    let events = log();

    record_pre(&q, &events, "pre");
    let auth_log = events.clone();
    q.on(
        &AUTH,
        reducer(move |req: PreparedRequest| {
            auth_log.lock().unwrap().push("auth".into());
            async move { Ok(req) }
        }),
    )
    .unwrap();
    json_send(&q, &events, json!({"id": "1"}));
    let parse_log = events.clone();
    q.on(
        &PARSE,
        reducer(move |state: ParseState| {
            parse_log.lock().unwrap().push("parse".into());
            async move { Ok(state) }
        }),
    )
    .unwrap();
    let post_log = events.clone();
    q.on(
        &POST,
        reducer(move |state: PostState| {
            post_log.lock().unwrap().push("post".into());
            async move { Ok(state) }
        }),
    )
    .unwrap();
    let data_log = events.clone();
    q.on(
        &DATA,
        listener(move |_: &Payload| data_log.lock().unwrap().push("data".into())),
    )
    .unwrap();

    q.execute().await.unwrap();

    assert_eq!(
        entries(&events),
        vec!["pre", "auth", "send", "parse", "post", "data"]
    );
}

/// A transparent parse observer composes with a decoder in either order.
#[tokio::test]
async fn test_async_reduce_chaining() {
    fn decoder() -> qline_core::Reducer<ParseState> {
        reducer(|mut state: ParseState| async move {
            if state.result.is_none() {
                let value: serde_json::Value = serde_json::from_slice(&state.response.body)
                    .map_err(|e| SdkError::parse(e.to_string()))?;
                state.result = Some(Payload::Json(value));
            }
            Ok(state)
        })
    }

    fn transparent() -> qline_core::Reducer<ParseState> {
        reducer(|state: ParseState| async move { Ok(state) })
    }

    let expected = Payload::Json(json!({"value": 42}));

    for order in [[true, false], [false, true]] {
        let q = Queryable::new("https://h/x");
        json_send(&q, &log(), json!({"value": 42}));
        for decode_first in order {
            let observer = if decode_first { decoder() } else { transparent() };
            q.on(&PARSE, observer).unwrap();
        }
        assert_eq!(q.execute().await.unwrap(), expected);
    }
}

/// A result set during `pre` skips auth, send and parse.
#[tokio::test]
async fn test_pre_short_circuit() {
    let q = Queryable::new("https://h/cached");
    let events = log();

    q.on(
        &PRE,
        reducer(|mut req: PreparedRequest| async move {
            req.result = Some(Payload::Text("from cache".into()));
            Ok(req)
        }),
    )
    .unwrap();
    let auth_log = events.clone();
    q.on(
        &AUTH,
        reducer(move |req: PreparedRequest| {
            auth_log.lock().unwrap().push("auth".into());
            async move { Ok(req) }
        }),
    )
    .unwrap();
    json_send(&q, &events, json!({}));
    let parse_log = events.clone();
    q.on(
        &PARSE,
        reducer(move |state: ParseState| {
            parse_log.lock().unwrap().push("parse".into());
            async move { Ok(state) }
        }),
    )
    .unwrap();
    let data_log = events.clone();
    q.on(
        &DATA,
        listener(move |p: &Payload| data_log.lock().unwrap().push(format!("data {p:?}"))),
    )
    .unwrap();

    let result = q.execute().await.unwrap();

    assert_eq!(result, Payload::Text("from cache".into()));
    assert_eq!(entries(&events), vec!["data Text(\"from cache\")"]);
}

/// Children copy the parent's observers at creation; later registrations stay local.
#[tokio::test]
async fn test_clone_inheritance() {
    let parent = Queryable::new("https://h/v1.0");
    let events = log();
    record_pre(&parent, &events, "parent-1");
    record_pre(&parent, &events, "parent-2");
    json_send(&parent, &log(), json!({}));

    let sibling = Queryable::child(&parent, "users");
    let child = Queryable::child(&parent, "me");
    record_pre(&child, &events, "child");

    child.execute().await.unwrap();
    assert_eq!(entries(&events), vec!["parent-1", "parent-2", "child"]);

    events.lock().unwrap().clear();
    sibling.execute().await.unwrap();
    assert_eq!(entries(&events), vec!["parent-1", "parent-2"]);

    events.lock().unwrap().clear();
    parent.execute().await.unwrap();
    assert_eq!(entries(&events), vec!["parent-1", "parent-2"]);

    assert_eq!(child.url(), "https://h/v1.0/me");
    assert_eq!(sibling.url(), "https://h/v1.0/users");
}

/// `replace` leaves only the new send observer.
#[tokio::test]
async fn test_replace_semantics() {
    let q = Queryable::new("https://h");
    let events = log();
    let a = events.clone();
    q.on(
        &SEND,
        responder(move |_args: SendArgs| {
            a.lock().unwrap().push("A".into());
            async { Ok(Response::new(204)) }
        }),
    )
    .unwrap();
    let b = events.clone();
    q.replace(
        &SEND,
        responder(move |_args: SendArgs| {
            b.lock().unwrap().push("B".into());
            async { Ok(Response::new(204)) }
        }),
    )
    .unwrap();

    q.execute().await.unwrap();
    assert_eq!(entries(&events), vec!["B"]);
}

/// Construct observers fire for every child created from a configured parent.
#[tokio::test]
async fn test_construct_fires_for_children() {
    let parent = Queryable::new("https://h");
    let built = log();
    let sink = built.clone();
    parent
        .on(
            &CONSTRUCT,
            listener(move |q: &Queryable| sink.lock().unwrap().push(q.url())),
        )
        .unwrap();

    let _a = Queryable::child(&parent, "a");
    let _b = Queryable::child(&parent, "b");

    assert_eq!(entries(&built), vec!["https://h/a", "https://h/b"]);
}

/// The future is not required to be polled for the request to start.
#[tokio::test]
async fn test_execution_runs_eagerly() {
    let q = Queryable::new("https://h");
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let tx = Arc::new(Mutex::new(Some(tx)));
    q.on(
        &SEND,
        responder(move |_args: SendArgs| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(());
            }
            async { Ok(Response::new(204)) }
        }),
    )
    .unwrap();

    let pending = q.execute();
    rx.await.unwrap();
    assert_eq!(pending.await.unwrap(), Payload::Empty);
}

/// Overrides passed to `execute_with` reach the transport, merged with behaviors.
#[tokio::test]
async fn test_execute_with_overrides() {
    let q = Queryable::new("https://h/items");
    let seen = Arc::new(Mutex::new(None));
    let slot = seen.clone();
    q.using(InjectHeaders::new([("Accept", "application/json")]))
        .unwrap()
        .on(
            &SEND,
            responder(move |args: SendArgs| {
                *slot.lock().unwrap() = Some(args.init.clone());
                async { Ok(Response::json(&json!({"id": "new"}))) }
            }),
        )
        .unwrap()
        .using(JsonParse)
        .unwrap();

    let init = RequestInit::post().json(&json!({"name": "n"})).unwrap();
    let created = q.execute_with(init).await.unwrap();

    assert_eq!(created, Payload::Json(json!({"id": "new"})));
    let init = seen.lock().unwrap().clone().unwrap();
    assert_eq!(init.method, "POST");
    assert_eq!(init.headers.get("accept"), Some("application/json"));
}

/// Concurrent invocations on siblings do not interfere.
#[tokio::test]
async fn test_sibling_invocations_are_independent() {
    let root = Queryable::new("https://h");
    root.on(
        &SEND,
        responder(|args: SendArgs| async move {
            Ok(Response::json(&json!({ "url": args.url })))
        }),
    )
    .unwrap()
    .using(JsonParse)
    .unwrap();

    let a = Queryable::child(&root, "a").execute();
    let b = Queryable::child(&root, "b").execute();
    let (a, b) = tokio::join!(a, b);

    assert_eq!(a.unwrap().into_json()["url"], "https://h/a");
    assert_eq!(b.unwrap().into_json()["url"], "https://h/b");
}

/// Errors reach the caller unchanged.
#[tokio::test]
async fn test_error_is_not_wrapped() {
    let q = Queryable::new("https://h");
    q.on(
        &SEND,
        responder(|_args: SendArgs| async {
            Err(SdkError::new(ErrorCode::Custom, "exact").with_extension("k", "v"))
        }),
    )
    .unwrap();

    let err = q.execute().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Custom);
    assert_eq!(err.message, "exact");
    assert!(err.extensions.unwrap().contains_key("k"));
}
