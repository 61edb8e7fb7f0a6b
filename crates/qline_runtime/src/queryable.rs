//! Queryable request objects.
//!
//! A [`Queryable`] is a request that has not been sent yet: a URL, ordered
//! query parameters and a [`Timeline`] of observers. Calling
//! [`Queryable::execute`] drives one invocation through
//! `pre → auth → send → parse → post → data`, or to `error` on failure.
//!
//! ```ignore
//! let root = Queryable::new("https://graph.microsoft.com/v1.0");
//! root.using(Transport::new(Duration::from_secs(30))?)?.using(JsonParse)?;
//!
//! let me = Queryable::child(&root, "me");
//! me.set_query("$select", "displayName");
//! let profile: Profile = me.execute_as().await?;
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use indexmap::IndexMap;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use qline_core::{BoxFuture, ErrorCode, Moment, Observers, SdkError, SdkResult, Timeline};
use rustc_hash::FxHashSet;
use serde::de::DeserializeOwned;
use tracing::Instrument;
use uuid::Uuid;

use crate::behaviors::Behavior;
use crate::moments::{
    registry, Invocation, ParseState, PostState, PreparedRequest, SendArgs, AUTH, CONSTRUCT, DATA,
    DISPOSE, INIT, PARSE, POST, PRE, SEND,
};
use crate::request::{Payload, RequestInit};

/// Characters left untouched when encoding query values.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Characters left untouched when encoding query keys. `$` stays literal for
/// OData system options.
const QUERY_KEY: &AsciiSet = &QUERY_VALUE.remove(b'$');

/// Future returned by [`Queryable::execute`].
pub type Execution = BoxFuture<'static, SdkResult<Payload>>;

struct Inner {
    url: RwLock<String>,
    query: RwLock<IndexMap<String, String>>,
    timeline: Timeline,
    markers: Mutex<FxHashSet<&'static str>>,
}

/// Handle to a request object.
///
/// Clones are handles to the same object. Use [`Queryable::child`] to derive a
/// new object that starts from a copy of this one's observers.
#[derive(Clone)]
pub struct Queryable {
    inner: Arc<Inner>,
}

impl Queryable {
    /// Creates a root object with no observers.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::construct(base_url.into(), Observers::new(registry()))
    }

    /// Creates an object for `path` below `parent`.
    ///
    /// The child starts with a copy of the parent's observer lists as they are
    /// now. Observers added later to either side stay on that side. Query
    /// parameters are not inherited.
    pub fn child(parent: &Queryable, path: impl AsRef<str>) -> Self {
        Self::construct(
            combine(&parent.url(), path.as_ref()),
            parent.inner.timeline.snapshot(),
        )
    }

    fn construct(url: String, observers: Observers) -> Self {
        let queryable = Self {
            inner: Arc::new(Inner {
                url: RwLock::new(url),
                query: RwLock::new(IndexMap::new()),
                timeline: Timeline::from_observers(observers.clone()),
                markers: Mutex::new(FxHashSet::default()),
            }),
        };
        observers.emit_lifecycle(&CONSTRUCT, &queryable);
        queryable
    }

    /// Base URL without query string.
    pub fn url(&self) -> String {
        self.inner
            .url
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Appends raw text to the URL.
    pub fn concat(&self, segment: &str) -> &Self {
        self.inner
            .url
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(segment);
        self
    }

    /// Sets a query parameter, keeping its original position if it exists.
    pub fn set_query(&self, key: impl Into<String>, value: impl Into<String>) -> &Self {
        self.inner
            .query
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
        self
    }

    pub fn query_param(&self, key: &str) -> Option<String> {
        self.inner
            .query
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn remove_query(&self, key: &str) -> Option<String> {
        self.inner
            .query
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(key)
    }

    /// Copy of the query parameters in insertion order.
    pub fn query(&self) -> IndexMap<String, String> {
        self.inner
            .query
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Full request URL: base URL plus encoded query parameters.
    pub fn request_url(&self) -> String {
        let mut url = self.url();
        let query = self.inner.query.read().unwrap_or_else(PoisonError::into_inner);
        if query.is_empty() {
            return url;
        }
        let rendered = query
            .iter()
            .map(|(k, v)| {
                format!(
                    "{}={}",
                    utf8_percent_encode(k, QUERY_KEY),
                    utf8_percent_encode(v, QUERY_VALUE)
                )
            })
            .collect::<Vec<_>>()
            .join("&");
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&rendered);
        url
    }

    pub fn timeline(&self) -> &Timeline {
        &self.inner.timeline
    }

    pub fn on<H>(&self, moment: &Moment<H>, observer: H) -> SdkResult<&Self>
    where
        H: Send + Sync + 'static,
    {
        self.inner.timeline.on(moment, observer)?;
        Ok(self)
    }

    pub fn prepend<H>(&self, moment: &Moment<H>, observer: H) -> SdkResult<&Self>
    where
        H: Send + Sync + 'static,
    {
        self.inner.timeline.prepend(moment, observer)?;
        Ok(self)
    }

    pub fn replace<H>(&self, moment: &Moment<H>, observer: H) -> SdkResult<&Self>
    where
        H: Send + Sync + 'static,
    {
        self.inner.timeline.replace(moment, observer)?;
        Ok(self)
    }

    pub fn clear<H>(&self, moment: &Moment<H>) -> SdkResult<&Self> {
        self.inner.timeline.clear(moment)?;
        Ok(self)
    }

    /// Applies a behavior to this object.
    pub fn using(&self, behavior: impl Behavior) -> SdkResult<&Self> {
        behavior.apply_to(self)?;
        Ok(self)
    }

    /// Sets a marker. Returns false if it was already set.
    pub fn try_mark(&self, marker: &'static str) -> bool {
        self.inner
            .markers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(marker)
    }

    pub fn has_marker(&self, marker: &str) -> bool {
        self.inner
            .markers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(marker)
    }

    /// True when both handles refer to the same object.
    pub fn ptr_eq(&self, other: &Queryable) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Executes a GET.
    pub fn execute(&self) -> Execution {
        self.execute_with(RequestInit::default())
    }

    /// Starts one invocation.
    ///
    /// `init` is emitted before this returns. The remaining moments run on a
    /// spawned tokio task that first yields, so observers and query
    /// parameters added right after this call still apply to the invocation.
    /// The request makes progress even before the returned future is polled.
    /// Must be called from within a tokio runtime.
    pub fn execute_with(&self, init: RequestInit) -> Execution {
        let observers = self.inner.timeline.snapshot();
        if observers.is_empty() {
            let err = SdkError::configuration(format!(
                "no observers registered on queryable for {}",
                self.url()
            ));
            return Box::pin(std::future::ready(Err(err)));
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                let err = SdkError::configuration(format!("queryable executed outside a tokio runtime: {e}"));
                return Box::pin(std::future::ready(Err(err)));
            }
        };

        let invocation = Invocation {
            id: Uuid::new_v4(),
            queryable: self.clone(),
        };
        observers.emit_lifecycle(&INIT, &invocation);

        let span = tracing::debug_span!(
            "qline.request",
            request_id = %invocation.id,
            method = %init.method,
            url = tracing::field::Empty,
        );
        let task = runtime.spawn(run(invocation, init).instrument(span));

        Box::pin(async move {
            task.await.map_err(|e| {
                let code = if e.is_cancelled() {
                    ErrorCode::Cancelled
                } else {
                    ErrorCode::InternalError
                };
                SdkError::new(code, format!("request task failed: {e}"))
            })?
        })
    }

    /// Executes a GET and deserializes the JSON result.
    pub async fn execute_as<T: DeserializeOwned>(&self) -> SdkResult<T> {
        self.execute().await?.deserialize()
    }
}

impl fmt::Debug for Queryable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queryable")
            .field("url", &self.url())
            .field("query", &self.query())
            .field("observers", &self.inner.timeline.snapshot())
            .finish()
    }
}

async fn run(invocation: Invocation, init: RequestInit) -> SdkResult<Payload> {
    tokio::task::yield_now().await;

    let observers = invocation.queryable.timeline().snapshot();
    let request = PreparedRequest {
        id: invocation.id,
        url: invocation.queryable.request_url(),
        init,
        result: None,
    };
    tracing::Span::current().record("url", request.url.as_str());

    let outcome = pipeline(&observers, request).await;
    match &outcome {
        Ok(result) => {
            tracing::debug!("request completed");
            observers.emit_broadcast(&DATA, result);
        }
        Err(err) => {
            tracing::debug!(error = %err, "request failed");
            observers.emit_error(err);
        }
    }
    observers.emit_lifecycle(&DISPOSE, &invocation);
    outcome
}

async fn pipeline(observers: &Observers, request: PreparedRequest) -> SdkResult<Payload> {
    let request = observers.emit_reduce(&PRE, request).await?;
    if let Some(result) = request.result {
        tracing::debug!("result supplied during pre, skipping send");
        return Ok(result);
    }

    let PreparedRequest { id, url, init, .. } = observers.emit_reduce(&AUTH, request).await?;
    let response = observers
        .emit_request(
            &SEND,
            SendArgs {
                id,
                url: url.clone(),
                init,
            },
        )
        .await?;

    let parsed = observers
        .emit_reduce(
            &PARSE,
            ParseState {
                id,
                url,
                response,
                result: None,
            },
        )
        .await?;

    let post = observers
        .emit_reduce(
            &POST,
            PostState {
                id,
                url: parsed.url,
                result: parsed.result.unwrap_or(Payload::Empty),
            },
        )
        .await?;
    Ok(post.result)
}

/// Joins a base URL and a relative path with exactly one slash.
pub fn combine(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else if base.is_empty() {
        path.to_string()
    } else {
        format!("{base}/{path}")
    }
}
