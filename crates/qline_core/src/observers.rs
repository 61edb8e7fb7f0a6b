//! Observer lists and the per-moment combinators.

use indexmap::IndexMap;
use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::moment::{Moment, MomentKind, MomentRegistry, ERROR};
use crate::{SdkError, SdkResult};

/// Boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Observer of an [`MomentKind::AsyncReduce`] moment.
pub type Reducer<T> = Arc<dyn Fn(T) -> BoxFuture<'static, SdkResult<T>> + Send + Sync>;

/// Observer of a [`MomentKind::Request`] moment.
pub type Responder<I, O> = Arc<dyn Fn(I) -> BoxFuture<'static, SdkResult<O>> + Send + Sync>;

/// Observer of a [`MomentKind::Broadcast`] or [`MomentKind::Lifecycle`] moment.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Wraps an async closure as a [`Reducer`].
pub fn reducer<T, F, Fut>(f: F) -> Reducer<T>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SdkResult<T>> + Send + 'static,
{
    Arc::new(move |value| Box::pin(f(value)))
}

/// Wraps an async closure as a [`Responder`].
pub fn responder<I, O, F, Fut>(f: F) -> Responder<I, O>
where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SdkResult<O>> + Send + 'static,
{
    Arc::new(move |input| Box::pin(f(input)))
}

/// Wraps a closure as a [`Listener`].
pub fn listener<T, F>(f: F) -> Listener<T>
where
    F: Fn(&T) + Send + Sync + 'static,
{
    Arc::new(f)
}

type ErasedObserver = Arc<dyn Any + Send + Sync>;

/// Per-moment observer lists of one timeline.
///
/// Cloning copies the lists (the observers themselves are shared `Arc`s), so a
/// clone never sees later registrations on the original and vice versa.
#[derive(Clone)]
pub struct Observers {
    registry: Arc<MomentRegistry>,
    lists: IndexMap<&'static str, Vec<ErasedObserver>>,
}

impl Observers {
    /// Creates empty lists for every moment of `registry`.
    pub fn new(registry: Arc<MomentRegistry>) -> Self {
        let lists = registry.names().map(|name| (name, Vec::new())).collect();
        Self { registry, lists }
    }

    pub fn registry(&self) -> &Arc<MomentRegistry> {
        &self.registry
    }

    fn list_mut<H>(&mut self, moment: &Moment<H>) -> SdkResult<&mut Vec<ErasedObserver>> {
        match self.registry.kind_of(moment.name()) {
            Some(kind) if kind == moment.kind() => {}
            Some(kind) => {
                return Err(SdkError::configuration(format!(
                    "moment `{}` is defined as {}, not {}",
                    moment.name(),
                    kind,
                    moment.kind()
                )))
            }
            None => {
                return Err(SdkError::configuration(format!(
                    "moment `{}` is not defined on this timeline",
                    moment.name()
                )))
            }
        }
        self.lists.get_mut(moment.name()).ok_or_else(|| {
            SdkError::internal(format!("missing observer list for `{}`", moment.name()))
        })
    }

    /// Appends an observer.
    pub fn on<H>(&mut self, moment: &Moment<H>, observer: H) -> SdkResult<()>
    where
        H: Send + Sync + 'static,
    {
        self.list_mut(moment)?.push(Arc::new(observer));
        Ok(())
    }

    /// Inserts an observer ahead of the existing ones.
    pub fn prepend<H>(&mut self, moment: &Moment<H>, observer: H) -> SdkResult<()>
    where
        H: Send + Sync + 'static,
    {
        self.list_mut(moment)?.insert(0, Arc::new(observer));
        Ok(())
    }

    /// Removes every observer of the moment and adds `observer`.
    pub fn replace<H>(&mut self, moment: &Moment<H>, observer: H) -> SdkResult<()>
    where
        H: Send + Sync + 'static,
    {
        let list = self.list_mut(moment)?;
        list.clear();
        list.push(Arc::new(observer));
        Ok(())
    }

    pub fn clear<H>(&mut self, moment: &Moment<H>) -> SdkResult<()> {
        self.list_mut(moment)?.clear();
        Ok(())
    }

    /// Observers currently registered on the moment, in order.
    pub fn handlers<H>(&self, moment: &Moment<H>) -> Vec<H>
    where
        H: Clone + 'static,
    {
        self.lists
            .get(moment.name())
            .map(|list| {
                list.iter()
                    .filter_map(|observer| observer.downcast_ref::<H>().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of observers on the named moment.
    pub fn count(&self, name: &str) -> usize {
        self.lists.get(name).map_or(0, Vec::len)
    }

    /// True when no moment has any observer.
    pub fn is_empty(&self) -> bool {
        self.lists.values().all(Vec::is_empty)
    }

    /// Overwrites the named lists with the ones held by `baseline`.
    pub fn restore_from(&mut self, baseline: &Observers, names: &[&'static str]) {
        for name in names {
            if let (Some(target), Some(source)) =
                (self.lists.get_mut(name), baseline.lists.get(name))
            {
                target.clone_from(source);
            }
        }
    }

    /// Runs the observers in order, threading each output into the next.
    /// An empty list passes `input` through unchanged; the first error aborts
    /// the chain.
    pub async fn emit_reduce<T>(&self, moment: &Moment<Reducer<T>>, input: T) -> SdkResult<T>
    where
        T: Send + 'static,
    {
        let mut value = input;
        for observer in self.handlers(moment) {
            value = observer(value).await?;
        }
        Ok(value)
    }

    /// Runs only the last registered observer.
    pub async fn emit_request<I, O>(&self, moment: &Moment<Responder<I, O>>, input: I) -> SdkResult<O>
    where
        I: Send + 'static,
        O: Send + 'static,
    {
        let mut handlers = self.handlers(moment);
        if handlers.len() > 1 {
            tracing::trace!(
                moment = moment.name(),
                registered = handlers.len(),
                "request moment uses only the last observer"
            );
        }
        let observer = handlers.pop().ok_or_else(|| {
            SdkError::configuration(format!(
                "no observer registered for request moment `{}`",
                moment.name()
            ))
        })?;
        observer(input).await
    }

    /// Hands `payload` to every observer.
    pub fn emit_broadcast<T: 'static>(&self, moment: &Moment<Listener<T>>, payload: &T) {
        for observer in self.handlers(moment) {
            observer(payload);
        }
    }

    /// Fires a lifecycle moment.
    pub fn emit_lifecycle<T: 'static>(&self, moment: &Moment<Listener<T>>, subject: &T) {
        debug_assert_eq!(moment.kind(), MomentKind::Lifecycle);
        self.emit_broadcast(moment, subject);
    }

    /// Sends `error` down the error path.
    pub fn emit_error(&self, error: &SdkError) {
        self.emit_broadcast(&ERROR, error);
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (name, list) in &self.lists {
            map.entry(name, &list.len());
        }
        map.finish()
    }
}
