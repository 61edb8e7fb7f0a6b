//! In-memory response cache.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use qline_core::{listener, reducer, SdkResult};
use rustc_hash::FxHashMap;
use uuid::Uuid;

use super::Behavior;
use crate::moments::{Invocation, PostState, PreparedRequest, DISPOSE, POST, PRE};
use crate::queryable::Queryable;
use crate::request::Payload;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Payload,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct StoreState {
    entries: FxHashMap<String, CacheEntry>,
    /// Invocations that missed during `pre`, with the key to store under.
    pending: FxHashMap<Uuid, String>,
}

/// Shared cache storage. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct CacheStore {
    state: Arc<Mutex<StoreState>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Fresh value for `key`. Expired entries are evicted.
    pub fn get(&self, key: &str) -> Option<Payload> {
        self.with(|state| {
            let fresh = state
                .entries
                .get(key)
                .map(|entry| entry.expires_at > Instant::now())?;
            if fresh {
                state.entries.get(key).map(|entry| entry.value.clone())
            } else {
                state.entries.remove(key);
                None
            }
        })
    }

    pub fn put(&self, key: impl Into<String>, value: Payload, ttl: Duration) {
        self.with(|state| {
            state.entries.insert(
                key.into(),
                CacheEntry {
                    value,
                    expires_at: Instant::now() + ttl,
                },
            );
        });
    }

    pub fn remove(&self, key: &str) {
        self.with(|state| {
            state.entries.remove(key);
        });
    }

    pub fn clear(&self) {
        self.with(|state| {
            state.entries.clear();
            state.pending.clear();
        });
    }

    pub fn len(&self) -> usize {
        self.with(|state| state.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn mark_pending(&self, invocation: Uuid, key: String) {
        self.with(|state| {
            state.pending.insert(invocation, key);
        });
    }

    fn take_pending(&self, invocation: &Uuid) -> Option<String> {
        self.with(|state| state.pending.remove(invocation))
    }
}

/// Serves GET requests from a [`CacheStore`].
///
/// A hit sets the result during `pre`, which skips auth, send and parse. A
/// miss is stored once `post` has the final result. Non-GET requests bypass
/// the cache.
#[derive(Debug, Clone)]
pub struct Caching {
    store: CacheStore,
    ttl: Duration,
}

impl Caching {
    pub fn new(store: CacheStore) -> Self {
        Self {
            store,
            ttl: Duration::from_secs(60),
        }
    }

    /// Sets how long entries stay fresh.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }
}

impl Behavior for Caching {
    fn apply_to(&self, queryable: &Queryable) -> SdkResult<()> {
        let store = self.store.clone();
        queryable.on(
            &PRE,
            reducer(move |mut request: PreparedRequest| {
                let store = store.clone();
                async move {
                    if request.init.is_get() && request.result.is_none() {
                        match store.get(&request.url) {
                            Some(hit) => {
                                tracing::debug!(url = %request.url, "cache hit");
                                request.result = Some(hit);
                            }
                            None => store.mark_pending(request.id, request.url.clone()),
                        }
                    }
                    Ok(request)
                }
            }),
        )?;

        let store = self.store.clone();
        let ttl = self.ttl;
        queryable.on(
            &POST,
            reducer(move |state: PostState| {
                let store = store.clone();
                async move {
                    if let Some(key) = store.take_pending(&state.id) {
                        store.put(key, state.result.clone(), ttl);
                    }
                    Ok(state)
                }
            }),
        )?;

        let store = self.store.clone();
        queryable.on(
            &DISPOSE,
            listener(move |invocation: &Invocation| {
                store.take_pending(&invocation.id);
            }),
        )?;
        Ok(())
    }
}
