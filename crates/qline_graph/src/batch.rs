//! Request batching over the JSON `$batch` endpoint.
//!
//! ```ignore
//! let (register, batch) = create_batch(&root, BatchOptions::default());
//!
//! let me = Queryable::child(&root, "me");
//! me.using(register.clone())?;
//! let drive = Queryable::child(&root, "me/drive");
//! drive.using(register)?;
//!
//! let me = me.execute();
//! let drive = drive.execute();
//! batch.execute().await?;
//! let (me, drive) = (me.await?, drive.await?);
//! ```
//!
//! Registered requests queue themselves at `send` instead of doing I/O.
//! [`Batch::execute`] waits until every started request is queued or has
//! finished without sending, posts the queue in invocation order in chunks
//! of at most `max_requests`, and hands each fragment back to its request,
//! whose own parse observers then run as usual.
//!
//! Children derived from a registered queryable inherit the registration, so
//! each of them joins the batch when invoked. A single instance may only have
//! one request in a batch; a second concurrent invocation is rejected.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use qline_core::{listener, responder, ErrorCode, SdkError, SdkResult};
use qline_runtime::{
    Behavior, Invocation, Queryable, RequestInit, Response, SendArgs, AUTH, DISPOSE, INIT, SEND,
};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::wire::{build_response, format_requests, match_fragments, BatchResponseBody};

/// Marker set on a queryable once a batch registrar is applied to it.
pub const BATCH_MARKER: &str = "qline.batch";

/// Marker set on an instance the first time it is invoked while batched.
const IN_FLIGHT_MARKER: &str = "qline.batch.in-flight";

const DEFAULT_MAX_REQUESTS: usize = 20;

/// Batch configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Maximum sub-requests per aggregated call.
    pub max_requests: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
        }
    }
}

impl BatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the chunk size. Values below 1 are treated as 1.
    pub fn max_requests(mut self, max: usize) -> Self {
        self.max_requests = max.max(1);
        self
    }
}

struct QueuedRequest {
    /// Invocation sequence within the batch.
    order: usize,
    url: String,
    init: RequestInit,
    reply: oneshot::Sender<SdkResult<Response>>,
}

/// One invocation of a batched queryable.
struct Participant {
    order: usize,
    /// False when the invoking instance already had a request in flight.
    owner: bool,
    registered: Option<oneshot::Sender<()>>,
    completed: Option<oneshot::Sender<()>>,
}

impl Participant {
    fn release_registration(&mut self) {
        if let Some(gate) = self.registered.take() {
            let _ = gate.send(());
        }
    }

    fn release_all(&mut self) {
        self.release_registration();
        if let Some(gate) = self.completed.take() {
            let _ = gate.send(());
        }
    }
}

#[derive(Default)]
struct BatchState {
    invocations: usize,
    participants: IndexMap<Uuid, Participant>,
    requests: Vec<QueuedRequest>,
    /// Resolved once an invocation is queued or finished without sending.
    registration: Vec<oneshot::Receiver<()>>,
    /// Resolved once an invocation is disposed.
    completion: Vec<oneshot::Receiver<()>>,
}

type SharedState = Arc<Mutex<BatchState>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Creates a batch against `root`.
///
/// Returns the behavior that registers a queryable into the batch and the
/// handle that flushes it. The `$batch` call itself is a child of `root` and
/// runs `root`'s observers, so auth happens once per chunk.
pub fn create_batch(root: &Queryable, options: BatchOptions) -> (BatchRegistrar, Batch) {
    let state: SharedState = Arc::default();
    let registrar = BatchRegistrar {
        state: state.clone(),
    };
    let batch = Batch {
        root: root.clone(),
        state,
        options: BatchOptions::new().max_requests(options.max_requests),
    };
    (registrar, batch)
}

/// Behavior that routes a queryable's `send` into a batch.
#[derive(Clone)]
pub struct BatchRegistrar {
    state: SharedState,
}

/// Moments whose observers are swapped while a queryable is batched.
const SWAPPED: [&str; 4] = [AUTH.name(), SEND.name(), INIT.name(), DISPOSE.name()];

impl Behavior for BatchRegistrar {
    fn apply_to(&self, queryable: &Queryable) -> SdkResult<()> {
        if !queryable.try_mark(BATCH_MARKER) {
            return Err(SdkError::new(
                ErrorCode::AlreadyRegistered,
                format!(
                    "queryable for {} is already registered in a batch; create a new instance for each batched request",
                    queryable.url()
                ),
            ));
        }

        let baseline = queryable.timeline().snapshot();

        let state = self.state.clone();
        queryable.on(
            &INIT,
            listener(move |invocation: &Invocation| {
                let owner = invocation.queryable.try_mark(IN_FLIGHT_MARKER);
                let (registered_tx, registered_rx) = oneshot::channel();
                let (completed_tx, completed_rx) = oneshot::channel();
                let mut state = lock(&state);
                state.invocations += 1;
                let order = state.invocations;
                state.registration.push(registered_rx);
                state.completion.push(completed_rx);
                state.participants.insert(
                    invocation.id,
                    Participant {
                        order,
                        owner,
                        registered: Some(registered_tx),
                        completed: Some(completed_tx),
                    },
                );
            }),
        )?;

        queryable.clear(&AUTH)?;

        let state = self.state.clone();
        queryable.replace(
            &SEND,
            responder(move |SendArgs { id, url, init }: SendArgs| {
                let state = state.clone();
                async move {
                    let (reply, response) = oneshot::channel();
                    {
                        let mut state = lock(&state);
                        let Some(participant) = state.participants.get_mut(&id) else {
                            return Err(SdkError::internal(format!(
                                "request for {url} reached the batch without being started in it"
                            )));
                        };
                        participant.release_registration();
                        if !participant.owner {
                            return Err(SdkError::new(
                                ErrorCode::AlreadyRegistered,
                                format!("request for {url} is already queued in this batch"),
                            ));
                        }
                        let order = participant.order;
                        state.requests.push(QueuedRequest {
                            order,
                            url,
                            init,
                            reply,
                        });
                    }
                    response.await.map_err(|_| {
                        SdkError::new(
                            ErrorCode::Cancelled,
                            "batch was dropped before the request was sent",
                        )
                    })?
                }
            }),
        )?;

        let state = self.state.clone();
        queryable.on(
            &DISPOSE,
            listener(move |invocation: &Invocation| {
                let participant = lock(&state).participants.shift_remove(&invocation.id);
                if let Some(mut participant) = participant {
                    participant.release_all();
                    if participant.owner {
                        invocation.queryable.timeline().restore_from(&baseline, &SWAPPED);
                    }
                }
            }),
        )?;

        Ok(())
    }
}

/// Flushes the requests queued by its [`BatchRegistrar`].
pub struct Batch {
    root: Queryable,
    state: SharedState,
    options: BatchOptions,
}

impl Batch {
    pub fn options(&self) -> BatchOptions {
        self.options
    }

    /// Number of requests queued and not yet sent.
    pub fn queued(&self) -> usize {
        lock(&self.state).requests.len()
    }

    /// Sends every queued request and waits for all participants to finish.
    ///
    /// A failed chunk rejects each request in it and in every chunk not yet
    /// sent with that chunk's error, which is also returned here.
    pub async fn execute(&self) -> SdkResult<()> {
        let registration = std::mem::take(&mut lock(&self.state).registration);
        for gate in registration {
            // A dropped sender means the participant is gone; treat as released.
            let _ = gate.await;
        }

        let mut requests = std::mem::take(&mut lock(&self.state).requests);
        requests.sort_by_key(|r| r.order);
        let outcome = if requests.is_empty() {
            tracing::debug!("batch has no queued requests, skipping network call");
            Ok(())
        } else {
            self.flush(requests).await
        };

        let completion = std::mem::take(&mut lock(&self.state).completion);
        for gate in completion {
            let _ = gate.await;
        }
        outcome
    }

    async fn flush(&self, requests: Vec<QueuedRequest>) -> SdkResult<()> {
        let total = requests.len();
        let mut pending = requests.into_iter();
        let mut chunk_index = 0;

        loop {
            let chunk: Vec<QueuedRequest> = pending.by_ref().take(self.options.max_requests).collect();
            if chunk.is_empty() {
                return Ok(());
            }
            tracing::debug!(chunk_index, size = chunk.len(), total, "sending batch chunk");

            match self.send_chunk(&chunk).await {
                Ok(body) => {
                    let slots = match_fragments(chunk.len(), body.responses);
                    for (offset, (request, fragment)) in chunk.into_iter().zip(slots).enumerate() {
                        let outcome = match fragment {
                            Some(fragment) => build_response(&fragment),
                            None => Err(SdkError::new(
                                ErrorCode::InvalidResponse,
                                format!(
                                    "batch response has no fragment for request {}",
                                    chunk_index + offset
                                ),
                            )),
                        };
                        let _ = request.reply.send(outcome);
                    }
                }
                Err(err) => {
                    tracing::warn!(chunk_index, error = %err, "batch chunk failed");
                    for request in chunk.into_iter().chain(pending) {
                        let _ = request.reply.send(Err(err.clone()));
                    }
                    return Err(err);
                }
            }
            chunk_index += self.options.max_requests;
        }
    }

    async fn send_chunk(&self, chunk: &[QueuedRequest]) -> SdkResult<BatchResponseBody> {
        let body = format_requests(chunk.iter().map(|r| (r.url.as_str(), &r.init)));
        let text = serde_json::to_string(&body)
            .map_err(|e| SdkError::serialize(format!("failed to encode batch body: {e}")))?;

        let endpoint = Queryable::child(&self.root, "$batch");
        let payload = endpoint
            .execute_with(
                RequestInit::post()
                    .header("Content-Type", "application/json")
                    .body(text),
            )
            .await?;
        BatchResponseBody::from_payload(payload)
    }
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch")
            .field("root", &self.root.url())
            .field("options", &self.options)
            .field("queued", &self.queued())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_requests_is_clamped() {
        assert_eq!(BatchOptions::new().max_requests(0).max_requests, 1);
        assert_eq!(BatchOptions::default().max_requests, 20);
    }

    #[test]
    fn test_second_registration_is_rejected() {
        let root = Queryable::new("https://h/v1.0");
        let (register, _batch) = create_batch(&root, BatchOptions::default());
        let q = Queryable::child(&root, "me");

        q.using(register.clone()).unwrap();
        let err = q.using(register).unwrap_err();
        assert_eq!(err.code, ErrorCode::AlreadyRegistered);
    }

    #[test]
    fn test_registration_swaps_auth_and_send() {
        let root = Queryable::new("https://h/v1.0");
        root.on(&AUTH, qline_core::reducer(|r: qline_runtime::PreparedRequest| async move { Ok(r) }))
            .unwrap();
        let (register, _batch) = create_batch(&root, BatchOptions::default());
        let q = Queryable::child(&root, "me");
        q.using(register).unwrap();

        let observers = q.timeline().snapshot();
        assert_eq!(observers.count("auth"), 0);
        assert_eq!(observers.count("send"), 1);
        assert_eq!(observers.count("init"), 1);
        assert_eq!(observers.count("dispose"), 1);
        assert_eq!(root.timeline().snapshot().count("auth"), 1);
    }
}
