//! Request queue orchestrator.
//!
//! Owns the [`SynthesisBacklog`] plus the map of dispatched requests and
//! drives them with a single long-lived runner task.
//!
//! # Concurrency Model
//!
//! - Single long-lived runner, started on first submission
//! - `Notify` for wake-on-work; every runner iteration also sweeps capacity
//! - A batch is dispatched concurrently and fully settles before the next
//! - Lease ids prevent stale settlement after cancel or replacement
//! - One state lock covers backlog and active map, never held across I/O

mod worker;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use lector_core::{
    AudioStorePort, NarrationError, Priority, QueueConfig, QueueSnapshot, RequestKey,
    SynthesisRequest, SynthesizerPort,
};
use tokio::sync::{Mutex, Notify, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backlog::{BacklogEntry, SynthesisBacklog};
use crate::ticket::{Settlement, SynthesisTicket};

use worker::{JobOutcome, SynthesisJob, WorkerDeps};

type Waiter = oneshot::Sender<Settlement>;

/// Lease ID for tracking dispatched requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LeaseId(u64);

/// State for a dispatched request.
struct ActiveSynthesis {
    lease: LeaseId,
    cancel: CancellationToken,
    enqueued_at: Instant,
    waiters: Vec<Waiter>,
}

struct QueueState {
    backlog: SynthesisBacklog<Waiter>,
    active: HashMap<RequestKey, ActiveSynthesis>,
}

struct QueueInner {
    deps: WorkerDeps,
    config: QueueConfig,
    state: Mutex<QueueState>,
    lease_counter: AtomicU64,
    queue_notify: Notify,
    runner_started: AtomicBool,
    shutdown: CancellationToken,
}

/// Bounded, priority-ordered, deduplicating synthesis queue.
///
/// At most one synthesizer call per [`RequestKey`] is in flight; later
/// submissions for the same key share its result. Successful audio is
/// written through the [`AudioStorePort`] before waiters resolve.
pub struct RequestQueue {
    inner: Arc<QueueInner>,
}

impl RequestQueue {
    /// Create a queue. The runner starts on the first submission.
    pub fn new(
        synthesizer: Arc<dyn SynthesizerPort>,
        store: Arc<dyn AudioStorePort>,
        config: QueueConfig,
    ) -> Self {
        let deps = WorkerDeps {
            synthesizer,
            store,
            call_timeout: config.request_timeout,
        };
        Self {
            inner: Arc::new(QueueInner {
                deps,
                state: Mutex::new(QueueState {
                    backlog: SynthesisBacklog::new(config.max_queue_size),
                    active: HashMap::new(),
                }),
                config,
                lease_counter: AtomicU64::new(0),
                queue_notify: Notify::new(),
                runner_started: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Queue a request and return a ticket for its result.
    ///
    /// If a request with the same key is already pending, backing off or in
    /// flight, the ticket settles alongside it. An existing request older
    /// than the request timeout is rejected with `Timeout` and replaced.
    pub async fn enqueue(&self, request: SynthesisRequest) -> SynthesisTicket {
        let (tx, ticket) = SynthesisTicket::channel();
        self.inner.admit(request, tx).await;
        self.ensure_runner();
        self.inner.queue_notify.notify_one();
        ticket
    }

    /// Queue a request and wait for its result.
    pub async fn submit(&self, request: SynthesisRequest) -> Settlement {
        self.enqueue(request).await.await
    }

    /// Cancel one request wherever it is. Returns whether anything was
    /// cancelled.
    pub async fn cancel(&self, key: &RequestKey) -> bool {
        let mut state = self.inner.state.lock().await;

        if let Some(active) = state.active.remove(key) {
            active.cancel.cancel();
            settle(active.waiters, &Err(NarrationError::Cancelled));
            tracing::debug!(target: "lector.queue", key = %key, "Cancelled in-flight synthesis");
            return true;
        }

        if let Some(entry) = state.backlog.remove(key) {
            settle(entry.waiters, &Err(NarrationError::Cancelled));
            tracing::debug!(target: "lector.queue", key = %key, "Cancelled queued synthesis");
            return true;
        }

        false
    }

    /// Cancel every request of one book. Returns how many were cancelled.
    pub async fn cancel_all_for_book(&self, book_id: &str) -> usize {
        let mut state = self.inner.state.lock().await;

        let keys: Vec<RequestKey> = state
            .active
            .keys()
            .filter(|key| key.is_for_book(book_id))
            .cloned()
            .collect();
        let mut cancelled = 0;
        for key in keys {
            if let Some(active) = state.active.remove(&key) {
                active.cancel.cancel();
                settle(active.waiters, &Err(NarrationError::Cancelled));
                cancelled += 1;
            }
        }

        for entry in state.backlog.drain_book(book_id) {
            settle(entry.waiters, &Err(NarrationError::Cancelled));
            cancelled += 1;
        }

        if cancelled > 0 {
            tracing::info!(target: "lector.queue", book_id, cancelled, "Cancelled book requests");
        }
        cancelled
    }

    /// Reject every pending, backing-off and in-flight request with
    /// `Cancelled` and reset.
    pub async fn clear(&self) {
        let mut state = self.inner.state.lock().await;

        let mut cleared = 0;
        for (_, active) in state.active.drain() {
            active.cancel.cancel();
            settle(active.waiters, &Err(NarrationError::Cancelled));
            cleared += 1;
        }
        for entry in state.backlog.drain_all() {
            settle(entry.waiters, &Err(NarrationError::Cancelled));
            cleared += 1;
        }

        tracing::info!(target: "lector.queue", cleared, "Cleared synthesis queue");
    }

    /// Raise a waiting request to `priority` without attaching a waiter.
    ///
    /// Returns whether the request was found pending or backing off. A
    /// request already dispatched is left alone.
    pub async fn promote(&self, key: &RequestKey, priority: Priority) -> bool {
        let promoted = self.inner.state.lock().await.backlog.promote(key, priority);
        if promoted {
            tracing::trace!(target: "lector.queue", key = %key, priority, "Promoted request");
        }
        promoted
    }

    /// Change the backlog capacity. Excess items are dropped by the next
    /// runner sweep.
    pub async fn set_max_queue_size(&self, max_size: usize) {
        self.inner.state.lock().await.backlog.set_max_size(max_size);
        self.inner.queue_notify.notify_one();
    }

    /// Current counts.
    pub async fn snapshot(&self) -> QueueSnapshot {
        let state = self.inner.state.lock().await;
        QueueSnapshot {
            pending: state.backlog.pending_len(),
            active: state.active.len(),
            backing_off: state.backlog.backing_off_len(),
            max_size: state.backlog.max_size(),
        }
    }

    /// Ensure the runner is started. Idempotent.
    fn ensure_runner(&self) {
        if self
            .inner
            .runner_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                inner.run_loop().await;
            });
        }
    }
}

impl Drop for RequestQueue {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

impl QueueInner {
    /// Attach to an existing request or insert a new one.
    async fn admit(&self, request: SynthesisRequest, waiter: Waiter) {
        let key = request.key.clone();
        let timeout = self.config.request_timeout;
        let mut state = self.state.lock().await;

        if let Some(active) = state.active.get_mut(&key) {
            let age = active.enqueued_at.elapsed();
            if age <= timeout {
                active.waiters.push(waiter);
                tracing::trace!(target: "lector.queue", key = %key, "Joined in-flight synthesis");
                return;
            }
            if let Some(stale) = state.active.remove(&key) {
                stale.cancel.cancel();
                settle(stale.waiters, &Err(NarrationError::timeout(age)));
                tracing::warn!(
                    target: "lector.queue",
                    key = %key,
                    age = ?age,
                    "Replaced stale in-flight synthesis"
                );
            }
        }

        let waiter = match state.backlog.age_of(&key) {
            Some(age) if age > timeout => {
                if let Some(stale) = state.backlog.remove(&key) {
                    settle(stale.waiters, &Err(NarrationError::timeout(age)));
                    tracing::warn!(
                        target: "lector.queue",
                        key = %key,
                        age = ?age,
                        "Replaced stale queued synthesis"
                    );
                }
                waiter
            }
            Some(_) => match state.backlog.attach(&key, waiter, request.priority) {
                Ok(()) => {
                    tracing::trace!(target: "lector.queue", key = %key, "Joined queued synthesis");
                    return;
                }
                Err(waiter) => waiter,
            },
            None => waiter,
        };

        tracing::debug!(
            target: "lector.queue",
            key = %key,
            priority = request.priority,
            "Queued synthesis"
        );
        let dropped = state.backlog.insert(BacklogEntry::new(request, vec![waiter]));
        reject_overflow(dropped, state.backlog.max_size());
    }

    /// The main runner loop. Runs until the queue is dropped.
    async fn run_loop(self: Arc<Self>) {
        loop {
            let batch = self.next_batch().await;

            if batch.is_empty() {
                tokio::select! {
                    () = self.queue_notify.notified() => continue,
                    () = self.shutdown.cancelled() => break,
                }
            }

            tracing::debug!(target: "lector.queue", size = batch.len(), "Dispatching batch");
            join_all(batch.into_iter().map(|(lease, job)| {
                let inner = Arc::clone(&self);
                async move {
                    let outcome = worker::run_job(&job, &inner.deps).await;
                    inner.finalize(lease, job.request, outcome).await;
                }
            }))
            .await;
        }
        tracing::debug!(target: "lector.queue", "Runner stopped");
    }

    /// Sweep capacity, then move up to `batch_size` items to the active map.
    ///
    /// Items already past the request timeout are rejected instead.
    async fn next_batch(&self) -> Vec<(LeaseId, SynthesisJob)> {
        let mut state = self.state.lock().await;

        let dropped = state.backlog.enforce_capacity();
        reject_overflow(dropped, state.backlog.max_size());

        let mut batch = Vec::new();
        while batch.len() < self.config.batch_size {
            let Some(entry) = state.backlog.pop() else {
                break;
            };

            let age = entry.request.age();
            if age > self.config.request_timeout {
                tracing::warn!(
                    target: "lector.queue",
                    key = %entry.request.key,
                    age = ?age,
                    "Synthesis request expired before dispatch"
                );
                settle(entry.waiters, &Err(NarrationError::timeout(age)));
                continue;
            }

            let lease = LeaseId(self.lease_counter.fetch_add(1, Ordering::Relaxed));
            let cancel = self.shutdown.child_token();
            state.active.insert(
                entry.request.key.clone(),
                ActiveSynthesis {
                    lease,
                    cancel: cancel.clone(),
                    enqueued_at: entry.request.enqueued_at,
                    waiters: entry.waiters,
                },
            );
            batch.push((
                lease,
                SynthesisJob {
                    request: entry.request,
                    cancel,
                },
            ));
        }
        batch
    }

    /// Settle a finished job, or park it for a retry.
    async fn finalize(
        self: &Arc<Self>,
        lease: LeaseId,
        request: SynthesisRequest,
        outcome: JobOutcome,
    ) {
        let key = request.key.clone();
        let mut state = self.state.lock().await;

        let is_current = state
            .active
            .get(&key)
            .is_some_and(|active| active.lease == lease);
        let Some(active) = is_current.then(|| state.active.remove(&key)).flatten() else {
            tracing::debug!(
                target: "lector.queue",
                key = %key,
                "Ignoring stale result (lease mismatch)"
            );
            return;
        };

        match outcome {
            JobOutcome::Stored(path) => {
                tracing::debug!(
                    target: "lector.queue",
                    key = %key,
                    path = %path.display(),
                    waiters = active.waiters.len(),
                    "Synthesis complete"
                );
                settle(active.waiters, &Ok(path));
            }
            JobOutcome::Cancelled => {
                settle(active.waiters, &Err(NarrationError::Cancelled));
            }
            JobOutcome::Failed(err) => {
                if err.is_retryable() && request.retry_count < self.config.max_retries {
                    let mut request = request;
                    request.retry_count += 1;
                    let delay = self.config.backoff_for(request.retry_count);
                    tracing::info!(
                        target: "lector.queue",
                        key = %key,
                        retry = request.retry_count,
                        delay = ?delay,
                        error = %err,
                        "Retrying synthesis"
                    );
                    state
                        .backlog
                        .park(BacklogEntry::new(request, active.waiters), lease.0);
                    drop(state);
                    self.schedule_retry(key, lease.0, delay);
                } else {
                    tracing::warn!(
                        target: "lector.queue",
                        key = %key,
                        retries = request.retry_count,
                        error = %err,
                        "Synthesis failed"
                    );
                    settle(active.waiters, &Err(err));
                }
            }
        }
    }

    /// Return a parked entry to the backlog once its delay has elapsed.
    fn schedule_retry(self: &Arc<Self>, key: RequestKey, token: u64, delay: Duration) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = inner.shutdown.cancelled() => return,
            }

            {
                let mut state = inner.state.lock().await;
                // Gone means cancelled or cleared while backing off
                let Some(entry) = state.backlog.unpark(&key, token) else {
                    return;
                };
                let dropped = state.backlog.insert(entry);
                reject_overflow(dropped, state.backlog.max_size());
            }
            inner.queue_notify.notify_one();
        });
    }
}

fn settle(waiters: Vec<Waiter>, result: &Settlement) {
    for waiter in waiters {
        // A dropped ticket is not an error
        let _ = waiter.send(result.clone());
    }
}

fn reject_overflow(dropped: Vec<BacklogEntry<Waiter>>, max_size: usize) {
    for entry in dropped {
        tracing::warn!(
            target: "lector.queue",
            key = %entry.request.key,
            priority = entry.request.priority,
            max_size,
            "Queue over capacity, dropping request"
        );
        settle(entry.waiters, &Err(NarrationError::QueueOverflow { max_size }));
    }
}

