//! Narration service - cache-first audio with request coalescing.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lector_core::{
    AudioProviderPort, AudioRequest, AudioStorePort, NarrationError, NarrationSettings, Priority,
    QueueSnapshot, RequestKey, SynthesizerPort,
};
use lector_queue::{RequestQueue, Settlement};
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;

/// One outstanding request and the channel its waiters listen on.
struct InFlight {
    tx: broadcast::Sender<Settlement>,
    cancel: CancellationToken,
    /// Highest priority any caller has asked for.
    priority: Arc<AtomicI64>,
}

/// Facade over the audio store and the synthesis queue.
///
/// Order of resolution for a request:
/// 1. Already in flight here: raise its priority if needed and wait for
///    that result
/// 2. Cached (unless bypassed): return the cached path
/// 3. Otherwise: submit to the queue and share the result with anyone who
///    asks in the meantime
pub struct NarrationService {
    store: Arc<dyn AudioStorePort>,
    queue: Arc<RequestQueue>,
    waiter_timeout: Duration,
    in_flight: Arc<Mutex<HashMap<RequestKey, InFlight>>>,
}

impl NarrationService {
    /// Create a new narration service.
    pub fn new(
        store: Arc<dyn AudioStorePort>,
        queue: Arc<RequestQueue>,
        waiter_timeout: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            waiter_timeout,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Build the queue and service from settings.
    pub fn from_settings(
        synthesizer: Arc<dyn SynthesizerPort>,
        store: Arc<dyn AudioStorePort>,
        settings: &NarrationSettings,
    ) -> Self {
        let queue = RequestQueue::new(synthesizer, Arc::clone(&store), settings.queue_config());
        Self::new(store, Arc::new(queue), settings.waiter_timeout())
    }

    /// Resolve a fragment to an audio file path.
    pub async fn request_audio(
        &self,
        book_id: &str,
        fragment_id: &str,
        text: &str,
        priority: Priority,
    ) -> Result<PathBuf, NarrationError> {
        self.request(AudioRequest::new(
            RequestKey::new(book_id, fragment_id),
            text,
            priority,
        ))
        .await
    }

    /// Resolve a request, honouring its options and cache bypass flag.
    pub async fn request(&self, request: AudioRequest) -> Result<PathBuf, NarrationError> {
        let key = request.key.clone();
        let bypass_cache = request.bypass_cache;
        let priority = request.priority;

        if let Some(rx) = self.join(&key, priority).await {
            tracing::trace!(target: "lector.service", key = %key, "Waiting on in-flight request");
            return self.wait_as_follower(rx).await;
        }

        if !bypass_cache {
            if let Some(path) = self.store.lookup(&key).await.into_hit() {
                tracing::trace!(target: "lector.service", key = %key, "Cache hit");
                return Ok(path);
            }
        }

        let rx = {
            let mut in_flight = self.in_flight.lock().await;
            // Someone may have started it during the cache lookup
            if let Some(existing) = in_flight.get(&key) {
                let rx = existing.follow(priority);
                drop(in_flight);
                self.queue.promote(&key, priority).await;
                return self.wait_as_follower(rx).await;
            }

            let (tx, rx) = broadcast::channel(1);
            let entry = InFlight {
                tx,
                cancel: CancellationToken::new(),
                priority: Arc::new(AtomicI64::new(priority)),
            };
            self.spawn_submission(request, &entry);
            in_flight.insert(key.clone(), entry);
            rx
        };

        tracing::debug!(
            target: "lector.service",
            key = %key,
            bypass_cache,
            "Requested synthesis"
        );
        Self::wait_as_leader(rx).await
    }

    /// The cached path of a fragment, without synthesizing.
    pub async fn cached_path(&self, book_id: &str, fragment_id: &str) -> Option<PathBuf> {
        self.store
            .lookup(&RequestKey::new(book_id, fragment_id))
            .await
            .into_hit()
    }

    /// Cancel one fragment. Waiters observe `Cancelled`.
    pub async fn cancel(&self, book_id: &str, fragment_id: &str) -> bool {
        self.cancel_key(&RequestKey::new(book_id, fragment_id)).await
    }

    /// Cancel every outstanding request of one book.
    pub async fn cancel_all_for_book(&self, book_id: &str) -> usize {
        let cancelled = {
            let mut in_flight = self.in_flight.lock().await;
            let keys: Vec<RequestKey> = in_flight
                .keys()
                .filter(|key| key.is_for_book(book_id))
                .cloned()
                .collect();
            for key in &keys {
                if let Some(entry) = in_flight.remove(key) {
                    release(entry);
                }
            }
            keys.len()
        };

        let queued = self.queue.cancel_all_for_book(book_id).await;
        tracing::debug!(target: "lector.service", book_id, cancelled, queued, "Cancelled book");
        cancelled.max(queued)
    }

    /// Forget a fragment's cached audio so the next request synthesizes it
    /// again. A synthesis already in flight is left running.
    pub async fn invalidate(&self, key: &RequestKey) {
        self.store.remove(key).await;
        tracing::debug!(target: "lector.service", key = %key, "Invalidated cached audio");
    }

    /// Remove every cached file of one book.
    pub async fn clear_book_cache(&self, book_id: &str) {
        self.store.clear_book(book_id).await;
    }

    /// Bytes cached for one book.
    pub async fn cache_size_of(&self, book_id: &str) -> u64 {
        self.store.size_of(book_id).await
    }

    /// Bytes cached for all books.
    pub async fn total_cache_size(&self) -> u64 {
        self.store.total_size().await
    }

    /// Queue counts, for diagnostics.
    pub async fn queue_snapshot(&self) -> QueueSnapshot {
        self.queue.snapshot().await
    }

    /// Cancel everything (book close or teardown).
    pub async fn shutdown(&self) {
        {
            let mut in_flight = self.in_flight.lock().await;
            for (_, entry) in in_flight.drain() {
                release(entry);
            }
        }
        self.queue.clear().await;
        tracing::info!(target: "lector.service", "Narration service shut down");
    }

    async fn cancel_key(&self, key: &RequestKey) -> bool {
        let local = self.in_flight.lock().await.remove(key);
        let had_local = local.is_some();
        if let Some(entry) = local {
            release(entry);
        }
        let queued = self.queue.cancel(key).await;
        had_local || queued
    }

    /// Subscribe to an in-flight request, promoting it to `priority`.
    async fn join(
        &self,
        key: &RequestKey,
        priority: Priority,
    ) -> Option<broadcast::Receiver<Settlement>> {
        let rx = self.in_flight.lock().await.get(key)?.follow(priority);
        self.queue.promote(key, priority).await;
        Some(rx)
    }

    /// Run the submission detached so it settles even if the leader's
    /// future is dropped.
    fn spawn_submission(&self, request: AudioRequest, entry: &InFlight) {
        let queue = Arc::clone(&self.queue);
        let in_flight = Arc::clone(&self.in_flight);
        let key = request.key.clone();
        let tx = entry.tx.clone();
        let cancel = entry.cancel.clone();
        let priority = Arc::clone(&entry.priority);

        tokio::spawn(async move {
            let submission = async {
                let mut synthesis = request.into_synthesis();
                synthesis.priority = synthesis.priority.max(priority.load(Ordering::SeqCst));
                let submitted = synthesis.priority;
                let ticket = queue.enqueue(synthesis).await;
                // A follower may have raised the priority before the enqueue landed
                let raised = priority.load(Ordering::SeqCst);
                if raised > submitted {
                    queue.promote(&key, raised).await;
                }
                ticket.await
            };
            let result = tokio::select! {
                () = cancel.cancelled() => Err(NarrationError::Cancelled),
                result = submission => result,
            };

            {
                let mut in_flight = in_flight.lock().await;
                // Only unmark our own entry; a cancel may have replaced it
                if in_flight
                    .get(&key)
                    .is_some_and(|entry| entry.tx.same_channel(&tx))
                {
                    in_flight.remove(&key);
                }
            }

            if let Err(e) = &result {
                if !e.is_cancelled() {
                    tracing::debug!(
                        target: "lector.service",
                        key = %key,
                        error = %e,
                        "Request failed"
                    );
                }
            }
            let _ = tx.send(result);
        });
    }

    async fn wait_as_leader(mut rx: broadcast::Receiver<Settlement>) -> Settlement {
        rx.recv().await.unwrap_or(Err(NarrationError::Cancelled))
    }

    /// Wait at most `waiter_timeout`; the receiver is dropped on timeout.
    async fn wait_as_follower(&self, mut rx: broadcast::Receiver<Settlement>) -> Settlement {
        match tokio::time::timeout(self.waiter_timeout, rx.recv()).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(NarrationError::Cancelled),
            Err(_) => Err(NarrationError::timeout(self.waiter_timeout)),
        }
    }
}

impl InFlight {
    fn follow(&self, priority: Priority) -> broadcast::Receiver<Settlement> {
        self.priority.fetch_max(priority, Ordering::SeqCst);
        self.tx.subscribe()
    }
}

/// Cancel an in-flight entry and tell its waiters.
fn release(entry: InFlight) {
    entry.cancel.cancel();
    let _ = entry.tx.send(Err(NarrationError::Cancelled));
}

#[async_trait]
impl AudioProviderPort for NarrationService {
    async fn request(&self, request: AudioRequest) -> Result<PathBuf, NarrationError> {
        Self::request(self, request).await
    }

    async fn cancel_all_for_book(&self, book_id: &str) -> usize {
        Self::cancel_all_for_book(self, book_id).await
    }

    async fn invalidate(&self, key: &RequestKey) {
        Self::invalidate(self, key).await;
    }
}
