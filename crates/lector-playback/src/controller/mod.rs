//! Playback controller - one narration session over one audio sink.
//!
//! Every transition takes the session lock for its whole duration, so
//! transitions never interleave. Transitions that replace what is playing
//! (`stop`, `next`, `prev`, `play_from`, `reload_page`, `shutdown`) first
//! fire the interrupt token so an in-progress load gives the lock up early.

mod pump;
mod session;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use lector_core::{
    AudioProviderPort, AudioRequest, AudioSinkPort, CursorTarget, Direction, Fragment,
    FragmentCursor, HighlightPort, NarrationError, NarrationEvent, NarrationEventEmitter,
    NarrationSnapshot, NarrationState, NavigatorPort, PlaybackConfig, PlaybackIncident, Priority,
    RequestKey, SinkErrorCode, SinkEvent,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::prefetch::{self, Prefetcher};
use session::Session;

pub use session::MAX_INCIDENTS;

/// Ports a controller drives.
pub struct PlaybackDeps {
    pub provider: Arc<dyn AudioProviderPort>,
    pub sink: Arc<dyn AudioSinkPort>,
    pub navigator: Arc<dyn NavigatorPort>,
    pub highlighter: Arc<dyn HighlightPort>,
    pub emitter: Arc<dyn NarrationEventEmitter>,
}

/// Narrates one book.
///
/// Dropping the controller stops its sink event pump and abandons any
/// prefetch in progress. It does not stop the sink; call
/// [`shutdown`](Self::shutdown) for that.
pub struct PlaybackController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    book_id: String,
    deps: PlaybackDeps,
    config: PlaybackConfig,
    session: Mutex<Session>,
    interrupt: Mutex<CancellationToken>,
    /// Last priority handed to the provider. Grows with every request so
    /// the fragment asked for most recently wins.
    priority: AtomicI64,
    pump_started: AtomicBool,
    shutdown: CancellationToken,
}

impl PlaybackController {
    /// Create a controller positioned at the start of the navigator's
    /// current page.
    pub fn new(book_id: impl Into<String>, deps: PlaybackDeps, config: PlaybackConfig) -> Self {
        let book_id = book_id.into();
        let shutdown = CancellationToken::new();
        let cursor = FragmentCursor::at_start(deps.navigator.fragments_for_current_page());
        let prefetch = Prefetcher::new(Arc::clone(&deps.provider), book_id.clone(), &shutdown);

        Self {
            inner: Arc::new(ControllerInner {
                book_id,
                deps,
                config,
                session: Mutex::new(Session::new(cursor, prefetch)),
                interrupt: Mutex::new(CancellationToken::new()),
                priority: AtomicI64::new(0),
                pump_started: AtomicBool::new(false),
                shutdown,
            }),
        }
    }

    /// Book this controller narrates.
    pub fn book_id(&self) -> &str {
        &self.inner.book_id
    }

    /// Active configuration.
    pub fn config(&self) -> &PlaybackConfig {
        &self.inner.config
    }

    // ── Transitions ────────────────────────────────────────────────

    /// Start narrating at the cursor. No-op while playing; resumes when
    /// paused.
    pub async fn play(&self) -> Result<(), NarrationError> {
        pump::ensure_started(&self.inner);
        let interrupt = self.inner.current_interrupt().await;
        let mut session = self.inner.session.lock().await;
        self.inner.play_locked(&mut session, &interrupt).await
    }

    /// Hold the current position. Only legal while playing.
    pub async fn pause(&self) -> Result<(), NarrationError> {
        let mut session = self.inner.session.lock().await;
        if session.state != NarrationState::Playing {
            return Ok(());
        }
        self.inner.deps.sink.pause().await?;
        self.inner.set_state(&mut session, NarrationState::Paused);
        Ok(())
    }

    /// Continue from the held position. Only legal while paused.
    pub async fn resume(&self) -> Result<(), NarrationError> {
        let mut session = self.inner.session.lock().await;
        self.inner.resume_locked(&mut session).await
    }

    /// Stop and rewind to the first fragment of the page. Always legal.
    pub async fn stop(&self) -> Result<(), NarrationError> {
        self.inner.interrupt().await;
        let mut session = self.inner.session.lock().await;
        self.inner.stop_locked(&mut session).await
    }

    /// Move to the next fragment, turning the page at its end, and play.
    pub async fn next(&self) -> Result<(), NarrationError> {
        self.step(Direction::Forward).await
    }

    /// Move to the previous fragment, turning back at the page start, and
    /// play.
    pub async fn prev(&self) -> Result<(), NarrationError> {
        self.step(Direction::Backward).await
    }

    /// Jump to a fragment on the current page and play it.
    pub async fn play_from(&self, fragment_id: &str) -> Result<(), NarrationError> {
        pump::ensure_started(&self.inner);
        let interrupt = self.inner.interrupt().await;
        let mut session = self.inner.session.lock().await;

        let Some(index) = session.cursor.position_of(fragment_id) else {
            return Err(NarrationError::navigation(format!(
                "fragment {fragment_id} is not on the current page"
            )));
        };

        self.inner.leave_fragment(&session).await;
        session.cursor.seek(index);
        self.inner.narrate_locked(&mut session, &interrupt).await
    }

    /// Re-read the current page after the reader turned it. Stops playback.
    pub async fn reload_page(&self) -> Result<(), NarrationError> {
        self.inner.interrupt().await;
        let mut session = self.inner.session.lock().await;

        let stopped = self.inner.deps.sink.stop().await;
        self.inner.deps.highlighter.clear();
        let fragments = self.inner.deps.navigator.fragments_for_current_page();
        tracing::debug!(
            target: "lector.playback",
            book_id = %self.inner.book_id,
            fragments = fragments.len(),
            "Reloaded page"
        );
        session.cursor = FragmentCursor::at_start(fragments);
        session.prefetch.reset();
        session.consecutive_failures = 0;
        self.inner.set_state(&mut session, NarrationState::Stopped);
        stopped
    }

    /// Stop everything: playback, prefetch and the sink event pump.
    pub async fn shutdown(&self) {
        self.inner.interrupt().await;
        let mut session = self.inner.session.lock().await;

        session.prefetch.cancel();
        let abandoned = self
            .inner
            .deps
            .provider
            .cancel_all_for_book(&self.inner.book_id)
            .await;
        if let Err(e) = self.inner.deps.sink.stop().await {
            tracing::debug!(target: "lector.playback", error = %e, "Sink stop failed during shutdown");
        }
        self.inner.deps.highlighter.clear();
        self.inner.set_state(&mut session, NarrationState::Stopped);
        drop(session);

        self.inner.shutdown.cancel();
        tracing::info!(
            target: "lector.playback",
            book_id = %self.inner.book_id,
            abandoned,
            "Playback shut down"
        );
    }

    async fn step(&self, direction: Direction) -> Result<(), NarrationError> {
        pump::ensure_started(&self.inner);
        let interrupt = self.inner.interrupt().await;
        let mut session = self.inner.session.lock().await;
        self.inner.step_locked(&mut session, direction, &interrupt).await
    }

    // ── Queries ────────────────────────────────────────────────────

    /// Current state.
    pub async fn state(&self) -> NarrationState {
        self.inner.session.lock().await.state
    }

    /// Read-only view of the session.
    pub async fn snapshot(&self) -> NarrationSnapshot {
        let session = self.inner.session.lock().await;
        NarrationSnapshot {
            book_id: self.inner.book_id.clone(),
            state: session.state,
            index: session.cursor.index(),
            page_len: session.cursor.len(),
            fragment_id: session.current_fragment_id(),
            error_count: session.incidents.len(),
        }
    }

    /// Recorded incidents, oldest first.
    pub async fn errors(&self) -> Vec<PlaybackIncident> {
        self.inner.session.lock().await.incidents.to_vec()
    }

    /// Forget recorded incidents.
    pub async fn clear_errors(&self) {
        self.inner.session.lock().await.incidents.clear();
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

impl ControllerInner {
    // ── Interrupts and priorities ──────────────────────────────────

    async fn current_interrupt(&self) -> CancellationToken {
        self.interrupt.lock().await.clone()
    }

    /// Cancel whatever transition is loading and hand out a fresh token.
    async fn interrupt(&self) -> CancellationToken {
        let mut current = self.interrupt.lock().await;
        current.cancel();
        *current = CancellationToken::new();
        current.clone()
    }

    fn next_priority(&self) -> Priority {
        self.priority.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn current_priority(&self) -> Priority {
        self.priority.load(Ordering::SeqCst)
    }

    // ── Locked transitions ─────────────────────────────────────────

    async fn play_locked(
        &self,
        session: &mut Session,
        interrupt: &CancellationToken,
    ) -> Result<(), NarrationError> {
        match session.state {
            NarrationState::Playing => Ok(()),
            NarrationState::Paused => self.resume_locked(session).await,
            NarrationState::Stopped | NarrationState::Loading => {
                self.narrate_locked(session, interrupt).await
            }
        }
    }

    async fn resume_locked(&self, session: &mut Session) -> Result<(), NarrationError> {
        if session.state != NarrationState::Paused {
            return Ok(());
        }
        self.deps.sink.play().await?;
        self.set_state(session, NarrationState::Playing);
        Ok(())
    }

    async fn stop_locked(&self, session: &mut Session) -> Result<(), NarrationError> {
        let paused = self.deps.sink.pause().await;
        let rewound = self.deps.sink.stop().await;

        session.cursor.seek(0);
        session.consecutive_failures = 0;
        self.deps.highlighter.clear();
        self.set_state(session, NarrationState::Stopped);

        if let Some(first) = session.cursor.current().filter(|f| f.is_speakable()) {
            session
                .prefetch
                .spawn(vec![first.clone()], self.current_priority());
        }

        paused.and(rewound)
    }

    async fn step_locked(
        &self,
        session: &mut Session,
        direction: Direction,
        interrupt: &CancellationToken,
    ) -> Result<(), NarrationError> {
        let was_playing = session.state == NarrationState::Playing;
        self.leave_fragment(session).await;

        let crossed = match session.cursor.target(direction) {
            CursorTarget::Within(index) => {
                session.cursor.set_index(index);
                false
            }
            CursorTarget::PastEnd => {
                self.turn_page(session, Direction::Forward).await?;
                true
            }
            CursorTarget::BeforeStart => {
                self.turn_page(session, Direction::Backward).await?;
                true
            }
        };

        if crossed && was_playing {
            let edge = prefetch::page_edge(
                session.cursor.fragments(),
                direction,
                self.config.page_prefetch,
            );
            session.prefetch.spawn(edge, self.current_priority() - 2);
        }

        self.narrate_locked(session, interrupt).await
    }

    /// Play the fragment under the cursor. Empty pages are skipped forward;
    /// unspeakable or failing fragments are skipped in the direction of
    /// travel.
    async fn narrate_locked(
        &self,
        session: &mut Session,
        interrupt: &CancellationToken,
    ) -> Result<(), NarrationError> {
        loop {
            if interrupt.is_cancelled() {
                self.set_state(session, NarrationState::Stopped);
                return Ok(());
            }

            let Some(fragment) = session.cursor.current().cloned() else {
                self.set_state(session, NarrationState::Loading);
                if self.grace(interrupt).await {
                    tracing::debug!(target: "lector.playback", book_id = %self.book_id, "Skipping page without text");
                    self.turn_page(session, Direction::Forward).await?;
                }
                continue;
            };

            if !fragment.is_speakable() {
                self.set_state(session, NarrationState::Loading);
                if self.grace(interrupt).await {
                    self.skip(session).await?;
                }
                continue;
            }

            match self.start_fragment(session, &fragment, interrupt).await {
                Ok(()) => {
                    session.consecutive_failures = 0;
                    self.set_state(session, NarrationState::Playing);
                    self.deps.emitter.emit(NarrationEvent::FragmentStarted {
                        book_id: self.book_id.clone(),
                        fragment_id: fragment.id.clone(),
                        index: session.cursor.index(),
                    });
                    self.refresh_prefetch(session);
                    return Ok(());
                }
                Err(_) if interrupt.is_cancelled() => {}
                Err(e) => {
                    self.record(
                        session,
                        Some(fragment.id.clone()),
                        format!("Skipped fragment: {e}"),
                    );
                    self.deps.highlighter.unhighlight(&fragment.id);
                    session.consecutive_failures += 1;

                    if session.consecutive_failures > self.config.max_consecutive_failures {
                        tracing::error!(
                            target: "lector.playback",
                            book_id = %self.book_id,
                            failures = session.consecutive_failures,
                            "Too many failures in a row, stopping"
                        );
                        self.deps.highlighter.clear();
                        self.set_state(session, NarrationState::Stopped);
                        return Err(e);
                    }

                    self.skip(session).await?;
                }
            }
        }
    }

    /// Highlight, fetch, load and start one fragment, with retries.
    async fn start_fragment(
        &self,
        session: &mut Session,
        fragment: &Fragment,
        interrupt: &CancellationToken,
    ) -> Result<(), NarrationError> {
        self.set_state(session, NarrationState::Loading);
        self.deps.highlighter.highlight(&fragment.id);

        let attempts = self.config.play_attempts.max(1);
        let mut last_error = NarrationError::Cancelled;

        for attempt in 1..=attempts {
            let bypass_cache = attempt > 1;
            match self
                .load_and_play(session, fragment, bypass_cache, interrupt)
                .await
            {
                Ok(()) => return Ok(()),
                Err(_) if interrupt.is_cancelled() => return Err(NarrationError::Cancelled),
                Err(e) => {
                    tracing::warn!(
                        target: "lector.playback",
                        book_id = %self.book_id,
                        fragment_id = %fragment.id,
                        attempt,
                        error = %e,
                        "Playback attempt failed"
                    );
                    session.paths.remove(&fragment.id);
                    if let Err(stop_err) = self.deps.sink.stop().await {
                        tracing::debug!(target: "lector.playback", error = %stop_err, "Sink reset failed");
                    }
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn load_and_play(
        &self,
        session: &mut Session,
        fragment: &Fragment,
        bypass_cache: bool,
        interrupt: &CancellationToken,
    ) -> Result<(), NarrationError> {
        let known = if bypass_cache {
            None
        } else {
            session.paths.get(&fragment.id).cloned()
        };

        let path: PathBuf = match known {
            Some(path) => path,
            None => {
                let request = AudioRequest::new(
                    RequestKey::new(self.book_id.as_str(), fragment.id.as_str()),
                    fragment.text.as_str(),
                    self.next_priority(),
                )
                .with_bypass_cache(bypass_cache);

                let path = tokio::select! {
                    () = interrupt.cancelled() => return Err(NarrationError::Cancelled),
                    result = self.deps.provider.request(request) => result?,
                };
                session.paths.insert(fragment.id.clone(), path.clone());
                path
            }
        };

        let timeout = self.config.sink_load_timeout;
        tokio::select! {
            () = interrupt.cancelled() => return Err(NarrationError::Cancelled),
            loaded = tokio::time::timeout(timeout, self.deps.sink.load(&path)) => match loaded {
                Ok(result) => result?,
                Err(_) => return Err(NarrationError::timeout(timeout)),
            },
        }

        self.deps.sink.play().await
    }

    // ── Cursor movement ────────────────────────────────────────────

    /// Unhighlight the current fragment and silence the sink.
    async fn leave_fragment(&self, session: &Session) {
        if let Some(current) = session.cursor.current() {
            self.deps.highlighter.unhighlight(&current.id);
        }
        if let Err(e) = self.deps.sink.stop().await {
            tracing::debug!(target: "lector.playback", error = %e, "Sink stop failed");
        }
    }

    /// Move past the current fragment in the direction of travel.
    async fn skip(&self, session: &mut Session) -> Result<(), NarrationError> {
        let direction = session.cursor.direction();
        match session.cursor.target(direction) {
            CursorTarget::Within(index) => {
                session.cursor.set_index(index);
                Ok(())
            }
            CursorTarget::PastEnd | CursorTarget::BeforeStart => {
                self.turn_page(session, direction).await
            }
        }
    }

    /// Ask the navigator for a new page and reposition the cursor on it.
    ///
    /// A navigator failure is terminal: the session stops and the error is
    /// both recorded and returned.
    async fn turn_page(
        &self,
        session: &mut Session,
        direction: Direction,
    ) -> Result<(), NarrationError> {
        if let Err(e) = self.deps.navigator.advance_page(direction).await {
            self.record(session, None, e.to_string());
            self.deps.highlighter.clear();
            self.set_state(session, NarrationState::Stopped);
            return Err(e);
        }

        let fragments = self.deps.navigator.fragments_for_current_page();
        let fragment_count = fragments.len();
        session.cursor = match direction {
            Direction::Forward => FragmentCursor::at_start(fragments),
            Direction::Backward => FragmentCursor::at_end(fragments),
        };
        session.prefetch.reset();

        tracing::debug!(
            target: "lector.playback",
            book_id = %self.book_id,
            ?direction,
            fragment_count,
            "Turned page"
        );
        self.deps.emitter.emit(NarrationEvent::PageChanged {
            book_id: self.book_id.clone(),
            direction,
            fragment_count,
        });
        Ok(())
    }

    /// Wait out the grace period. Returns `false` when interrupted.
    async fn grace(&self, interrupt: &CancellationToken) -> bool {
        tokio::select! {
            () = interrupt.cancelled() => false,
            () = tokio::time::sleep(self.config.empty_page_grace) => true,
        }
    }

    fn refresh_prefetch(&self, session: &Session) {
        let ahead = self.config.prefetch_ahead;
        let next_page = if prefetch::runs_past_page(&session.cursor, ahead) {
            self.deps.navigator.peek_page(Direction::Forward)
        } else {
            None
        };

        let fragments: Vec<Fragment> = prefetch::window(
            &session.cursor,
            next_page.as_deref(),
            ahead,
            self.config.prefetch_behind,
        )
        .into_iter()
        .filter(|fragment| !session.paths.contains_key(&fragment.id))
        .collect();

        session
            .prefetch
            .spawn(fragments, self.current_priority() - 1);
    }

    // ── Sink events ────────────────────────────────────────────────

    async fn handle_sink_event(&self, event: SinkEvent) {
        match event {
            SinkEvent::ReadyToPlay => {}
            SinkEvent::Ended => {
                let interrupt = self.current_interrupt().await;
                let mut session = self.session.lock().await;
                if session.state != NarrationState::Playing {
                    return;
                }
                if let Err(e) = self
                    .step_locked(&mut session, Direction::Forward, &interrupt)
                    .await
                {
                    tracing::debug!(
                        target: "lector.playback",
                        book_id = %self.book_id,
                        error = %e,
                        "Auto-advance stopped"
                    );
                }
            }
            SinkEvent::Error { code, message } => {
                let mut session = self.session.lock().await;
                if !matches!(
                    session.state,
                    NarrationState::Playing | NarrationState::Paused
                ) {
                    return;
                }
                let fragment_id = session.current_fragment_id();
                if let Some(id) = &fragment_id {
                    session.paths.remove(id);
                    // The cached file itself is bad; make the next play synthesize it again
                    if matches!(code, SinkErrorCode::Decode | SinkErrorCode::SrcNotSupported) {
                        self.deps
                            .provider
                            .invalidate(&RequestKey::new(self.book_id.as_str(), id.as_str()))
                            .await;
                    }
                }
                let error = NarrationError::playback(code, message);
                self.record(&mut session, fragment_id, error.to_string());
                self.deps.highlighter.clear();
                self.set_state(&mut session, NarrationState::Stopped);
            }
        }
    }

    // ── Internal helpers ───────────────────────────────────────────

    /// Transition to a new state and emit a state-change event.
    fn set_state(&self, session: &mut Session, state: NarrationState) {
        if session.state != state {
            tracing::debug!(
                target: "lector.playback",
                book_id = %self.book_id,
                old = session.state.as_str(),
                new = state.as_str(),
                "Narration state transition"
            );
            session.state = state;
            self.deps
                .emitter
                .emit(NarrationEvent::state_changed(self.book_id.as_str(), state));
        }
    }

    /// Keep an error for the UI and tell subscribers about it.
    fn record(&self, session: &mut Session, fragment_id: Option<String>, message: String) {
        tracing::warn!(
            target: "lector.playback",
            book_id = %self.book_id,
            fragment_id = ?fragment_id,
            %message,
            "Playback incident"
        );
        self.deps.emitter.emit(NarrationEvent::error(
            self.book_id.as_str(),
            fragment_id.clone(),
            message.as_str(),
        ));
        session
            .incidents
            .push(PlaybackIncident::new(fragment_id, message));
    }
}
