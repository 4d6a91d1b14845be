//! Event emitter trait for narration events.
//!
//! Implementations handle transport details (channels, IPC, SSE, etc.).

use tokio::sync::broadcast;

use crate::events::NarrationEvent;

/// Trait for emitting narration events.
///
/// # Implementations
///
/// - `NoopEmitter` - For tests and headless contexts
/// - `ChannelEmitter` - Broadcast channel; each subscriber owns a receiver
pub trait NarrationEventEmitter: Send + Sync {
    /// Emit an event. Must not block.
    fn emit(&self, event: NarrationEvent);

    /// Clone this emitter into a boxed trait object.
    fn clone_box(&self) -> Box<dyn NarrationEventEmitter>;
}

/// A no-op event emitter.
#[derive(Debug, Clone, Default)]
pub struct NoopEmitter;

impl NoopEmitter {
    /// Create a new no-op emitter.
    pub const fn new() -> Self {
        Self
    }
}

impl NarrationEventEmitter for NoopEmitter {
    fn emit(&self, _event: NarrationEvent) {
        // Intentionally do nothing
    }

    fn clone_box(&self) -> Box<dyn NarrationEventEmitter> {
        Box::new(self.clone())
    }
}

/// Emitter backed by a broadcast channel.
///
/// Each call to [`ChannelEmitter::subscribe`] returns an independent
/// receiver; dropping it is the unsubscribe. Slow subscribers lag and miss
/// events rather than blocking the emitter.
#[derive(Debug, Clone)]
pub struct ChannelEmitter {
    tx: broadcast::Sender<NarrationEvent>,
}

impl ChannelEmitter {
    /// Create an emitter buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<NarrationEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChannelEmitter {
    fn default() -> Self {
        Self::new(64)
    }
}

impl NarrationEventEmitter for ChannelEmitter {
    fn emit(&self, event: NarrationEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }

    fn clone_box(&self) -> Box<dyn NarrationEventEmitter> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NarrationState;
    use std::sync::Arc;

    #[test]
    fn test_noop_emitter() {
        let emitter: Arc<dyn NarrationEventEmitter> = Arc::new(NoopEmitter::new());
        emitter.emit(NarrationEvent::state_changed("book", NarrationState::Playing));
        let _boxed = emitter.clone_box();
    }

    #[tokio::test]
    async fn test_channel_emitter_delivers_to_subscribers() {
        let emitter = ChannelEmitter::new(8);
        let mut rx = emitter.subscribe();

        emitter.emit(NarrationEvent::state_changed("book", NarrationState::Loading));

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            NarrationEvent::state_changed("book", NarrationState::Loading)
        );
    }

    #[test]
    fn test_dropping_receiver_unsubscribes() {
        let emitter = ChannelEmitter::default();
        let rx = emitter.subscribe();
        assert_eq!(emitter.subscriber_count(), 1);
        drop(rx);
        assert_eq!(emitter.subscriber_count(), 0);

        // Emitting with nobody listening is fine
        emitter.emit(NarrationEvent::state_changed("book", NarrationState::Stopped));
    }
}
