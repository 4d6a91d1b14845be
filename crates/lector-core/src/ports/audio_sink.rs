//! Audio sink port.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::errors::{NarrationError, SinkErrorCode};

/// Events raised by an audio sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    /// Loaded media can start playing.
    ReadyToPlay,
    /// The current media played to the end.
    Ended,
    /// Playback failed.
    Error {
        /// Classified error code.
        code: SinkErrorCode,
        /// Sink-provided detail.
        message: String,
    },
}

/// Port for the exclusive playback resource of one session.
///
/// Only the playback controller may drive a sink. Events are delivered on a
/// broadcast channel; dropping the receiver unsubscribes.
#[async_trait]
pub trait AudioSinkPort: Send + Sync {
    /// Load a media file. Resolves once the media is ready to play.
    async fn load(&self, path: &Path) -> Result<(), NarrationError>;

    /// Start or continue playback from the current position.
    async fn play(&self) -> Result<(), NarrationError>;

    /// Hold the current position.
    async fn pause(&self) -> Result<(), NarrationError>;

    /// Stop playback and rewind to the start.
    async fn stop(&self) -> Result<(), NarrationError>;

    /// Current playback position.
    fn position(&self) -> Duration;

    /// Subscribe to sink events.
    fn subscribe(&self) -> broadcast::Receiver<SinkEvent>;
}
