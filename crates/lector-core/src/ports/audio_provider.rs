//! Audio provider port.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::domain::{AudioRequest, RequestKey};
use crate::errors::NarrationError;

/// Port through which playback obtains audio files.
///
/// Implemented by `NarrationService` in `lector-service`: a cache lookup
/// first, then the synthesis queue on a miss.
#[async_trait]
pub trait AudioProviderPort: Send + Sync {
    /// Resolve a fragment to a playable file.
    async fn request(&self, request: AudioRequest) -> Result<PathBuf, NarrationError>;

    /// Cancel every outstanding request of one book.
    async fn cancel_all_for_book(&self, book_id: &str) -> usize;

    /// Drop the cached audio of a fragment, e.g. after the sink failed to
    /// decode it. The next request synthesizes it again.
    async fn invalidate(&self, key: &RequestKey);
}
