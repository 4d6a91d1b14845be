//! Audio store port.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::domain::RequestKey;
use crate::errors::NarrationError;

/// Result of probing the store for a fragment.
///
/// A miss is not an error: `path` is where the entry would live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLookup {
    /// Location of the entry.
    pub path: PathBuf,
    /// Whether a complete entry exists there.
    pub found: bool,
}

impl CacheLookup {
    /// The path, if the entry exists.
    pub fn into_hit(self) -> Option<PathBuf> {
        self.found.then_some(self.path)
    }
}

/// Port for persisting synthesized audio.
///
/// Implemented by `FragmentCache` in `lector-cache`. The queue writes through
/// it after a successful synthesis and the narration service reads from it
/// before queueing.
#[async_trait]
pub trait AudioStorePort: Send + Sync {
    /// Probe for an entry. Never fails.
    async fn lookup(&self, key: &RequestKey) -> CacheLookup;

    /// Persist audio bytes, returning the final path.
    async fn store(&self, key: &RequestKey, bytes: &[u8]) -> Result<PathBuf, NarrationError>;

    /// Remove one entry. Best-effort.
    async fn remove(&self, key: &RequestKey);

    /// Remove every entry of a book. Best-effort.
    async fn clear_book(&self, book_id: &str);

    /// Bytes used by one book.
    async fn size_of(&self, book_id: &str) -> u64;

    /// Bytes used by the whole store.
    async fn total_size(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_hit_only_returns_found_paths() {
        let hit = CacheLookup {
            path: PathBuf::from("/cache/book/abc.mp3"),
            found: true,
        };
        assert_eq!(hit.into_hit(), Some(PathBuf::from("/cache/book/abc.mp3")));

        let miss = CacheLookup {
            path: PathBuf::from("/cache/book/def.mp3"),
            found: false,
        };
        assert_eq!(miss.into_hit(), None);
    }
}
