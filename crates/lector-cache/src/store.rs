//! `FragmentCache` - disk-backed `AudioStorePort`.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lector_core::{AudioStorePort, CacheConfig, CacheLookup, NarrationError, RequestKey};
use tokio::sync::Mutex;

use crate::eviction;
use crate::layout;

/// Disk-backed audio cache.
///
/// Entries are written to a unique temporary file and renamed into place,
/// so the presence of a final path implies a complete write. Stores are
/// serialised so that concurrent evictions never double-count.
pub struct FragmentCache {
    config: CacheConfig,
    write_lock: Mutex<()>,
}

impl FragmentCache {
    /// Create a cache. The root directory is created lazily on first store.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            write_lock: Mutex::new(()),
        }
    }

    /// Cache root directory.
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Active configuration.
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Path where an entry lives (or would live).
    pub fn path_for(&self, book_id: &str, fragment_id: &str) -> PathBuf {
        layout::entry_path(
            &self.config.root,
            book_id,
            fragment_id,
            &self.config.extension,
        )
    }

    /// Probe for an entry. A zero-length file counts as missing.
    pub async fn lookup(&self, book_id: &str, fragment_id: &str) -> CacheLookup {
        let path = self.path_for(book_id, fragment_id);
        let found = tokio::fs::metadata(&path)
            .await
            .is_ok_and(|m| m.is_file() && m.len() > 0);
        CacheLookup { path, found }
    }

    /// Write audio bytes for an entry, evicting old entries first if the
    /// cache is over its threshold.
    pub async fn store(
        &self,
        book_id: &str,
        fragment_id: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, NarrationError> {
        let path = self.path_for(book_id, fragment_id);
        if bytes.is_empty() {
            return Err(NarrationError::cache_write(
                path.display().to_string(),
                "refusing to cache empty audio",
            ));
        }

        let _guard = self.write_lock.lock().await;

        self.evict_if_needed(&path).await;

        let dir = layout::book_dir(&self.config.root, book_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| write_error(&dir, &e))?;

        let temp = layout::unique_temp_path(&path);
        if let Err(e) = tokio::fs::write(&temp, bytes).await {
            discard(&temp).await;
            return Err(write_error(&temp, &e));
        }

        let written = tokio::fs::metadata(&temp).await.map_or(0, |m| m.len());
        if written == 0 {
            discard(&temp).await;
            return Err(NarrationError::cache_write(
                path.display().to_string(),
                "written file is empty",
            ));
        }

        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            discard(&temp).await;
            return Err(write_error(&path, &e));
        }

        tracing::debug!(
            target: "lector.cache",
            book_id,
            fragment_id,
            bytes = written,
            path = %path.display(),
            "Cached audio"
        );
        Ok(path)
    }

    /// Remove one entry. Best-effort.
    pub async fn remove(&self, book_id: &str, fragment_id: &str) {
        let path = self.path_for(book_id, fragment_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(target: "lector.cache", book_id, fragment_id, "Removed cached audio");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    target: "lector.cache",
                    book_id,
                    fragment_id,
                    error = %e,
                    "Failed to remove cached audio"
                );
            }
        }
    }

    /// Remove every entry of a book. Best-effort.
    pub async fn clear(&self, book_id: &str) {
        let dir = layout::book_dir(&self.config.root, book_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::info!(target: "lector.cache", book_id, "Cleared book cache");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    target: "lector.cache",
                    book_id,
                    error = %e,
                    "Failed to clear book cache"
                );
            }
        }
    }

    /// Bytes used by one book.
    pub async fn size_of(&self, book_id: &str) -> u64 {
        eviction::dir_size(&layout::book_dir(&self.config.root, book_id)).await
    }

    /// Bytes used by the whole cache.
    pub async fn total_size(&self) -> u64 {
        eviction::scan_root(&self.config.root).await.total_len()
    }

    async fn evict_if_needed(&self, protect: &Path) {
        let threshold = self.config.eviction_threshold_bytes();
        let scan = eviction::scan_root(&self.config.root).await;
        let total = scan.total_len();
        if total <= threshold {
            return;
        }

        let report = eviction::evict_oldest(scan, threshold, protect).await;
        tracing::info!(
            target: "lector.cache",
            before = total,
            after = report.remaining_bytes,
            removed = report.removed_entries,
            strays = report.removed_strays,
            "Evicted cached audio"
        );
    }
}

fn write_error(path: &Path, err: &io::Error) -> NarrationError {
    NarrationError::cache_write(path.display().to_string(), err.to_string())
}

async fn discard(temp: &Path) {
    let _ = tokio::fs::remove_file(temp).await;
}

#[async_trait]
impl AudioStorePort for FragmentCache {
    async fn lookup(&self, key: &RequestKey) -> CacheLookup {
        Self::lookup(self, &key.book_id, &key.fragment_id).await
    }

    async fn store(&self, key: &RequestKey, bytes: &[u8]) -> Result<PathBuf, NarrationError> {
        Self::store(self, &key.book_id, &key.fragment_id, bytes).await
    }

    async fn remove(&self, key: &RequestKey) {
        Self::remove(self, &key.book_id, &key.fragment_id).await;
    }

    async fn clear_book(&self, book_id: &str) {
        self.clear(book_id).await;
    }

    async fn size_of(&self, book_id: &str) -> u64 {
        Self::size_of(self, book_id).await
    }

    async fn total_size(&self) -> u64 {
        Self::total_size(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    fn cache_in(dir: &Path) -> FragmentCache {
        FragmentCache::new(CacheConfig::new(dir.to_path_buf()))
    }

    fn age(path: &Path, secs: u64) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(secs))
            .unwrap();
    }

    #[tokio::test]
    async fn test_store_then_lookup_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());

        let miss = cache.lookup("book", "p1").await;
        assert!(!miss.found);

        let path = cache.store("book", "p1", b"ID3 audio").await.unwrap();
        let hit = cache.lookup("book", "p1").await;
        assert!(hit.found);
        assert_eq!(hit.path, path);
        assert_eq!(std::fs::read(&path).unwrap(), b"ID3 audio");
        assert!(path.starts_with(dir.path().join("book")));
        assert_eq!(path.extension().unwrap(), "mp3");
    }

    #[tokio::test]
    async fn test_zero_length_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());

        let path = cache.path_for("book", "p1");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"").unwrap();

        assert!(!cache.lookup("book", "p1").await.found);
    }

    #[tokio::test]
    async fn test_empty_bytes_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());

        let err = cache.store("book", "p1", b"").await.unwrap_err();
        assert!(matches!(err, NarrationError::CacheWrite { .. }));
        assert!(!cache.lookup("book", "p1").await.found);
    }

    #[tokio::test]
    async fn test_store_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());
        cache.store("book", "p1", b"abc").await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path().join("book"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(!names[0].contains(".tmp-"));
    }

    #[tokio::test]
    async fn test_sizes_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());

        cache.store("a", "p1", &[1; 10]).await.unwrap();
        cache.store("a", "p2", &[1; 20]).await.unwrap();
        cache.store("b", "p1", &[1; 5]).await.unwrap();

        assert_eq!(cache.size_of("a").await, 30);
        assert_eq!(cache.size_of("b").await, 5);
        assert_eq!(cache.total_size().await, 35);

        cache.clear("a").await;
        assert_eq!(cache.size_of("a").await, 0);
        assert_eq!(cache.total_size().await, 5);

        // Clearing again is harmless
        cache.clear("a").await;
    }

    #[tokio::test]
    async fn test_remove_single_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());
        cache.store("book", "p1", b"abc").await.unwrap();
        cache.store("book", "p2", b"def").await.unwrap();

        cache.remove("book", "p1").await;
        cache.remove("book", "missing").await;

        assert!(!cache.lookup("book", "p1").await.found);
        assert!(cache.lookup("book", "p2").await.found);
    }

    #[tokio::test]
    async fn test_store_evicts_oldest_over_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig::new(dir.path().to_path_buf())
            .with_max_size_bytes(250)
            .with_cleanup_threshold(0.8);
        let cache = FragmentCache::new(config);

        let first = cache.store("book", "p1", &[1; 100]).await.unwrap();
        let second = cache.store("book", "p2", &[1; 100]).await.unwrap();
        age(&first, 300);
        age(&second, 200);
        // 200 <= 200, no eviction yet
        let third = cache.store("book", "p3", &[1; 100]).await.unwrap();
        assert!(first.exists());
        age(&third, 100);

        // 300 > 200 before this store: drop the oldest until at most 200
        let fourth = cache.store("other", "p1", &[1; 100]).await.unwrap();
        assert!(!first.exists());
        assert!(second.exists());
        assert!(third.exists());
        assert!(fourth.exists());
    }

    #[tokio::test]
    async fn test_overwrite_protects_entry_being_written() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig::new(dir.path().to_path_buf())
            .with_max_size_bytes(100)
            .with_cleanup_threshold(0.5);
        let cache = FragmentCache::new(config);

        let path = cache.store("book", "p1", &[1; 80]).await.unwrap();
        age(&path, 500);

        let again = cache.store("book", "p1", &[2; 80]).await.unwrap();
        assert_eq!(path, again);
        assert_eq!(std::fs::read(&again).unwrap(), vec![2; 80]);
    }

    #[tokio::test]
    async fn test_concurrent_stores_serialise() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(cache_in(dir.path()));

        let mut handles = Vec::new();
        for i in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache.store("book", &format!("p{i}"), &[1; 16]).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(cache.size_of("book").await, 8 * 16);
    }

    #[tokio::test]
    async fn test_port_delegates_to_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn AudioStorePort> = Arc::new(cache_in(dir.path()));
        let key = RequestKey::new("book", "p1");

        let path = store.store(&key, b"abc").await.unwrap();
        assert_eq!(store.lookup(&key).await.into_hit(), Some(path));
        assert_eq!(store.size_of("book").await, 3);

        store.remove(&key).await;
        assert!(!store.lookup(&key).await.found);
    }
}
