//! Size accounting and oldest-first eviction.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::layout::is_temp_file;

/// One file found while scanning the cache.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub len: u64,
    pub modified: SystemTime,
}

/// Everything under the cache root.
#[derive(Debug, Default)]
pub struct CacheScan {
    /// Complete entries.
    pub entries: Vec<ScannedFile>,
    /// Leftovers from interrupted writes.
    pub strays: Vec<ScannedFile>,
}

impl CacheScan {
    /// Bytes used by complete entries.
    pub fn total_len(&self) -> u64 {
        self.entries.iter().map(|e| e.len).sum()
    }
}

/// Bytes used by complete entries directly under `dir`.
pub async fn dir_size(dir: &Path) -> u64 {
    let mut files = Vec::new();
    if let Err(e) = scan_dir(dir, &mut files).await {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(
                target: "lector.cache",
                dir = %dir.display(),
                error = %e,
                "Failed to scan cache directory"
            );
        }
    }
    files
        .iter()
        .filter(|f| !is_temp_file(&f.path))
        .map(|f| f.len)
        .sum()
}

/// Scan every book directory under `root`.
pub async fn scan_root(root: &Path) -> CacheScan {
    let mut scan = CacheScan::default();

    let mut books = match tokio::fs::read_dir(root).await {
        Ok(books) => books,
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(
                    target: "lector.cache",
                    root = %root.display(),
                    error = %e,
                    "Failed to read cache root"
                );
            }
            return scan;
        }
    };

    let mut files = Vec::new();
    loop {
        match books.next_entry().await {
            Ok(Some(book)) => {
                let is_dir = book.file_type().await.is_ok_and(|t| t.is_dir());
                if is_dir {
                    if let Err(e) = scan_dir(&book.path(), &mut files).await {
                        tracing::warn!(
                            target: "lector.cache",
                            dir = %book.path().display(),
                            error = %e,
                            "Failed to scan book directory"
                        );
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(target: "lector.cache", error = %e, "Cache root listing interrupted");
                break;
            }
        }
    }

    for file in files {
        if is_temp_file(&file.path) {
            scan.strays.push(file);
        } else {
            scan.entries.push(file);
        }
    }
    scan
}

async fn scan_dir(dir: &Path, out: &mut Vec<ScannedFile>) -> io::Result<()> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        out.push(ScannedFile {
            path: entry.path(),
            len: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }
    Ok(())
}

/// Outcome of one eviction pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EvictionReport {
    pub removed_entries: usize,
    pub removed_strays: usize,
    pub freed_bytes: u64,
    pub remaining_bytes: u64,
}

/// Delete entries oldest-first until the cache is at or under `target`.
///
/// `protect` is never deleted. Stray temporary files older than the oldest
/// remaining entry are removed as well.
pub async fn evict_oldest(scan: CacheScan, target: u64, protect: &Path) -> EvictionReport {
    let CacheScan {
        mut entries,
        strays,
    } = scan;
    entries.sort_by_key(|e| e.modified);

    let mut report = EvictionReport {
        remaining_bytes: entries.iter().map(|e| e.len).sum(),
        ..EvictionReport::default()
    };

    let oldest = entries.first().map(|e| e.modified);
    for stray in strays {
        if oldest.is_none_or(|oldest| stray.modified < oldest) && remove(&stray.path).await {
            report.removed_strays += 1;
        }
    }

    for entry in entries {
        if report.remaining_bytes <= target {
            break;
        }
        if entry.path == protect {
            continue;
        }
        if remove(&entry.path).await {
            report.removed_entries += 1;
            report.freed_bytes += entry.len;
            report.remaining_bytes -= entry.len;
        }
    }

    report
}

async fn remove(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(
                target: "lector.cache",
                path = %path.display(),
                error = %e,
                "Failed to evict cache file"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn write_aged(dir: &Path, name: &str, len: usize, age_secs: u64) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, vec![7u8; len]).unwrap();
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
        path
    }

    #[tokio::test]
    async fn test_scan_separates_strays() {
        let root = tempfile::tempdir().unwrap();
        let book = root.path().join("book");
        std::fs::create_dir_all(&book).unwrap();
        write_aged(&book, "a.mp3", 10, 5);
        write_aged(&book, "b.mp3.tmp-1-0", 20, 5);

        let scan = scan_root(root.path()).await;
        assert_eq!(scan.entries.len(), 1);
        assert_eq!(scan.strays.len(), 1);
        assert_eq!(scan.total_len(), 10);
        assert_eq!(dir_size(&book).await, 10);
    }

    #[tokio::test]
    async fn test_evicts_oldest_first_until_under_target() {
        let root = tempfile::tempdir().unwrap();
        let book = root.path().join("book");
        std::fs::create_dir_all(&book).unwrap();
        let oldest = write_aged(&book, "old.mp3", 100, 300);
        let middle = write_aged(&book, "mid.mp3", 100, 200);
        let newest = write_aged(&book, "new.mp3", 100, 100);

        let scan = scan_root(root.path()).await;
        let report = evict_oldest(scan, 150, Path::new("/nonexistent")).await;

        assert_eq!(report.removed_entries, 2);
        assert_eq!(report.freed_bytes, 200);
        assert_eq!(report.remaining_bytes, 100);
        assert!(!oldest.exists());
        assert!(!middle.exists());
        assert!(newest.exists());
    }

    #[tokio::test]
    async fn test_protected_entry_survives() {
        let root = tempfile::tempdir().unwrap();
        let book = root.path().join("book");
        std::fs::create_dir_all(&book).unwrap();
        let oldest = write_aged(&book, "old.mp3", 100, 300);
        let newer = write_aged(&book, "new.mp3", 100, 100);

        let scan = scan_root(root.path()).await;
        let report = evict_oldest(scan, 100, &oldest).await;

        assert_eq!(report.removed_entries, 1);
        assert!(oldest.exists());
        assert!(!newer.exists());
    }

    #[tokio::test]
    async fn test_old_strays_are_removed() {
        let root = tempfile::tempdir().unwrap();
        let book = root.path().join("book");
        std::fs::create_dir_all(&book).unwrap();
        write_aged(&book, "entry.mp3", 10, 100);
        let old_stray = write_aged(&book, "x.mp3.tmp-1-0", 10, 500);
        let fresh_stray = write_aged(&book, "y.mp3.tmp-2-0", 10, 1);

        let scan = scan_root(root.path()).await;
        let report = evict_oldest(scan, 1_000, Path::new("/nonexistent")).await;

        assert_eq!(report.removed_strays, 1);
        assert_eq!(report.removed_entries, 0);
        assert!(!old_stray.exists());
        assert!(fresh_stray.exists());
    }
}
