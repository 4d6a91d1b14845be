//! On-disk layout of the audio cache.
//!
//! `<root>/<sanitised book id>/<sha256(fragment id)>.<ext>`. Temporary
//! files live next to their final path with a `.tmp-` suffix.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

/// Marker that identifies an in-progress write.
pub const TEMP_MARKER: &str = ".tmp-";

/// Directory name for a book id.
///
/// Anything outside `[A-Za-z0-9._-]` becomes `_` so that ids can never
/// escape the cache root.
pub fn book_dir_name(book_id: &str) -> String {
    let sanitized: String = book_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        format!("_{sanitized}")
    } else {
        sanitized
    }
}

/// File name for a fragment id: hex sha256 plus extension.
pub fn entry_file_name(fragment_id: &str, extension: &str) -> String {
    let digest = Sha256::digest(fragment_id.as_bytes());
    format!("{digest:x}.{extension}")
}

/// Directory holding one book's entries.
pub fn book_dir(root: &Path, book_id: &str) -> PathBuf {
    root.join(book_dir_name(book_id))
}

/// Final path of one entry.
pub fn entry_path(root: &Path, book_id: &str, fragment_id: &str, extension: &str) -> PathBuf {
    book_dir(root, book_id).join(entry_file_name(fragment_id, extension))
}

/// A unique sibling path for writing `path` before it is renamed into place.
pub fn unique_temp_path(path: &Path) -> PathBuf {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let nonce = SEQ.fetch_add(1, Ordering::Relaxed);
    let ts_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    let mut temp_name = path
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("entry")
        .to_string();
    temp_name.push_str(&format!("{TEMP_MARKER}{ts_nanos}-{nonce}"));
    path.with_file_name(temp_name)
}

/// Whether a file name belongs to an unfinished write.
pub fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|f| f.to_str())
        .is_some_and(|name| name.contains(TEMP_MARKER))
}
