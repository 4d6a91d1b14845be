//! Fragments and the keys that identify them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A narratable unit of text supplied by the document layer.
///
/// `id` is opaque and stable for a given book version. The core never
/// rewrites `text`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fragment {
    /// Stable, book-scoped identifier.
    pub id: String,
    /// The text to narrate.
    pub text: String,
}

impl Fragment {
    /// Create a new fragment.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }

    /// Whether the fragment has anything to say.
    ///
    /// Empty and whitespace-only fragments are skipped by playback.
    pub fn is_speakable(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Identity of a synthesis request: one book, one fragment.
///
/// This is both the dedup key for in-flight work and the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    /// Book the fragment belongs to.
    pub book_id: String,
    /// Fragment within the book.
    pub fragment_id: String,
}

impl RequestKey {
    /// Create a new request key.
    pub fn new(book_id: impl Into<String>, fragment_id: impl Into<String>) -> Self {
        Self {
            book_id: book_id.into(),
            fragment_id: fragment_id.into(),
        }
    }

    /// Whether this key belongs to the given book.
    pub fn is_for_book(&self, book_id: &str) -> bool {
        self.book_id == book_id
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.book_id, self.fragment_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_fragment_is_not_speakable() {
        assert!(!Fragment::new("p1", "  \n\t ").is_speakable());
        assert!(!Fragment::new("p2", "").is_speakable());
        assert!(Fragment::new("p3", " Call me Ishmael. ").is_speakable());
    }

    #[test]
    fn request_key_display_joins_book_and_fragment() {
        let key = RequestKey::new("moby-dick", "ch1-p3");
        assert_eq!(key.to_string(), "moby-dick:ch1-p3");
        assert!(key.is_for_book("moby-dick"));
        assert!(!key.is_for_book("emma"));
    }
}
