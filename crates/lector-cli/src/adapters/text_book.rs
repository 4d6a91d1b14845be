//! Plain-text document navigator.
//!
//! A form feed (`\x0c`) starts a new page. Without form feeds, paragraphs
//! (separated by blank lines) are grouped into pages of a fixed size. Each
//! paragraph becomes one fragment with id `p<n>`, numbered across the book.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use lector_core::{Direction, Fragment, HighlightPort, NarrationError, NavigatorPort};

use crate::error::CliError;

const PAGE_BREAK: char = '\x0c';

/// A book split into pages of fragments.
#[derive(Debug)]
pub struct TextBook {
    pages: Vec<Vec<Fragment>>,
    current: AtomicUsize,
}

impl TextBook {
    /// Split `text` into pages.
    pub fn parse(text: &str, paragraphs_per_page: usize) -> Self {
        let per_page = paragraphs_per_page.max(1);
        let mut pages = Vec::new();
        let mut next_id = 0usize;

        for section in text.split(PAGE_BREAK) {
            let paragraphs = paragraphs(section);
            if paragraphs.is_empty() {
                pages.push(Vec::new());
                continue;
            }
            for chunk in paragraphs.chunks(per_page) {
                let page = chunk
                    .iter()
                    .map(|paragraph| {
                        let fragment = Fragment::new(format!("p{next_id}"), paragraph.as_str());
                        next_id += 1;
                        fragment
                    })
                    .collect();
                pages.push(page);
            }
        }

        // A trailing form feed leaves no extra blank page
        if pages.len() > 1 && pages.last().is_some_and(Vec::is_empty) && text.ends_with(PAGE_BREAK) {
            pages.pop();
        }

        Self {
            pages,
            current: AtomicUsize::new(0),
        }
    }

    /// Read and split a UTF-8 text file.
    pub async fn open(path: &Path, paragraphs_per_page: usize) -> Result<Self, CliError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CliError::Io(format!("failed to read {}: {e}", path.display())))?;
        Ok(Self::parse(&text, paragraphs_per_page))
    }

    /// Start on `page`, clamped to the last page.
    #[must_use]
    pub fn with_page(self, page: usize) -> Self {
        let last = self.pages.len().saturating_sub(1);
        self.current.store(page.min(last), Ordering::SeqCst);
        self
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn current_page(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// Fragments of page `index`, if it exists.
    pub fn page(&self, index: usize) -> Option<&[Fragment]> {
        self.pages.get(index).map(Vec::as_slice)
    }

    /// Text of a fragment anywhere in the book.
    pub fn fragment_text(&self, fragment_id: &str) -> Option<&str> {
        self.pages
            .iter()
            .flatten()
            .find(|fragment| fragment.id == fragment_id)
            .map(|fragment| fragment.text.as_str())
    }

    fn neighbour(&self, direction: Direction) -> Option<usize> {
        let current = self.current_page();
        match direction {
            Direction::Forward => Some(current + 1).filter(|&next| next < self.pages.len()),
            Direction::Backward => current.checked_sub(1),
        }
    }
}

/// Non-empty paragraphs of a section, with internal line breaks folded.
fn paragraphs(section: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in section.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                out.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        out.push(current.join(" "));
    }
    out
}

#[async_trait]
impl NavigatorPort for TextBook {
    fn fragments_for_current_page(&self) -> Vec<Fragment> {
        self.page(self.current_page())
            .map(<[Fragment]>::to_vec)
            .unwrap_or_default()
    }

    async fn advance_page(&self, direction: Direction) -> Result<(), NarrationError> {
        let Some(target) = self.neighbour(direction) else {
            return Err(NarrationError::navigation(match direction {
                Direction::Forward => "end of book",
                Direction::Backward => "start of book",
            }));
        };
        self.current.store(target, Ordering::SeqCst);
        tracing::debug!(target: "lector.cli", page = target, "Page turned");
        Ok(())
    }

    fn peek_page(&self, direction: Direction) -> Option<Vec<Fragment>> {
        self.neighbour(direction)
            .and_then(|index| self.page(index))
            .map(<[Fragment]>::to_vec)
    }
}

/// Highlighter that prints each fragment as it starts.
#[derive(Debug, Clone)]
pub struct TerminalHighlighter {
    book: Arc<TextBook>,
}

impl TerminalHighlighter {
    pub const fn new(book: Arc<TextBook>) -> Self {
        Self { book }
    }
}

impl HighlightPort for TerminalHighlighter {
    fn highlight(&self, fragment_id: &str) {
        if let Some(text) = self.book.fragment_text(fragment_id) {
            println!("\n[{fragment_id}] {text}");
        }
    }

    fn unhighlight(&self, _fragment_id: &str) {}

    fn clear(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BOOK: &str = "First paragraph\nwraps here.\n\nSecond.\n\n\nThird.\n\x0cFourth.\n\x0c\x0cFifth.";

    #[test]
    fn test_paragraphs_fold_lines_and_number_across_pages() {
        let book = TextBook::parse(BOOK, 2);

        // [p0 p1] [p2] | [p3] | [] | [p4]
        assert_eq!(book.page_count(), 5);
        let first = book.page(0).unwrap();
        assert_eq!(first[0], Fragment::new("p0", "First paragraph wraps here."));
        assert_eq!(first[1].id, "p1");
        assert_eq!(book.page(1).unwrap()[0].id, "p2");
        assert_eq!(book.page(2).unwrap()[0].text, "Fourth.");
        assert!(book.page(3).unwrap().is_empty());
        assert_eq!(book.page(4).unwrap()[0].id, "p4");
        assert_eq!(book.fragment_text("p4"), Some("Fifth."));
    }

    #[test]
    fn test_trailing_page_break_is_ignored() {
        let book = TextBook::parse("One.\x0cTwo.\x0c", 5);
        assert_eq!(book.page_count(), 2);
    }

    #[test]
    fn test_start_page_is_clamped() {
        let book = TextBook::parse(BOOK, 2).with_page(99);
        assert_eq!(book.current_page(), 4);
    }

    #[tokio::test]
    async fn test_navigation_and_peek() {
        let book = TextBook::parse(BOOK, 2);

        assert!(book.peek_page(Direction::Backward).is_none());
        assert_eq!(book.peek_page(Direction::Forward).unwrap()[0].id, "p2");
        assert!(book.advance_page(Direction::Backward).await.is_err());

        book.advance_page(Direction::Forward).await.unwrap();
        assert_eq!(book.fragments_for_current_page()[0].id, "p2");
        assert_eq!(book.peek_page(Direction::Backward).unwrap().len(), 2);

        let book = book.with_page(4);
        let err = book.advance_page(Direction::Forward).await.unwrap_err();
        assert_eq!(err, NarrationError::navigation("end of book"));
        assert_eq!(book.current_page(), 4);
    }

    #[tokio::test]
    async fn test_open_reads_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "Hello.\n\nWorld.").unwrap();

        let book = TextBook::open(file.path(), 1).await.unwrap();
        assert_eq!(book.page_count(), 2);

        let missing = TextBook::open(Path::new("/nonexistent/book.txt"), 1).await;
        assert!(matches!(missing, Err(CliError::Io(_))));
    }
}
