//! Playback session state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fragment::Fragment;

/// State of one narration session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrationState {
    /// Nothing is playing; the cursor rests on a fragment.
    #[default]
    Stopped,
    /// Audio for the current fragment is being fetched or loaded.
    Loading,
    /// The sink is playing the current fragment.
    Playing,
    /// The sink holds its position, waiting for `resume`.
    Paused,
}

impl NarrationState {
    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
        }
    }
}

/// Direction of travel through a book.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

/// Where a relative move lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorTarget {
    /// Still on the current page.
    Within(usize),
    /// Before the first fragment; the previous page is needed.
    BeforeStart,
    /// After the last fragment; the next page is needed.
    PastEnd,
}

/// Position of playback within the current page.
///
/// Replaced wholesale whenever the page changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentCursor {
    page_fragments: Vec<Fragment>,
    index: usize,
    direction: Direction,
}

impl FragmentCursor {
    /// Cursor at the first fragment of a page.
    pub fn at_start(page_fragments: Vec<Fragment>) -> Self {
        Self {
            page_fragments,
            index: 0,
            direction: Direction::Forward,
        }
    }

    /// Cursor at the last fragment of a page (used after moving backwards).
    pub fn at_end(page_fragments: Vec<Fragment>) -> Self {
        let index = page_fragments.len().saturating_sub(1);
        Self {
            page_fragments,
            index,
            direction: Direction::Backward,
        }
    }

    /// All fragments on the page.
    pub fn fragments(&self) -> &[Fragment] {
        &self.page_fragments
    }

    /// Current index.
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Direction of the last move.
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Number of fragments on the page.
    pub fn len(&self) -> usize {
        self.page_fragments.len()
    }

    /// Whether the page has no fragments (a non-text page).
    pub fn is_empty(&self) -> bool {
        self.page_fragments.is_empty()
    }

    /// The fragment under the cursor, if any.
    pub fn current(&self) -> Option<&Fragment> {
        self.page_fragments.get(self.index)
    }

    /// Move to an index on the current page. Out-of-range indices are clamped.
    pub fn set_index(&mut self, index: usize) {
        let last = self.page_fragments.len().saturating_sub(1);
        self.direction = if index < self.index {
            Direction::Backward
        } else {
            Direction::Forward
        };
        self.index = index.min(last);
    }

    /// Jump to an index and read forward from there, whichever way the
    /// jump went.
    pub fn seek(&mut self, index: usize) {
        self.set_index(index);
        self.direction = Direction::Forward;
    }

    /// Index of the fragment with the given id.
    pub fn position_of(&self, fragment_id: &str) -> Option<usize> {
        self.page_fragments.iter().position(|f| f.id == fragment_id)
    }

    /// Resolve a relative move of one step.
    pub fn target(&self, direction: Direction) -> CursorTarget {
        match direction {
            Direction::Forward => {
                if self.index + 1 < self.page_fragments.len() {
                    CursorTarget::Within(self.index + 1)
                } else {
                    CursorTarget::PastEnd
                }
            }
            Direction::Backward => {
                if self.index == 0 || self.page_fragments.is_empty() {
                    CursorTarget::BeforeStart
                } else {
                    CursorTarget::Within(self.index - 1)
                }
            }
        }
    }

    /// Up to `count` fragments after the cursor, nearest first.
    pub fn ahead(&self, count: usize) -> &[Fragment] {
        let start = (self.index + 1).min(self.page_fragments.len());
        let end = (start + count).min(self.page_fragments.len());
        &self.page_fragments[start..end]
    }

    /// Up to `count` fragments before the cursor, in page order.
    pub fn behind(&self, count: usize) -> &[Fragment] {
        let end = self.index.min(self.page_fragments.len());
        let start = end.saturating_sub(count);
        &self.page_fragments[start..end]
    }
}

/// One swallowed error, kept for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackIncident {
    /// Fragment being narrated when the error happened, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment_id: Option<String>,
    /// Human-readable description.
    pub message: String,
    /// When it was recorded.
    pub at: DateTime<Utc>,
}

impl PlaybackIncident {
    /// Record an incident now.
    pub fn new(fragment_id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            fragment_id,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

/// Read-only view of a narration session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrationSnapshot {
    /// Book being narrated.
    pub book_id: String,
    /// Current state.
    pub state: NarrationState,
    /// Cursor index on the current page.
    pub index: usize,
    /// Fragments on the current page.
    pub page_len: usize,
    /// Fragment under the cursor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment_id: Option<String>,
    /// Number of recorded incidents.
    pub error_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: usize) -> Vec<Fragment> {
        (0..n)
            .map(|i| Fragment::new(format!("p{i}"), format!("Sentence {i}.")))
            .collect()
    }

    #[test]
    fn target_crosses_page_edges() {
        let mut cursor = FragmentCursor::at_start(page(3));
        assert_eq!(cursor.target(Direction::Backward), CursorTarget::BeforeStart);
        assert_eq!(cursor.target(Direction::Forward), CursorTarget::Within(1));

        cursor.set_index(2);
        assert_eq!(cursor.target(Direction::Forward), CursorTarget::PastEnd);
        assert_eq!(cursor.target(Direction::Backward), CursorTarget::Within(1));
    }

    #[test]
    fn empty_page_has_no_targets_within() {
        let cursor = FragmentCursor::at_start(Vec::new());
        assert!(cursor.is_empty());
        assert!(cursor.current().is_none());
        assert_eq!(cursor.target(Direction::Forward), CursorTarget::PastEnd);
        assert_eq!(cursor.target(Direction::Backward), CursorTarget::BeforeStart);
    }

    #[test]
    fn at_end_points_at_last_fragment() {
        let cursor = FragmentCursor::at_end(page(4));
        assert_eq!(cursor.index(), 3);
        assert_eq!(cursor.direction(), Direction::Backward);
        assert_eq!(cursor.current().map(|f| f.id.as_str()), Some("p3"));
    }

    #[test]
    fn windows_are_clipped_to_the_page() {
        let mut cursor = FragmentCursor::at_start(page(6));
        cursor.set_index(4);

        let ahead: Vec<_> = cursor.ahead(4).iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ahead, vec!["p5"]);

        let behind: Vec<_> = cursor.behind(3).iter().map(|f| f.id.as_str()).collect();
        assert_eq!(behind, vec!["p1", "p2", "p3"]);
    }

    #[test]
    fn set_index_clamps_and_tracks_direction() {
        let mut cursor = FragmentCursor::at_start(page(3));
        cursor.set_index(10);
        assert_eq!(cursor.index(), 2);
        assert_eq!(cursor.direction(), Direction::Forward);
        cursor.set_index(0);
        assert_eq!(cursor.direction(), Direction::Backward);
    }

    #[test]
    fn seek_always_reads_forward() {
        let mut cursor = FragmentCursor::at_end(page(3));
        cursor.seek(0);
        assert_eq!(cursor.index(), 0);
        assert_eq!(cursor.direction(), Direction::Forward);
    }
}
