//! Prefetch window planning and background warm-up.
//!
//! Planning is pure: given the cursor (and optionally the next page), decide
//! which fragments to warm. [`Prefetcher`] then fires those requests in the
//! background under a per-page cancellation token.

use std::sync::Arc;

use futures_util::future::join_all;
use lector_core::{
    AudioProviderPort, AudioRequest, Direction, Fragment, FragmentCursor, Priority, RequestKey,
};
use tokio_util::sync::CancellationToken;

/// Whether a window of `ahead` fragments runs past the end of the page.
pub fn runs_past_page(cursor: &FragmentCursor, ahead: usize) -> bool {
    cursor.ahead(ahead).len() < ahead
}

/// Fragments to warm around the cursor, nearest first.
///
/// Ahead of the cursor comes first; if the page ends early the remainder is
/// taken from the start of `next_page`. Behind the cursor follows, nearest
/// first. Unspeakable fragments count towards the window but are not
/// returned.
pub fn window(
    cursor: &FragmentCursor,
    next_page: Option<&[Fragment]>,
    ahead: usize,
    behind: usize,
) -> Vec<Fragment> {
    let on_page = cursor.ahead(ahead);
    let remainder = ahead - on_page.len();
    let spill = next_page.map_or(&[][..], |page| &page[..remainder.min(page.len())]);

    on_page
        .iter()
        .chain(spill)
        .chain(cursor.behind(behind).iter().rev())
        .filter(|fragment| fragment.is_speakable())
        .cloned()
        .collect()
}

/// The first (forward) or last (backward) `count` speakable fragments of a
/// page just entered.
pub fn page_edge(fragments: &[Fragment], direction: Direction, count: usize) -> Vec<Fragment> {
    let speakable = fragments.iter().filter(|fragment| fragment.is_speakable());
    match direction {
        Direction::Forward => speakable.take(count).cloned().collect(),
        Direction::Backward => {
            let mut edge: Vec<Fragment> = speakable.rev().take(count).cloned().collect();
            edge.reverse();
            edge
        }
    }
}

/// Fires prefetch requests for one book.
///
/// Requests spawned since the last [`reset`](Self::reset) share a token; a
/// page change resets it so stale work stops waiting.
pub struct Prefetcher {
    provider: Arc<dyn AudioProviderPort>,
    book_id: String,
    parent: CancellationToken,
    token: CancellationToken,
}

impl Prefetcher {
    pub fn new(
        provider: Arc<dyn AudioProviderPort>,
        book_id: String,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            provider,
            book_id,
            parent: parent.clone(),
            token: parent.child_token(),
        }
    }

    /// Warm `fragments` at `priority`. Failures are logged and dropped.
    pub fn spawn(&self, fragments: Vec<Fragment>, priority: Priority) {
        if fragments.is_empty() {
            return;
        }

        tracing::trace!(
            target: "lector.playback",
            book_id = %self.book_id,
            count = fragments.len(),
            priority,
            "Prefetching"
        );

        let provider = Arc::clone(&self.provider);
        let book_id = self.book_id.clone();
        let token = self.token.clone();

        tokio::spawn(async move {
            let requests = fragments.into_iter().map(|fragment| {
                let provider = Arc::clone(&provider);
                let key = RequestKey::new(book_id.as_str(), fragment.id);
                let request = AudioRequest::new(key.clone(), fragment.text, priority);
                async move {
                    if let Err(e) = provider.request(request).await {
                        if !e.is_cancelled() {
                            tracing::debug!(
                                target: "lector.playback",
                                key = %key,
                                error = %e,
                                "Prefetch failed"
                            );
                        }
                    }
                }
            });

            tokio::select! {
                () = token.cancelled() => {}
                _ = join_all(requests) => {}
            }
        });
    }

    /// Abandon outstanding prefetches and start a fresh generation.
    pub fn reset(&mut self) {
        self.token.cancel();
        self.token = self.parent.child_token();
    }

    /// Abandon outstanding prefetches.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(prefix: &str, n: usize) -> Vec<Fragment> {
        (0..n)
            .map(|i| Fragment::new(format!("{prefix}{i}"), format!("Sentence {i}.")))
            .collect()
    }

    fn ids(fragments: &[Fragment]) -> Vec<&str> {
        fragments.iter().map(|f| f.id.as_str()).collect()
    }

    #[test]
    fn window_takes_ahead_then_behind_nearest_first() {
        let mut cursor = FragmentCursor::at_start(page("p", 10));
        cursor.set_index(4);

        let planned = window(&cursor, None, 4, 3);
        assert_eq!(ids(&planned), ["p5", "p6", "p7", "p8", "p3", "p2", "p1"]);
    }

    #[test]
    fn window_spills_onto_next_page() {
        let cursor = FragmentCursor::at_start(page("a", 3));
        let next = page("b", 5);

        assert!(runs_past_page(&cursor, 4));
        let planned = window(&cursor, Some(&next), 4, 3);
        assert_eq!(ids(&planned), ["a1", "a2", "b0", "b1"]);
    }

    #[test]
    fn window_without_next_page_stops_at_page_end() {
        let mut cursor = FragmentCursor::at_start(page("a", 3));
        cursor.set_index(2);

        let planned = window(&cursor, None, 4, 1);
        assert_eq!(ids(&planned), ["a1"]);
    }

    #[test]
    fn window_skips_unspeakable_fragments() {
        let fragments = vec![
            Fragment::new("p0", "One."),
            Fragment::new("p1", "   "),
            Fragment::new("p2", "Three."),
        ];
        let cursor = FragmentCursor::at_start(fragments);

        let planned = window(&cursor, None, 2, 0);
        assert_eq!(ids(&planned), ["p2"]);
    }

    #[test]
    fn page_edge_follows_direction() {
        let fragments = page("p", 6);
        assert_eq!(
            ids(&page_edge(&fragments, Direction::Forward, 3)),
            ["p0", "p1", "p2"]
        );
        assert_eq!(
            ids(&page_edge(&fragments, Direction::Backward, 3)),
            ["p3", "p4", "p5"]
        );
        assert!(page_edge(&[], Direction::Forward, 3).is_empty());
    }
}
