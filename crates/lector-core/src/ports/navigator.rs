//! Navigator and highlight ports.
//!
//! Both are implemented by the document layer. The navigator owns page
//! layout; the highlighter draws the active fragment. Neither is specified
//! beyond these signatures.

use async_trait::async_trait;

use crate::domain::{Direction, Fragment};
use crate::errors::NarrationError;

/// Port for moving through a paginated document.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait NavigatorPort: Send + Sync {
    /// Fragments of the page currently shown.
    fn fragments_for_current_page(&self) -> Vec<Fragment>;

    /// Turn the page. Resolves once the new page's fragments are available.
    async fn advance_page(&self, direction: Direction) -> Result<(), NarrationError>;

    /// Fragments of the neighbouring page without turning to it.
    ///
    /// Used for cross-page prefetch. Navigators that cannot look ahead
    /// return `None`.
    fn peek_page(&self, _direction: Direction) -> Option<Vec<Fragment>> {
        None
    }
}

/// Port for drawing the active fragment. Fire-and-forget.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
pub trait HighlightPort: Send + Sync {
    /// Mark a fragment as being read.
    fn highlight(&self, fragment_id: &str);

    /// Remove the mark from a fragment.
    fn unhighlight(&self, fragment_id: &str);

    /// Remove every mark.
    fn clear(&self);
}

/// Highlighter for sessions without a display.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHighlighter;

impl HighlightPort for NoopHighlighter {
    fn highlight(&self, _fragment_id: &str) {}

    fn unhighlight(&self, _fragment_id: &str) {}

    fn clear(&self) {}
}
