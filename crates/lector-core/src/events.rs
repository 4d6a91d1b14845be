//! Narration events - discriminated union for everything a UI may observe.

use serde::{Deserialize, Serialize};

use crate::domain::{Direction, NarrationState};

/// Single discriminated union for all narration events.
///
/// Serialized with an internal `type` tag so a front end can switch on it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NarrationEvent {
    /// The session changed state.
    StateChanged {
        /// Book being narrated.
        book_id: String,
        /// New state.
        state: NarrationState,
    },

    /// A fragment started playing.
    FragmentStarted {
        /// Book being narrated.
        book_id: String,
        /// Fragment now playing.
        fragment_id: String,
        /// Cursor index on the page.
        index: usize,
    },

    /// The session moved to another page.
    PageChanged {
        /// Book being narrated.
        book_id: String,
        /// Direction of travel.
        direction: Direction,
        /// Fragments on the new page.
        fragment_count: usize,
    },

    /// An error was recorded (and possibly recovered from).
    Error {
        /// Book being narrated.
        book_id: String,
        /// Fragment involved, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        fragment_id: Option<String>,
        /// Human-readable description.
        message: String,
    },
}

impl NarrationEvent {
    /// Create a state change event.
    pub fn state_changed(book_id: impl Into<String>, state: NarrationState) -> Self {
        Self::StateChanged {
            book_id: book_id.into(),
            state,
        }
    }

    /// Create an error event.
    pub fn error(
        book_id: impl Into<String>,
        fragment_id: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Error {
            book_id: book_id.into(),
            fragment_id,
            message: message.into(),
        }
    }

    /// Stable event name for logging.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "narration:state_changed",
            Self::FragmentStarted { .. } => "narration:fragment_started",
            Self::PageChanged { .. } => "narration:page_changed",
            Self::Error { .. } => "narration:error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_change_serializes_with_type_tag() {
        let event = NarrationEvent::state_changed("emma", NarrationState::Paused);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "state_changed");
        assert_eq!(json["book_id"], "emma");
        assert_eq!(json["state"], "paused");
        assert_eq!(event.event_name(), "narration:state_changed");
    }

    #[test]
    fn error_event_omits_missing_fragment() {
        let event = NarrationEvent::error("emma", None, "navigator unavailable");
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("fragment_id").is_none());
    }
}
