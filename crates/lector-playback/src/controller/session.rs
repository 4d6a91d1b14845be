//! Mutable state of one narration session.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use lector_core::{FragmentCursor, NarrationState, PlaybackIncident};

use crate::prefetch::Prefetcher;

/// Incidents kept per session. Older ones are dropped first.
pub const MAX_INCIDENTS: usize = 50;

/// Bounded log of swallowed errors.
#[derive(Debug, Default)]
pub struct IncidentLog {
    entries: VecDeque<PlaybackIncident>,
}

impl IncidentLog {
    pub fn push(&mut self, incident: PlaybackIncident) {
        if self.entries.len() == MAX_INCIDENTS {
            self.entries.pop_front();
        }
        self.entries.push_back(incident);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn to_vec(&self) -> Vec<PlaybackIncident> {
        self.entries.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Everything a transition reads or writes. Guarded by the controller's
/// session lock.
pub struct Session {
    pub state: NarrationState,
    pub cursor: FragmentCursor,
    /// Resolved audio per fragment id on the current and nearby pages.
    pub paths: HashMap<String, PathBuf>,
    /// Fragments skipped in a row.
    pub consecutive_failures: u32,
    pub incidents: IncidentLog,
    pub prefetch: Prefetcher,
}

impl Session {
    pub fn new(cursor: FragmentCursor, prefetch: Prefetcher) -> Self {
        Self {
            state: NarrationState::Stopped,
            cursor,
            paths: HashMap::new(),
            consecutive_failures: 0,
            incidents: IncidentLog::default(),
            prefetch,
        }
    }

    pub fn current_fragment_id(&self) -> Option<String> {
        self.cursor.current().map(|fragment| fragment.id.clone())
    }
}
