//! Domain types for narration.
//!
//! - `fragment`: fragments and request keys
//! - `request`: synthesis requests and options
//! - `playback`: session state, cursor and snapshots

mod fragment;
mod playback;
mod request;

pub use fragment::{Fragment, RequestKey};
pub use playback::{
    CursorTarget, Direction, FragmentCursor, NarrationSnapshot, NarrationState, PlaybackIncident,
};
pub use request::{AudioRequest, Priority, QueueSnapshot, SynthesisOptions, SynthesisRequest};
