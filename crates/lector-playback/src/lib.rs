//! Playback controller for lector.
//!
//! A [`PlaybackController`] narrates one book: it walks a cursor over the
//! fragments of the current page, asks an
//! [`AudioProviderPort`](lector_core::AudioProviderPort) for audio, drives an
//! [`AudioSinkPort`](lector_core::AudioSinkPort), and keeps a window of
//! neighbouring fragments warm so the next one starts without a gap.
//!
//! ```text
//!   Stopped → Loading → Playing ⇄ Paused
//!      ▲         │         │
//!      └─────────┴─────────┘  (stop, terminal failure, sink error)
//! ```

mod controller;
mod prefetch;

pub use controller::{MAX_INCIDENTS, PlaybackController, PlaybackDeps};
