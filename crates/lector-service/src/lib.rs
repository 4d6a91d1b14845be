//! Narration service for lector.
//!
//! [`NarrationService`] is what playback talks to: it answers from the audio
//! cache when it can, otherwise queues synthesis, and makes sure concurrent
//! callers asking for the same fragment share one in-flight request.

mod service;

pub use service::NarrationService;
