//! Core domain types and port definitions for lector.
//!
//! This crate contains no I/O of its own. It defines what the narration
//! engine talks about (fragments, requests, playback state), how it fails
//! ([`NarrationError`]), and the traits infrastructure must implement
//! ([`ports`]). The cache, queue, service and playback crates build on it.
#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod errors;
pub mod events;
pub mod paths;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{
    AudioRequest, CursorTarget, Direction, Fragment, FragmentCursor, NarrationSnapshot,
    NarrationState, PlaybackIncident, Priority, QueueSnapshot, RequestKey, SynthesisOptions,
    SynthesisRequest,
};
pub use errors::{NarrationError, SinkErrorCode, SynthesisFailure};
pub use events::NarrationEvent;
pub use ports::{
    AudioProviderPort, AudioSinkPort, AudioStorePort, CacheLookup, ChannelEmitter, HighlightPort,
    NarrationEventEmitter, NavigatorPort, NoopEmitter, NoopHighlighter, SinkEvent,
    SynthesizerPort,
};
pub use settings::{
    CacheConfig, NarrationSettings, PlaybackConfig, QueueConfig, SettingsError, validate_settings,
};

pub use paths::{
    CACHE_DIR_ENV, CacheRootResolution, CacheRootSource, default_cache_root, resolve_cache_root,
};

// Silence unused dev-dependency warnings for crates only used by some test modules
#[cfg(test)]
use tokio_test as _;
