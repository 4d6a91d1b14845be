//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the narration core expects from
//! infrastructure. They contain no implementation details and use only
//! domain types.
//!
//! # Design Rules
//!
//! - No HTTP, process, or audio-device types in any signature
//! - Errors are domain errors (`NarrationError`, `SynthesisFailure`)
//! - Fire-and-forget side effects (highlight, events) return nothing

pub mod audio_provider;
pub mod audio_sink;
pub mod audio_store;
pub mod event_emitter;
pub mod navigator;
pub mod synthesizer;

pub use audio_provider::AudioProviderPort;
pub use audio_sink::{AudioSinkPort, SinkEvent};
pub use audio_store::{AudioStorePort, CacheLookup};
pub use event_emitter::{ChannelEmitter, NarrationEventEmitter, NoopEmitter};
pub use navigator::{HighlightPort, NavigatorPort, NoopHighlighter};
pub use synthesizer::SynthesizerPort;

#[cfg(any(test, feature = "test-utils"))]
pub use navigator::{MockHighlightPort, MockNavigatorPort};
