//! Reference adapters for the narration ports.
//!
//! - [`HttpSynthesizer`]: JSON-over-HTTP speech endpoint
//! - [`ProcessAudioSink`]: external command-line player
//! - [`TextBook`] / [`TerminalHighlighter`]: plain-text pages on a terminal

mod http_synth;
mod process_sink;
mod text_book;

pub use http_synth::HttpSynthesizer;
pub use process_sink::ProcessAudioSink;
pub use text_book::{TerminalHighlighter, TextBook};
