//! Command-line front end for lector.
//!
//! The binary in `main.rs` parses arguments and dispatches to [`handlers`].
//! [`bootstrap`] is the composition root that wires settings, the audio
//! cache and the narration service; [`adapters`] holds the reference
//! implementations of the ports that the library crates leave abstract.
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

// Used only by the binary
use dotenvy as _;
use tracing_subscriber as _;

pub mod adapters;
pub mod bootstrap;
pub mod commands;
pub mod error;
pub mod handlers;
pub mod parser;

pub use bootstrap::{CliContext, book_id_for};
pub use commands::{CacheCommand, Commands, ConfigCommand, NarrateArgs, PrefetchArgs, TtsArgs};
pub use error::CliError;
pub use parser::Cli;
