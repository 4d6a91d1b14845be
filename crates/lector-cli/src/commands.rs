//! Subcommand definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Top-level commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Narrate a text file; controls are read from stdin
    Narrate(NarrateArgs),
    /// Synthesize and cache pages ahead of time
    Prefetch(PrefetchArgs),
    /// Inspect or clear the audio cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Speech synthesis endpoint options.
#[derive(Args, Debug, Clone)]
pub struct TtsArgs {
    /// Synthesis endpoint; receives `{"text", "voice", "rate"}` as JSON and
    /// answers with audio bytes
    #[arg(long = "tts-url", env = "LECTOR_TTS_URL")]
    pub tts_url: String,

    /// Bearer token for the synthesis endpoint
    #[arg(long = "tts-key", env = "LECTOR_TTS_KEY", hide_env_values = true)]
    pub tts_key: Option<String>,

    /// Voice identifier passed through to the endpoint
    #[arg(long)]
    pub voice: Option<String>,

    /// Speaking rate multiplier passed through to the endpoint
    #[arg(long)]
    pub rate: Option<f32>,
}

/// How a text file is split into pages.
#[derive(Args, Debug, Clone)]
pub struct BookArgs {
    /// Plain-text file; blank lines separate paragraphs, form feeds separate
    /// pages
    pub file: PathBuf,

    /// Page to start on (0-based)
    #[arg(long, default_value_t = 0)]
    pub page: usize,

    /// Paragraphs per page when the file has no form feeds
    #[arg(long = "paragraphs-per-page", default_value_t = 5)]
    pub paragraphs_per_page: usize,
}

/// Arguments for `lector narrate`.
#[derive(Args, Debug, Clone)]
pub struct NarrateArgs {
    #[command(flatten)]
    pub book: BookArgs,

    /// Start from this fragment (e.g. `p12`) instead of the top of the page
    #[arg(long)]
    pub from: Option<String>,

    #[command(flatten)]
    pub tts: TtsArgs,

    /// Audio player program; the file path is appended to its arguments
    #[arg(long, env = "LECTOR_PLAYER", default_value = "mpg123")]
    pub player: String,

    /// Extra argument for the player (repeatable)
    #[arg(long = "player-arg", allow_hyphen_values = true)]
    pub player_args: Vec<String>,
}

/// Arguments for `lector prefetch`.
#[derive(Args, Debug, Clone)]
pub struct PrefetchArgs {
    #[command(flatten)]
    pub book: BookArgs,

    /// Number of pages to synthesize
    #[arg(long, default_value_t = 1)]
    pub pages: usize,

    #[command(flatten)]
    pub tts: TtsArgs,
}

/// Cache management commands.
#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Show bytes used by the cache or one book
    Stats {
        /// Book id (defaults to every book)
        #[arg(long)]
        book: Option<String>,
    },
    /// Delete every cached fragment of one book
    Clear {
        /// Book id, as printed by `narrate` and `prefetch`
        book: String,
    },
}

/// Configuration commands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show effective settings and the resolved cache directory
    Show,
}
