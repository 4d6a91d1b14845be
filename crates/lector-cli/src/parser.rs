//! Main CLI parser and top-level argument handling.
//!
//! This module defines the root CLI structure with global options.

use std::path::PathBuf;

use clap::Parser;

use crate::commands::Commands;

/// Command-line interface for narrating plain-text books.
///
/// This is the top-level parser that handles global options and dispatches
/// to subcommands.
#[derive(Parser)]
#[command(name = "lector")]
#[command(about = "Narrate text with cached speech synthesis")]
#[command(version)]
pub struct Cli {
    /// Settings file (JSON)
    #[arg(long = "config", env = "LECTOR_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Override the audio cache directory for this invocation
    #[arg(long = "cache-dir", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CacheCommand;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_args() {
        let cli = Cli::parse_from([
            "lector",
            "--verbose",
            "--cache-dir",
            "/tmp/lector",
            "cache",
            "stats",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/lector")));
        assert!(matches!(
            cli.command,
            Some(Commands::Cache {
                command: CacheCommand::Stats { book: None }
            })
        ));
    }

    #[test]
    fn test_narrate_args() {
        let cli = Cli::parse_from([
            "lector",
            "narrate",
            "emma.txt",
            "--page",
            "2",
            "--tts-url",
            "http://localhost:5002/tts",
            "--player-arg",
            "-q",
        ]);
        let Some(Commands::Narrate(args)) = cli.command else {
            panic!("expected narrate");
        };
        assert_eq!(args.book.file, PathBuf::from("emma.txt"));
        assert_eq!(args.book.page, 2);
        assert_eq!(args.tts.tts_url, "http://localhost:5002/tts");
        assert_eq!(args.player_args, ["-q"]);
    }
}
