//! CLI entry point.
//!
//! Parses arguments, initializes logging, builds the [`CliContext`] and
//! routes each command to its handler.

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use lector_cli::{Cli, CliContext, CliError, Commands, handlers};

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "lector=debug,info" } else { "info" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let ctx = CliContext::load(cli.config.as_deref(), cli.cache_dir.as_deref())?;

    match command {
        Commands::Narrate(args) => handlers::narrate::execute(&ctx, &args).await,
        Commands::Prefetch(args) => handlers::prefetch::execute(&ctx, &args).await,
        Commands::Cache { command } => handlers::cache::execute(&ctx, &command).await,
        Commands::Config { command } => handlers::config::execute(&ctx, &command),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            let code = err.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
            ExitCode::from(code)
        }
    }
}
