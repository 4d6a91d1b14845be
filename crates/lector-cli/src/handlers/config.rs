//! Config command handlers.

use anyhow::{Context, Result};
use lector_core::CacheRootSource;

use crate::bootstrap::CliContext;
use crate::commands::ConfigCommand;

/// Execute a config subcommand.
pub fn execute(ctx: &CliContext, command: &ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => show(ctx),
    }
}

fn show(ctx: &CliContext) -> Result<()> {
    let json =
        serde_json::to_string_pretty(&ctx.settings).context("failed to serialize settings")?;
    println!("{json}");
    println!();
    println!(
        "cache_root = {} ({})",
        ctx.cache_root.path.display(),
        source_label(ctx.cache_root.source)
    );
    Ok(())
}

const fn source_label(source: CacheRootSource) -> &'static str {
    match source {
        CacheRootSource::Explicit => "explicit",
        CacheRootSource::EnvVar => "LECTOR_CACHE_DIR",
        CacheRootSource::Default => "platform default",
    }
}
