//! Cache command handlers.

use anyhow::Result;

use crate::bootstrap::CliContext;
use crate::commands::CacheCommand;
use crate::handlers::format_bytes;

/// Execute a cache subcommand.
pub async fn execute(ctx: &CliContext, command: &CacheCommand) -> Result<()> {
    match command {
        CacheCommand::Stats { book } => stats(ctx, book.as_deref()).await,
        CacheCommand::Clear { book } => clear(ctx, book).await,
    }
}

async fn stats(ctx: &CliContext, book: Option<&str>) -> Result<()> {
    println!("Cache directory: {}", ctx.cache.root().display());
    match book {
        Some(book) => {
            let bytes = ctx.cache.size_of(book).await;
            println!("{book}: {}", format_bytes(bytes));
        }
        None => {
            let bytes = ctx.cache.total_size().await;
            let limit = ctx.cache.config().max_size_bytes;
            println!("Total: {} of {}", format_bytes(bytes), format_bytes(limit));
        }
    }
    Ok(())
}

async fn clear(ctx: &CliContext, book: &str) -> Result<()> {
    let before = ctx.cache.size_of(book).await;
    ctx.cache.clear(book).await;
    println!("Cleared {} of cached audio for '{book}'", format_bytes(before));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clear_removes_book_audio() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = CliContext::load(None, Some(dir.path())).unwrap();
        ctx.cache.store("emma", "p0", b"audio").await.unwrap();
        assert_eq!(ctx.cache.size_of("emma").await, 5);

        execute(&ctx, &CacheCommand::Clear { book: "emma".into() })
            .await
            .unwrap();
        assert_eq!(ctx.cache.size_of("emma").await, 0);

        execute(&ctx, &CacheCommand::Stats { book: None }).await.unwrap();
    }
}
