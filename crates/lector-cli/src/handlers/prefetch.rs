//! Prefetch command handler.
//!
//! Synthesizes whole pages into the cache without playing them.

use std::sync::Arc;

use anyhow::Result;
use futures_util::future::join_all;
use lector_core::{Fragment, Priority};

use crate::adapters::TextBook;
use crate::bootstrap::{CliContext, book_id_for};
use crate::commands::PrefetchArgs;
use crate::error::CliError;

/// Execute the prefetch command.
pub async fn execute(ctx: &CliContext, args: &PrefetchArgs) -> Result<()> {
    let book_id = book_id_for(&args.book.file);
    let book = TextBook::open(&args.book.file, args.book.paragraphs_per_page).await?;
    if args.book.page >= book.page_count() {
        return Err(CliError::Arguments(format!(
            "page {} is out of range ({} pages)",
            args.book.page,
            book.page_count()
        ))
        .into());
    }

    let fragments = fragments_to_fetch(&book, args.book.page, args.pages);
    if fragments.is_empty() {
        println!("Nothing to synthesize on the selected pages");
        return Ok(());
    }

    let service = ctx.narration_service(&args.tts)?;
    println!(
        "Synthesizing {} fragments of '{book_id}'...",
        fragments.len()
    );

    let requests = with_priorities(fragments).into_iter().map(|(fragment, priority)| {
        let service = Arc::clone(&service);
        let book_id = book_id.clone();
        async move {
            let result = service
                .request_audio(&book_id, &fragment.id, &fragment.text, priority)
                .await;
            (fragment.id, result)
        }
    });
    let results = join_all(requests).await;

    let mut failed = 0usize;
    for (fragment_id, result) in &results {
        if let Err(e) = result {
            failed += 1;
            eprintln!("  {fragment_id}: {e}");
        }
    }
    service.shutdown().await;

    println!(
        "Cached {} of {} fragments ({} failed)",
        results.len() - failed,
        results.len(),
        failed
    );
    if failed > 0 {
        return Err(CliError::Narration(format!("{failed} fragments failed")).into());
    }
    Ok(())
}

/// Speakable fragments of `pages` pages starting at `first`.
fn fragments_to_fetch(book: &TextBook, first: usize, pages: usize) -> Vec<Fragment> {
    (first..first.saturating_add(pages.max(1)))
        .filter_map(|index| book.page(index))
        .flatten()
        .filter(|fragment| fragment.is_speakable())
        .cloned()
        .collect()
}

/// Earlier fragments get higher priority so they are synthesized first.
fn with_priorities(fragments: Vec<Fragment>) -> Vec<(Fragment, Priority)> {
    let count = Priority::try_from(fragments.len()).unwrap_or(Priority::MAX);
    fragments
        .into_iter()
        .zip((1..=count).rev())
        .collect()
}
