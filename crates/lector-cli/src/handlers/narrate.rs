//! Narrate command handler.
//!
//! Plays a text file through the configured player and reads one-letter
//! controls from stdin until `q`, end of input, or Ctrl-C.

use std::io::BufRead;
use std::sync::Arc;

use anyhow::Result;
use lector_core::{ChannelEmitter, NarrationError, NarrationEvent, NarrationState};
use lector_playback::{PlaybackController, PlaybackDeps};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

use crate::adapters::{ProcessAudioSink, TerminalHighlighter, TextBook};
use crate::bootstrap::{CliContext, book_id_for};
use crate::commands::NarrateArgs;

const EVENT_CAPACITY: usize = 64;

/// A line of user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Toggle,
    Next,
    Prev,
    Stop,
    Play,
    Status,
    Quit,
}

impl Control {
    fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "" | "p" | "pause" => Some(Self::Toggle),
            "n" | "next" => Some(Self::Next),
            "b" | "back" | "prev" => Some(Self::Prev),
            "s" | "stop" => Some(Self::Stop),
            "r" | "play" => Some(Self::Play),
            "i" | "status" => Some(Self::Status),
            "q" | "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Execute the narrate command.
pub async fn execute(ctx: &CliContext, args: &NarrateArgs) -> Result<()> {
    let book_id = book_id_for(&args.book.file);
    let book = Arc::new(
        TextBook::open(&args.book.file, args.book.paragraphs_per_page)
            .await?
            .with_page(args.book.page),
    );
    let service = ctx.narration_service(&args.tts)?;
    let sink = Arc::new(ProcessAudioSink::new(&args.player, args.player_args.clone()));
    let emitter = Arc::new(ChannelEmitter::new(EVENT_CAPACITY));
    let mut events = emitter.subscribe();

    let controller = PlaybackController::new(
        book_id.clone(),
        PlaybackDeps {
            provider: service.clone(),
            sink: sink.clone(),
            navigator: book.clone(),
            highlighter: Arc::new(TerminalHighlighter::new(Arc::clone(&book))),
            emitter,
        },
        ctx.settings.playback_config(),
    );

    println!(
        "Narrating '{book_id}' from page {} of {} with {}",
        book.current_page() + 1,
        book.page_count(),
        sink.program()
    );
    println!("Controls: [Enter]/p pause-resume, n next, b back, s stop, r play, i status, q quit");

    let started = match &args.from {
        Some(fragment_id) => controller.play_from(fragment_id).await,
        None => controller.play().await,
    };
    report(started);

    let mut lines = stdin_lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.recv() => {
                let Some(line) = line else { break };
                let Some(control) = Control::parse(&line) else {
                    println!("Unknown command '{}'", line.trim());
                    continue;
                };
                if control == Control::Quit {
                    break;
                }
                apply(&controller, &book, control).await;
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    controller.shutdown().await;
    service.shutdown().await;
    println!("Stopped.");
    Ok(())
}

/// Stdin lines, read on a detached thread. A pending read must not keep
/// the runtime alive after Ctrl-C.
fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn apply(controller: &PlaybackController, book: &TextBook, control: Control) {
    let result = match control {
        Control::Toggle => match controller.state().await {
            NarrationState::Playing => controller.pause().await,
            NarrationState::Paused => controller.resume().await,
            NarrationState::Stopped | NarrationState::Loading => controller.play().await,
        },
        Control::Next => controller.next().await,
        Control::Prev => controller.prev().await,
        Control::Stop => controller.stop().await,
        Control::Play => controller.play().await,
        Control::Status => {
            let snapshot = controller.snapshot().await;
            println!(
                "{} | page {}/{} | fragment {} ({}/{}) | {} errors",
                snapshot.state.as_str(),
                book.current_page() + 1,
                book.page_count(),
                snapshot.fragment_id.as_deref().unwrap_or("-"),
                snapshot.index + 1,
                snapshot.page_len,
                snapshot.error_count
            );
            Ok(())
        }
        Control::Quit => Ok(()),
    };
    report(result);
}

fn report(result: Result<(), NarrationError>) {
    if let Err(e) = result {
        eprintln!("! {e}");
    }
}

fn print_event(event: &NarrationEvent) {
    match event {
        NarrationEvent::PageChanged {
            direction,
            fragment_count,
            ..
        } => println!("-- page turned {direction:?} ({fragment_count} paragraphs) --"),
        NarrationEvent::Error { message, .. } => eprintln!("! {message}"),
        NarrationEvent::StateChanged { state, .. } => {
            tracing::debug!(target: "lector.cli", state = state.as_str(), "Narration state");
        }
        NarrationEvent::FragmentStarted { .. } => {}
    }
}
