//! Audio sink that plays each file through an external player process.
//!
//! The player is spawned with the file path as its last argument. Pause and
//! resume map to `SIGSTOP`/`SIGCONT`; stop kills the process. A zero exit
//! status is reported as `Ended`, anything else as a decode error.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lector_core::{AudioSinkPort, NarrationError, SinkErrorCode, SinkEvent};
use tokio::process::Command;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

const EVENT_CAPACITY: usize = 16;

/// A player process for the loaded file.
#[derive(Debug)]
struct Running {
    generation: u64,
    pid: Option<u32>,
    kill: CancellationToken,
    paused: bool,
}

#[derive(Debug, Default)]
struct SinkState {
    loaded: Option<PathBuf>,
    running: Option<Running>,
    generation: u64,
    /// Time played before the last resume.
    played: Duration,
    resumed_at: Option<Instant>,
}

impl SinkState {
    fn elapsed(&self) -> Duration {
        self.played + self.resumed_at.map_or(Duration::ZERO, |at| at.elapsed())
    }

    fn reset_clock(&mut self) {
        self.played = Duration::ZERO;
        self.resumed_at = None;
    }

    /// Stop the running player, if any. Its exit is not reported.
    fn halt(&mut self) {
        if let Some(running) = self.running.take() {
            running.kill.cancel();
        }
        self.reset_clock();
    }
}

/// Sink backed by a command-line player such as `mpg123` or `afplay`.
#[derive(Debug, Clone)]
pub struct ProcessAudioSink {
    program: String,
    args: Vec<String>,
    state: Arc<Mutex<SinkState>>,
    events: broadcast::Sender<SinkEvent>,
}

impl ProcessAudioSink {
    /// Create a sink that runs `program args... <file>`.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            program: program.into(),
            args,
            state: Arc::new(Mutex::new(SinkState::default())),
            events,
        }
    }

    /// Player program name.
    pub fn program(&self) -> &str {
        &self.program
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_player(&self, state: &mut SinkState) -> Result<(), NarrationError> {
        let path = state
            .loaded
            .clone()
            .ok_or_else(|| NarrationError::sink("nothing loaded"))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| NarrationError::sink(format!("failed to start {}: {e}", self.program)))?;

        state.generation += 1;
        let generation = state.generation;
        let kill = CancellationToken::new();
        state.running = Some(Running {
            generation,
            pid: child.id(),
            kill: kill.clone(),
            paused: false,
        });
        state.played = Duration::ZERO;
        state.resumed_at = Some(Instant::now());

        tracing::debug!(
            target: "lector.cli",
            program = %self.program,
            path = %path.display(),
            generation,
            "Player started"
        );

        let shared = Arc::clone(&self.state);
        let events = self.events.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                () = kill.cancelled() => {
                    let _ = child.kill().await;
                    return;
                }
                status = child.wait() => status,
            };

            {
                let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
                let current = state
                    .running
                    .as_ref()
                    .is_some_and(|running| running.generation == generation);
                if !current {
                    return;
                }
                state.running = None;
                state.played = state.elapsed();
                state.resumed_at = None;
            }

            let event = match status {
                Ok(status) if status.success() => SinkEvent::Ended,
                Ok(status) => SinkEvent::Error {
                    code: SinkErrorCode::Decode,
                    message: format!("player exited with {status}"),
                },
                Err(e) => SinkEvent::Error {
                    code: SinkErrorCode::Unknown,
                    message: e.to_string(),
                },
            };
            let _ = events.send(event);
        });

        Ok(())
    }
}

#[cfg(unix)]
fn send_signal(pid: Option<u32>, sig: Signal) -> Result<(), NarrationError> {
    let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return Err(NarrationError::sink("player has no process id"));
    };
    match signal::kill(Pid::from_raw(pid), sig) {
        // Exited between our check and the signal
        Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(e) => Err(NarrationError::sink(format!("failed to send {sig:?}: {e}"))),
    }
}

#[async_trait]
impl AudioSinkPort for ProcessAudioSink {
    async fn load(&self, path: &Path) -> Result<(), NarrationError> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            NarrationError::playback(SinkErrorCode::Network, format!("{}: {e}", path.display()))
        })?;
        if metadata.len() == 0 {
            return Err(NarrationError::playback(
                SinkErrorCode::Decode,
                format!("{} is empty", path.display()),
            ));
        }

        {
            let mut state = self.lock();
            state.halt();
            state.loaded = Some(path.to_path_buf());
        }
        let _ = self.events.send(SinkEvent::ReadyToPlay);
        Ok(())
    }

    async fn play(&self) -> Result<(), NarrationError> {
        let mut state = self.lock();
        match state.running.as_mut() {
            Some(running) if running.paused => {
                #[cfg(unix)]
                send_signal(running.pid, Signal::SIGCONT)?;
                running.paused = false;
                state.resumed_at = Some(Instant::now());
                Ok(())
            }
            Some(_) => Ok(()),
            None => self.spawn_player(&mut state),
        }
    }

    #[cfg(unix)]
    async fn pause(&self) -> Result<(), NarrationError> {
        let mut state = self.lock();
        let Some(running) = state.running.as_mut() else {
            return Ok(());
        };
        if running.paused {
            return Ok(());
        }
        send_signal(running.pid, Signal::SIGSTOP)?;
        running.paused = true;
        state.played = state.elapsed();
        state.resumed_at = None;
        Ok(())
    }

    #[cfg(not(unix))]
    async fn pause(&self) -> Result<(), NarrationError> {
        if self.lock().running.is_some() {
            return Err(NarrationError::sink(
                "pausing a player process is not supported on this platform",
            ));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), NarrationError> {
        self.lock().halt();
        Ok(())
    }

    fn position(&self) -> Duration {
        self.lock().elapsed()
    }

    fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.events.subscribe()
    }
}
