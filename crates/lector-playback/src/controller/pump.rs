//! Sink event pump.
//!
//! One task per session forwards sink events into the controller. It holds
//! only a weak reference so a dropped controller ends it.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use lector_core::SinkEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

use super::ControllerInner;

/// Start the pump if it is not running yet.
pub(super) fn ensure_started(inner: &Arc<ControllerInner>) {
    if inner
        .pump_started
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return;
    }

    // Subscribe before spawning so no event after this call is missed
    let events = inner.deps.sink.subscribe();
    let weak = Arc::downgrade(inner);
    let shutdown = inner.shutdown.clone();

    tokio::spawn(run(weak, events, shutdown));
}

async fn run(
    weak: Weak<ControllerInner>,
    mut events: broadcast::Receiver<SinkEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = shutdown.cancelled() => break,
            event = events.recv() => event,
        };

        let event = match event {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(target: "lector.playback", skipped, "Sink events lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let Some(inner) = weak.upgrade() else {
            break;
        };
        inner.handle_sink_event(event).await;
    }

    tracing::debug!(target: "lector.playback", "Sink event pump stopped");
}
