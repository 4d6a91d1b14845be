//! Handle to a queued synthesis result.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use lector_core::NarrationError;
use tokio::sync::oneshot;

/// Settlement delivered to every waiter of a request.
pub type Settlement = Result<PathBuf, NarrationError>;

/// Future resolving to the cached audio path of one request.
///
/// Returned by [`RequestQueue::enqueue`](crate::RequestQueue::enqueue) so a
/// caller can queue several fragments before awaiting any of them. Dropping
/// the ticket does not cancel the request.
#[derive(Debug)]
#[must_use = "a ticket does nothing unless awaited"]
pub struct SynthesisTicket {
    rx: oneshot::Receiver<Settlement>,
}

impl SynthesisTicket {
    pub(crate) fn channel() -> (oneshot::Sender<Settlement>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }
}

impl Future for SynthesisTicket {
    type Output = Settlement;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A dropped sender means the queue went away with the request
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|settled| settled.unwrap_or(Err(NarrationError::Cancelled)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ticket_resolves_with_sent_value() {
        let (tx, ticket) = SynthesisTicket::channel();
        tx.send(Ok(PathBuf::from("/cache/a.mp3"))).unwrap();
        assert_eq!(ticket.await.unwrap(), PathBuf::from("/cache/a.mp3"));
    }

    #[tokio::test]
    async fn test_dropped_sender_reads_as_cancelled() {
        let (tx, ticket) = SynthesisTicket::channel();
        drop(tx);
        assert_eq!(ticket.await, Err(NarrationError::Cancelled));
    }
}
