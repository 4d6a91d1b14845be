//! Priority synthesis queue for lector.
//!
//! - `backlog` - pure state machine for pending and backing-off requests
//! - `runner` - [`RequestQueue`], the async orchestrator with a long-lived
//!   runner task
//! - `ticket` - [`SynthesisTicket`], a future for one request's result
//!
//! The queue deduplicates by [`RequestKey`](lector_core::RequestKey),
//! dispatches the most urgent requests in bounded batches, retries transient
//! failures with exponential backoff and writes successful audio through
//! the store before resolving callers.

mod backlog;
mod runner;
mod ticket;

pub use backlog::{BacklogEntry, SynthesisBacklog};
pub use runner::RequestQueue;
pub use ticket::{Settlement, SynthesisTicket};
