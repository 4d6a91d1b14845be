//! Synthesis worker pipeline.
//!
//! Executes one dispatched request: synthesize, then write through the
//! store. The worker operates on a value type and cloned `Arc` dependencies
//! and never touches the queue's state lock.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use lector_core::{
    AudioStorePort, NarrationError, SynthesisFailure, SynthesisRequest, SynthesizerPort,
};
use tokio_util::sync::CancellationToken;

/// Dependencies for the synthesis worker.
#[derive(Clone)]
pub struct WorkerDeps {
    pub synthesizer: Arc<dyn SynthesizerPort>,
    pub store: Arc<dyn AudioStorePort>,
    /// Upper bound on one synthesizer call.
    pub call_timeout: Duration,
}

/// A dispatched request.
pub struct SynthesisJob {
    pub request: SynthesisRequest,
    pub cancel: CancellationToken,
}

/// How a job ended.
#[derive(Debug)]
pub enum JobOutcome {
    /// Audio was synthesized and stored.
    Stored(PathBuf),
    /// The job failed; retryability decides what happens next.
    Failed(NarrationError),
    /// The job's token fired before it finished.
    Cancelled,
}

/// Run one job to completion or cancellation.
pub async fn run_job(job: &SynthesisJob, deps: &WorkerDeps) -> JobOutcome {
    let request = &job.request;

    let synthesis = async {
        match tokio::time::timeout(
            deps.call_timeout,
            deps.synthesizer.synthesize(&request.text, &request.options),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SynthesisFailure::Timeout),
        }
    };

    let bytes = tokio::select! {
        () = job.cancel.cancelled() => return JobOutcome::Cancelled,
        result = synthesis => match result {
            Ok(bytes) => bytes,
            Err(failure) => return JobOutcome::Failed(failure.into()),
        },
    };

    if job.cancel.is_cancelled() {
        return JobOutcome::Cancelled;
    }

    match deps.store.store(&request.key, &bytes).await {
        Ok(path) => JobOutcome::Stored(path),
        Err(e) => JobOutcome::Failed(e),
    }
}
