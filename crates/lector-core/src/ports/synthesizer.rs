//! Speech synthesizer port.

use async_trait::async_trait;

use crate::domain::SynthesisOptions;
use crate::errors::SynthesisFailure;

/// Port for the external speech-generation provider.
///
/// The protocol is a black box: text in, encoded audio bytes out. Failures
/// must be classified so the queue can tell transient outages from bad input.
///
/// # Implementations
///
/// - `HttpSynthesizer` in `lector-cli`
/// - Scripted fakes in tests
#[async_trait]
pub trait SynthesizerPort: Send + Sync {
    /// Synthesize `text` with the given voice parameters.
    async fn synthesize(
        &self,
        text: &str,
        options: &SynthesisOptions,
    ) -> Result<Vec<u8>, SynthesisFailure>;
}
