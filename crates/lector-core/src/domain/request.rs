//! Synthesis request types.

use tokio::time::Instant;

use serde::{Deserialize, Serialize};

use super::fragment::RequestKey;

/// Request priority. Larger values are dispatched first.
pub type Priority = i64;

/// Caller-supplied voice parameters, passed through to the synthesizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisOptions {
    /// Provider-specific voice identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    /// Speaking rate multiplier (1.0 = normal).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f32>,
}

impl SynthesisOptions {
    /// Set the voice.
    #[must_use]
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    /// Set the speaking rate.
    #[must_use]
    pub const fn with_rate(mut self, rate: f32) -> Self {
        self.rate = Some(rate);
        self
    }
}

/// A unit of work for the request queue.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    /// Dedup and cache key.
    pub key: RequestKey,
    /// Text to synthesize.
    pub text: String,
    /// Dispatch priority.
    pub priority: Priority,
    /// Voice parameters.
    pub options: SynthesisOptions,
    /// When the request first entered the queue. Kept across retries.
    pub enqueued_at: Instant,
    /// Number of retries already performed.
    pub retry_count: u32,
}

impl SynthesisRequest {
    /// Create a new request stamped with the current time.
    pub fn new(key: RequestKey, text: impl Into<String>, priority: Priority) -> Self {
        Self {
            key,
            text: text.into(),
            priority,
            options: SynthesisOptions::default(),
            enqueued_at: Instant::now(),
            retry_count: 0,
        }
    }

    /// Set the voice parameters.
    #[must_use]
    pub fn with_options(mut self, options: SynthesisOptions) -> Self {
        self.options = options;
        self
    }

    /// Time spent since the request was first enqueued.
    pub fn age(&self) -> std::time::Duration {
        self.enqueued_at.elapsed()
    }
}

/// What the playback layer asks the narration service for.
#[derive(Debug, Clone)]
pub struct AudioRequest {
    /// Book and fragment.
    pub key: RequestKey,
    /// Text to synthesize on a cache miss.
    pub text: String,
    /// Queue priority on a cache miss.
    pub priority: Priority,
    /// Voice parameters.
    pub options: SynthesisOptions,
    /// Skip the cache lookup and force re-synthesis.
    pub bypass_cache: bool,
}

impl AudioRequest {
    /// Create a new audio request.
    pub fn new(key: RequestKey, text: impl Into<String>, priority: Priority) -> Self {
        Self {
            key,
            text: text.into(),
            priority,
            options: SynthesisOptions::default(),
            bypass_cache: false,
        }
    }

    /// Set the voice parameters.
    #[must_use]
    pub fn with_options(mut self, options: SynthesisOptions) -> Self {
        self.options = options;
        self
    }

    /// Set whether the cache lookup is skipped.
    #[must_use]
    pub const fn with_bypass_cache(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }

    /// Convert into a queue request.
    pub fn into_synthesis(self) -> SynthesisRequest {
        SynthesisRequest::new(self.key, self.text, self.priority).with_options(self.options)
    }
}

/// Counts describing the request queue, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    /// Requests waiting for a batch.
    pub pending: usize,
    /// Requests currently dispatched to the synthesizer.
    pub active: usize,
    /// Requests waiting out a retry delay.
    pub backing_off: usize,
    /// Configured backlog capacity.
    pub max_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_request_carries_options_into_synthesis() {
        let key = RequestKey::new("book", "p1");
        let request = AudioRequest::new(key.clone(), "Hello.", 7)
            .with_options(SynthesisOptions::default().with_voice("alto").with_rate(1.25))
            .with_bypass_cache(true);
        assert!(request.bypass_cache);

        let synthesis = request.into_synthesis();
        assert_eq!(synthesis.key, key);
        assert_eq!(synthesis.priority, 7);
        assert_eq!(synthesis.retry_count, 0);
        assert_eq!(synthesis.options.voice.as_deref(), Some("alto"));
        assert_eq!(synthesis.options.rate, Some(1.25));
    }

    #[test]
    fn options_skip_unset_fields_when_serialized() {
        let json = serde_json::to_string(&SynthesisOptions::default().with_voice("bass")).unwrap();
        assert_eq!(json, r#"{"voice":"bass"}"#);
    }
}
