//! Narration error types.
//!
//! These errors are `Clone` so that a single settlement can be fanned out to
//! every waiter coalesced onto the same request. Foreign error types such as
//! `std::io::Error` are captured as strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a synthesizer call failed.
///
/// The split between retryable and terminal failures drives the queue's
/// retry policy.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum SynthesisFailure {
    /// The provider did not answer in time.
    #[error("synthesis timed out")]
    Timeout,

    /// Transport-level failure (DNS, refused connection, TLS).
    #[error("network error: {message}")]
    Network {
        /// Detailed error message.
        message: String,
    },

    /// The provider asked us to slow down.
    #[error("rate limited by provider")]
    RateLimited,

    /// The provider returned a 5xx status.
    #[error("provider error (HTTP {status})")]
    Server {
        /// HTTP status code.
        status: u16,
    },

    /// The connection dropped mid-response.
    #[error("connection reset")]
    ConnectionReset,

    /// The provider rejected the input (empty text, too long, bad voice).
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Detailed error message.
        message: String,
    },

    /// The provider does not support the requested voice or format.
    #[error("unsupported: {message}")]
    Unsupported {
        /// Detailed error message.
        message: String,
    },

    /// Uncategorised failure. Retryability is inferred from the message.
    #[error("{message}")]
    Other {
        /// Error message.
        message: String,
    },
}

/// Message fragments that mark an untyped failure as transient.
const RETRYABLE_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "network",
    "rate limit",
    "rate-limit",
    "too many requests",
    "econnreset",
    "connection reset",
    "socket hang up",
];

/// HTTP statuses that mark an untyped failure as transient. Only matched as
/// whole numbers, so "5000 chars" is not a 500.
const RETRYABLE_STATUSES: &[&str] = &["429", "500", "502", "503", "504"];

fn mentions_status(message: &str, status: &str) -> bool {
    message.match_indices(status).any(|(start, _)| {
        let before = message[..start].chars().next_back();
        let after = message[start + status.len()..].chars().next();
        !before.is_some_and(|c| c.is_ascii_digit()) && !after.is_some_and(|c| c.is_ascii_digit())
    })
}

impl SynthesisFailure {
    /// Create a network failure.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create an invalid-input failure.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an uncategorised failure.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Classify an HTTP status code returned by a provider.
    ///
    /// Returns `None` for success codes.
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Option<Self> {
        match status {
            200..=299 => None,
            408 => Some(Self::Timeout),
            429 => Some(Self::RateLimited),
            500..=599 => Some(Self::Server { status }),
            415 | 501 => Some(Self::Unsupported {
                message: body.to_string(),
            }),
            _ => Some(Self::InvalidInput {
                message: format!("HTTP {status}: {body}"),
            }),
        }
    }

    /// Whether the queue should try again after a backoff delay.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout
            | Self::Network { .. }
            | Self::RateLimited
            | Self::Server { .. }
            | Self::ConnectionReset => true,
            Self::InvalidInput { .. } | Self::Unsupported { .. } => false,
            Self::Other { message } => {
                let lower = message.to_lowercase();
                RETRYABLE_MARKERS.iter().any(|marker| lower.contains(marker))
                    || RETRYABLE_STATUSES
                        .iter()
                        .any(|status| mentions_status(&lower, status))
            }
        }
    }
}

/// Error code reported by an audio sink, mirroring media element error codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkErrorCode {
    /// Loading was aborted.
    Aborted,
    /// The media could not be fetched.
    Network,
    /// The media could not be decoded.
    Decode,
    /// The source format is not supported.
    SrcNotSupported,
    /// Anything else.
    Unknown,
}

impl SinkErrorCode {
    /// Map a numeric media error code (1-4) to a variant.
    #[must_use]
    pub const fn from_code(code: u16) -> Self {
        match code {
            1 => Self::Aborted,
            2 => Self::Network,
            3 => Self::Decode,
            4 => Self::SrcNotSupported,
            _ => Self::Unknown,
        }
    }

    /// Human-readable description shown to the user.
    #[must_use]
    pub const fn describe(&self) -> &'static str {
        match self {
            Self::Aborted => "Playback was aborted",
            Self::Network => "A network error interrupted the audio",
            Self::Decode => "The audio could not be decoded",
            Self::SrcNotSupported => "The audio format is not supported",
            Self::Unknown => "An unknown playback error occurred",
        }
    }
}

/// Error type for narration operations.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum NarrationError {
    /// Writing audio to the cache failed or produced an empty file.
    #[error("cache write failed for {path}: {message}")]
    CacheWrite {
        /// Target path.
        path: String,
        /// Detailed error message.
        message: String,
    },

    /// The synthesizer failed.
    #[error("synthesis failed: {failure}")]
    Synthesis {
        /// Classified failure.
        failure: SynthesisFailure,
    },

    /// The request was dropped to keep the queue within capacity.
    #[error("request dropped: queue over capacity ({max_size})")]
    QueueOverflow {
        /// Configured capacity.
        max_size: usize,
    },

    /// The request aged out before it could be served.
    #[error("request timed out after {elapsed_ms} ms")]
    Timeout {
        /// Time spent waiting, in milliseconds.
        elapsed_ms: u64,
    },

    /// The request was cancelled.
    #[error("request cancelled")]
    Cancelled,

    /// The audio sink failed to play the fragment.
    #[error("{}: {message}", code.describe())]
    Playback {
        /// Sink error code.
        code: SinkErrorCode,
        /// Sink-provided detail.
        message: String,
    },

    /// The navigator could not change pages.
    #[error("navigation failed: {message}")]
    Navigation {
        /// Detailed error message.
        message: String,
    },

    /// The audio sink rejected a command.
    #[error("audio sink error: {message}")]
    Sink {
        /// Detailed error message.
        message: String,
    },
}

impl NarrationError {
    /// Create a cache write error.
    pub fn cache_write(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CacheWrite {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error from an elapsed duration.
    #[must_use]
    pub fn timeout(elapsed: std::time::Duration) -> Self {
        Self::Timeout {
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Create a playback error.
    pub fn playback(code: SinkErrorCode, message: impl Into<String>) -> Self {
        Self::Playback {
            code,
            message: message.into(),
        }
    }

    /// Create a navigation error.
    pub fn navigation(message: impl Into<String>) -> Self {
        Self::Navigation {
            message: message.into(),
        }
    }

    /// Create a sink error.
    pub fn sink(message: impl Into<String>) -> Self {
        Self::Sink {
            message: message.into(),
        }
    }

    /// Whether this error is a retryable synthesis failure.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Synthesis { failure } if failure.is_retryable())
    }

    /// Whether this error is a cancellation (not worth logging as an error).
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<SynthesisFailure> for NarrationError {
    fn from(failure: SynthesisFailure) -> Self {
        Self::Synthesis { failure }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_failures_classify_as_expected() {
        assert!(SynthesisFailure::Timeout.is_retryable());
        assert!(SynthesisFailure::RateLimited.is_retryable());
        assert!(SynthesisFailure::Server { status: 503 }.is_retryable());
        assert!(SynthesisFailure::ConnectionReset.is_retryable());
        assert!(SynthesisFailure::network("dns").is_retryable());
        assert!(!SynthesisFailure::invalid_input("empty text").is_retryable());
        assert!(
            !SynthesisFailure::Unsupported {
                message: "voice".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn untyped_failures_classify_by_message() {
        assert!(SynthesisFailure::other("read ECONNRESET").is_retryable());
        assert!(SynthesisFailure::other("Request Timed Out").is_retryable());
        assert!(SynthesisFailure::other("upstream returned 502").is_retryable());
        assert!(!SynthesisFailure::other("voice not found").is_retryable());
    }

    #[test]
    fn status_markers_only_match_whole_numbers() {
        assert!(SynthesisFailure::other("HTTP 503").is_retryable());
        assert!(SynthesisFailure::other("status=429: slow down").is_retryable());
        assert!(SynthesisFailure::other("500").is_retryable());
        assert!(!SynthesisFailure::other("text exceeds 5000 chars").is_retryable());
        assert!(!SynthesisFailure::other("voice id 15029 unknown").is_retryable());
        assert!(!SynthesisFailure::other("limit is 4290 per day").is_retryable());
    }

    #[test]
    fn status_codes_map_to_failures() {
        assert_eq!(SynthesisFailure::from_status(200, ""), None);
        assert_eq!(
            SynthesisFailure::from_status(429, ""),
            Some(SynthesisFailure::RateLimited)
        );
        assert_eq!(
            SynthesisFailure::from_status(502, ""),
            Some(SynthesisFailure::Server { status: 502 })
        );
        assert!(matches!(
            SynthesisFailure::from_status(400, "bad voice"),
            Some(SynthesisFailure::InvalidInput { .. })
        ));
    }

    #[test]
    fn narration_error_retryability_follows_failure() {
        let retryable: NarrationError = SynthesisFailure::Timeout.into();
        assert!(retryable.is_retryable());

        let terminal: NarrationError = SynthesisFailure::invalid_input("x").into();
        assert!(!terminal.is_retryable());

        assert!(!NarrationError::Cancelled.is_retryable());
        assert!(NarrationError::Cancelled.is_cancelled());
    }

    #[test]
    fn playback_error_message_is_human_readable() {
        let err = NarrationError::playback(SinkErrorCode::from_code(3), "bad frame header");
        assert_eq!(
            err.to_string(),
            "The audio could not be decoded: bad frame header"
        );
    }
}
