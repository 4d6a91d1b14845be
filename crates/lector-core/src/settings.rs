//! Settings domain types and validation.
//!
//! `NarrationSettings` is the user-facing configuration: a flat JSON document
//! whose keys match the recognised options. Each component receives a small
//! typed config derived from it (`CacheConfig`, `QueueConfig`,
//! `PlaybackConfig`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default backlog capacity of the request queue.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 15;

/// Default number of requests dispatched together.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Default audio file extension for cache entries.
pub const DEFAULT_AUDIO_EXTENSION: &str = "mp3";

/// Narration settings.
///
/// Missing keys fall back to defaults, so partial files are valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NarrationSettings {
    /// Maximum pending synthesis requests (1-200).
    pub max_queue_size: usize,
    /// Requests dispatched concurrently per batch (1-32).
    pub batch_size: usize,
    /// Retries for transient synthesis failures (0-10).
    pub max_retries: u32,
    /// Base retry delay; doubled per retry.
    pub retry_delay_ms: u64,
    /// Age after which a request is abandoned.
    pub request_timeout_ms: u64,
    /// Cache size cap in megabytes.
    #[serde(rename = "maxCacheSizeMB")]
    pub max_cache_size_mb: u64,
    /// Fraction of the cap that triggers eviction (0.1-1.0).
    pub cache_cleanup_threshold: f64,
    /// Fragments prefetched ahead of the cursor.
    pub prefetch_ahead_count: usize,
    /// Fragments prefetched behind the cursor.
    pub prefetch_behind_count: usize,
    /// Fragments prefetched on the new page after crossing a boundary.
    pub page_prefetch_count: usize,
    /// How long a coalesced caller waits for the shared result.
    pub waiter_timeout_ms: u64,
    /// Pause before skipping an empty page or fragment.
    pub empty_page_grace_ms: u64,
    /// Attempts to start one fragment before skipping it.
    pub play_attempts: u32,
    /// Skipped fragments in a row before playback gives up.
    pub max_consecutive_failures: u32,
    /// How long the sink may take to become ready.
    pub sink_load_timeout_ms: u64,
    /// File extension used for cached audio.
    pub audio_extension: String,
    /// Cache root directory; platform default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_root: Option<PathBuf>,
}

impl Default for NarrationSettings {
    fn default() -> Self {
        Self {
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: 3,
            retry_delay_ms: 1_000,
            request_timeout_ms: 60_000,
            max_cache_size_mb: 500,
            cache_cleanup_threshold: 0.8,
            prefetch_ahead_count: 4,
            prefetch_behind_count: 3,
            page_prefetch_count: 3,
            waiter_timeout_ms: 30_000,
            empty_page_grace_ms: 2_000,
            play_attempts: 3,
            max_consecutive_failures: 5,
            sink_load_timeout_ms: 15_000,
            audio_extension: DEFAULT_AUDIO_EXTENSION.to_string(),
            cache_root: None,
        }
    }
}

impl NarrationSettings {
    /// Load settings from a JSON file and validate them.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path).map_err(|e| SettingsError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let settings: Self =
            serde_json::from_str(&contents).map_err(|e| SettingsError::Parse(e.to_string()))?;
        validate_settings(&settings)?;
        tracing::debug!(path = %path.display(), "Loaded narration settings");
        Ok(settings)
    }

    /// Config for the fragment cache rooted at `root`.
    #[must_use]
    pub fn cache_config(&self, root: PathBuf) -> CacheConfig {
        CacheConfig {
            root,
            max_size_bytes: self.max_cache_size_mb.saturating_mul(1024 * 1024),
            cleanup_threshold: self.cache_cleanup_threshold,
            extension: self.audio_extension.clone(),
        }
    }

    /// Config for the request queue.
    #[must_use]
    pub const fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_queue_size: self.max_queue_size,
            batch_size: self.batch_size,
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }

    /// How long coalesced callers wait.
    #[must_use]
    pub const fn waiter_timeout(&self) -> Duration {
        Duration::from_millis(self.waiter_timeout_ms)
    }

    /// Config for the playback controller.
    #[must_use]
    pub const fn playback_config(&self) -> PlaybackConfig {
        PlaybackConfig {
            prefetch_ahead: self.prefetch_ahead_count,
            prefetch_behind: self.prefetch_behind_count,
            page_prefetch: self.page_prefetch_count,
            empty_page_grace: Duration::from_millis(self.empty_page_grace_ms),
            play_attempts: self.play_attempts,
            max_consecutive_failures: self.max_consecutive_failures,
            sink_load_timeout: Duration::from_millis(self.sink_load_timeout_ms),
        }
    }
}

/// Fragment cache configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Root directory; one subdirectory per book.
    pub root: PathBuf,
    /// Size cap in bytes.
    pub max_size_bytes: u64,
    /// Fraction of the cap that triggers eviction.
    pub cleanup_threshold: f64,
    /// Audio file extension.
    pub extension: String,
}

impl CacheConfig {
    /// Config with default limits rooted at `root`.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        NarrationSettings::default().cache_config(root)
    }

    /// Set the size cap in bytes.
    #[must_use]
    pub const fn with_max_size_bytes(mut self, max: u64) -> Self {
        self.max_size_bytes = max;
        self
    }

    /// Set the cleanup threshold.
    #[must_use]
    pub const fn with_cleanup_threshold(mut self, threshold: f64) -> Self {
        self.cleanup_threshold = threshold;
        self
    }

    /// Size above which a store triggers eviction, and the target eviction
    /// shrinks the cache to.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn eviction_threshold_bytes(&self) -> u64 {
        (self.max_size_bytes as f64 * self.cleanup_threshold) as u64
    }
}

/// Request queue configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Backlog capacity.
    pub max_queue_size: usize,
    /// Requests dispatched together.
    pub batch_size: usize,
    /// Retries for transient failures.
    pub max_retries: u32,
    /// Base retry delay.
    pub retry_delay: Duration,
    /// Maximum request age.
    pub request_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        NarrationSettings::default().queue_config()
    }
}

impl QueueConfig {
    /// Delay before retry number `retry_count` (1-based): base × 2^(n-1).
    #[must_use]
    pub fn backoff_for(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(16);
        self.retry_delay.saturating_mul(1 << exponent)
    }
}

/// Playback controller configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackConfig {
    /// Fragments prefetched ahead of the cursor.
    pub prefetch_ahead: usize,
    /// Fragments prefetched behind the cursor.
    pub prefetch_behind: usize,
    /// Fragments prefetched after crossing a page boundary.
    pub page_prefetch: usize,
    /// Pause before skipping empty content.
    pub empty_page_grace: Duration,
    /// Attempts per fragment.
    pub play_attempts: u32,
    /// Skips in a row before giving up.
    pub max_consecutive_failures: u32,
    /// Sink readiness timeout.
    pub sink_load_timeout: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        NarrationSettings::default().playback_config()
    }
}

/// Settings validation error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SettingsError {
    #[error("Max queue size must be between 1 and 200, got {0}")]
    InvalidQueueSize(usize),

    #[error("Batch size must be between 1 and 32, got {0}")]
    InvalidBatchSize(usize),

    #[error("Max retries must be at most 10, got {0}")]
    InvalidMaxRetries(u32),

    #[error("Request timeout must be at least 1000 ms, got {0}")]
    InvalidRequestTimeout(u64),

    #[error("Cache size must be at least 1 MB, got {0}")]
    InvalidCacheSize(u64),

    #[error("Cache cleanup threshold must be between 0.1 and 1.0, got {0}")]
    InvalidCleanupThreshold(f64),

    #[error("Play attempts must be between 1 and 10, got {0}")]
    InvalidPlayAttempts(u32),

    #[error("Audio extension must be a short alphanumeric suffix, got {0:?}")]
    InvalidAudioExtension(String),

    #[error("Failed to read settings from {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to parse settings: {0}")]
    Parse(String),
}

/// Validate settings values.
pub fn validate_settings(settings: &NarrationSettings) -> Result<(), SettingsError> {
    if !(1..=200).contains(&settings.max_queue_size) {
        return Err(SettingsError::InvalidQueueSize(settings.max_queue_size));
    }

    if !(1..=32).contains(&settings.batch_size) {
        return Err(SettingsError::InvalidBatchSize(settings.batch_size));
    }

    if settings.max_retries > 10 {
        return Err(SettingsError::InvalidMaxRetries(settings.max_retries));
    }

    if settings.request_timeout_ms < 1_000 {
        return Err(SettingsError::InvalidRequestTimeout(
            settings.request_timeout_ms,
        ));
    }

    if settings.max_cache_size_mb == 0 {
        return Err(SettingsError::InvalidCacheSize(settings.max_cache_size_mb));
    }

    if !(0.1..=1.0).contains(&settings.cache_cleanup_threshold) {
        return Err(SettingsError::InvalidCleanupThreshold(
            settings.cache_cleanup_threshold,
        ));
    }

    if !(1..=10).contains(&settings.play_attempts) {
        return Err(SettingsError::InvalidPlayAttempts(settings.play_attempts));
    }

    let ext = &settings.audio_extension;
    if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(SettingsError::InvalidAudioExtension(ext.clone()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = NarrationSettings::default();
        assert_eq!(settings.max_queue_size, 15);
        assert_eq!(settings.batch_size, 5);
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.retry_delay_ms, 1_000);
        assert_eq!(settings.request_timeout_ms, 60_000);
        assert_eq!(settings.max_cache_size_mb, 500);
        assert!((settings.cache_cleanup_threshold - 0.8).abs() < f64::EPSILON);
        assert!(validate_settings(&settings).is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "maxQueueSize": 20, "maxCacheSizeMB": 64, "retryDelayMs": 250 }"#;
        let settings: NarrationSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.max_queue_size, 20);
        assert_eq!(settings.max_cache_size_mb, 64);
        assert_eq!(settings.retry_delay_ms, 250);
        assert_eq!(settings.batch_size, 5);
        assert_eq!(settings.prefetch_ahead_count, 4);
    }

    #[test]
    fn test_validation_rejects_out_of_range_values() {
        let mut settings = NarrationSettings {
            max_queue_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            validate_settings(&settings),
            Err(SettingsError::InvalidQueueSize(0))
        ));

        settings.max_queue_size = 15;
        settings.cache_cleanup_threshold = 1.5;
        assert!(matches!(
            validate_settings(&settings),
            Err(SettingsError::InvalidCleanupThreshold(_))
        ));

        settings.cache_cleanup_threshold = 0.8;
        settings.audio_extension = "../wav".to_string();
        assert!(matches!(
            validate_settings(&settings),
            Err(SettingsError::InvalidAudioExtension(_))
        ));
    }

    #[test]
    fn test_backoff_doubles_per_retry() {
        let config = QueueConfig::default();
        assert_eq!(config.backoff_for(1), Duration::from_millis(1_000));
        assert_eq!(config.backoff_for(2), Duration::from_millis(2_000));
        assert_eq!(config.backoff_for(3), Duration::from_millis(4_000));
    }

    #[test]
    fn test_cache_config_threshold() {
        let config = CacheConfig::new(PathBuf::from("/tmp/lector"))
            .with_max_size_bytes(1_000)
            .with_cleanup_threshold(0.8);
        assert_eq!(config.eviction_threshold_bytes(), 800);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "batchSize": 2, "audioExtension": "ogg" }}"#).unwrap();

        let settings = NarrationSettings::load(file.path()).unwrap();
        assert_eq!(settings.batch_size, 2);
        assert_eq!(settings.audio_extension, "ogg");
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "batchSize": 0 }}"#).unwrap();
        assert!(matches!(
            NarrationSettings::load(file.path()),
            Err(SettingsError::InvalidBatchSize(0))
        ));
    }
}
