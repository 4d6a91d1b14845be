//! Cache directory resolution.
//!
//! Resolves the audio cache root from an explicit path, the
//! `LECTOR_CACHE_DIR` environment variable, or the platform cache directory.

use std::env;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache root.
pub const CACHE_DIR_ENV: &str = "LECTOR_CACHE_DIR";

/// How the cache root was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheRootSource {
    /// Passed by the caller (CLI flag or settings file).
    Explicit,
    /// From `LECTOR_CACHE_DIR`.
    EnvVar,
    /// Platform default.
    Default,
}

/// Resolution result for the cache root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRootResolution {
    /// The resolved directory.
    pub path: PathBuf,
    /// How it was determined.
    pub source: CacheRootSource,
}

/// Platform default cache root: `<cache dir>/lector/audio`.
///
/// Falls back to the system temp directory on platforms without a cache dir.
pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(env::temp_dir)
        .join("lector")
        .join("audio")
}

/// Resolve the cache root.
///
/// Resolution order:
/// 1. Explicit path provided by caller
/// 2. `LECTOR_CACHE_DIR` environment variable
/// 3. [`default_cache_root`]
pub fn resolve_cache_root(explicit: Option<&Path>) -> CacheRootResolution {
    resolve_with_env(explicit, env::var(CACHE_DIR_ENV).ok())
}

fn resolve_with_env(explicit: Option<&Path>, env_value: Option<String>) -> CacheRootResolution {
    let resolution = if let Some(path) = explicit {
        CacheRootResolution {
            path: path.to_path_buf(),
            source: CacheRootSource::Explicit,
        }
    } else if let Some(value) = env_value.filter(|v| !v.trim().is_empty()) {
        CacheRootResolution {
            path: PathBuf::from(value.trim()),
            source: CacheRootSource::EnvVar,
        }
    } else {
        CacheRootResolution {
            path: default_cache_root(),
            source: CacheRootSource::Default,
        }
    };

    tracing::debug!(
        path = %resolution.path.display(),
        source = ?resolution.source,
        "Resolved cache root"
    );
    resolution
}
