//! CLI bootstrap - the composition root.
//!
//! This module is the ONLY place where infrastructure is wired together for
//! the CLI: settings are loaded, the cache root is resolved, and the
//! narration service is built on top of the HTTP synthesizer and the disk
//! cache. Command handlers receive a [`CliContext`] and take what they need.

use std::path::Path;
use std::sync::Arc;

use lector_cache::FragmentCache;
use lector_core::{
    CacheRootResolution, NarrationSettings, SynthesisOptions, resolve_cache_root,
};
use lector_service::NarrationService;

use crate::adapters::HttpSynthesizer;
use crate::commands::TtsArgs;
use crate::error::CliError;

/// Fully composed context for CLI commands.
pub struct CliContext {
    /// Effective settings.
    pub settings: NarrationSettings,
    /// Where the cache lives and why.
    pub cache_root: CacheRootResolution,
    /// Shared disk cache.
    pub cache: Arc<FragmentCache>,
}

impl CliContext {
    /// Load settings (defaults when no file is given) and open the cache.
    ///
    /// The cache directory is taken from `cache_dir`, then the settings
    /// file, then `LECTOR_CACHE_DIR`, then the platform default.
    pub fn load(settings_path: Option<&Path>, cache_dir: Option<&Path>) -> Result<Self, CliError> {
        let settings = match settings_path {
            Some(path) => NarrationSettings::load(path)?,
            None => NarrationSettings::default(),
        };

        let cache_root = resolve_cache_root(cache_dir.or(settings.cache_root.as_deref()));
        let cache = Arc::new(FragmentCache::new(
            settings.cache_config(cache_root.path.clone()),
        ));

        tracing::debug!(
            target: "lector.cli",
            cache_root = %cache_root.path.display(),
            source = ?cache_root.source,
            "CLI context ready"
        );

        Ok(Self {
            settings,
            cache_root,
            cache,
        })
    }

    /// Build a narration service that synthesizes through `tts`.
    pub fn narration_service(&self, tts: &TtsArgs) -> Result<Arc<NarrationService>, CliError> {
        let defaults = SynthesisOptions {
            voice: tts.voice.clone(),
            rate: tts.rate,
        };
        let synthesizer = HttpSynthesizer::new(&tts.tts_url, tts.tts_key.clone(), defaults)?;

        Ok(Arc::new(NarrationService::from_settings(
            Arc::new(synthesizer),
            Arc::clone(&self.cache) as _,
            &self.settings,
        )))
    }
}

/// Book id for a text file: its file stem.
pub fn book_id_for(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "book".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lector_core::CacheRootSource;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_book_id_is_file_stem() {
        assert_eq!(book_id_for(Path::new("/books/emma.txt")), "emma");
        assert_eq!(book_id_for(Path::new("notes")), "notes");
        assert_eq!(book_id_for(Path::new("/")), "book");
    }

    #[test]
    fn test_load_defaults_with_explicit_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = CliContext::load(None, Some(dir.path())).unwrap();

        assert_eq!(ctx.settings, NarrationSettings::default());
        assert_eq!(ctx.cache_root.path, dir.path());
        assert_eq!(ctx.cache_root.source, CacheRootSource::Explicit);
        assert_eq!(ctx.cache.root(), dir.path());
    }

    #[test]
    fn test_settings_file_cache_root_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"maxQueueSize": 20, "cacheRoot": "{}"}}"#,
            dir.path().display()
        )
        .unwrap();

        let ctx = CliContext::load(Some(file.path()), None).unwrap();
        assert_eq!(ctx.settings.max_queue_size, 20);
        assert_eq!(ctx.cache_root.path, dir.path());
    }

    #[test]
    fn test_invalid_settings_file_is_config_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"batchSize": 0}}"#).unwrap();

        let err = CliContext::load(Some(file.path()), None).err().unwrap();
        assert!(matches!(err, CliError::Config(_)));
    }
}
