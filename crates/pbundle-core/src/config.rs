//! Run configuration.
//!
//! One immutable value threaded through resolver, downloader, and pipeline.
//! Nothing in the core reads ambient/global state.

use crate::cache::CACHE_FILE;
use crate::registry::HttpOptions;
use std::path::{Path, PathBuf};

/// Staging directory name when the result is archived afterwards.
pub const STAGING_DIR_ARCHIVED: &str = ".package-bundle";

/// Staging directory name when the files are left on disk (`--no-archive`).
pub const STAGING_DIR_KEPT: &str = "package-bundle";

/// Default in-flight registry requests during resolution.
pub const DEFAULT_RESOLVE_CONCURRENCY: usize = 100;

/// Default simultaneous tarball downloads.
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 50;

/// Configuration for one bundling run.
#[derive(Debug, Clone)]
pub struct BundleConfig {
    /// Directory holding the staging dir, cache file, and manifest.
    pub working_dir: PathBuf,
    /// Include devDependencies when reading the root manifest.
    pub include_dev: bool,
    /// Include optionalDependencies when reading the root manifest.
    pub include_optional: bool,
    /// Expand devDependencies of transitive packages too.
    pub include_dev_recursive: bool,
    /// Expand optionalDependencies of transitive packages too.
    pub include_optional_recursive: bool,
    /// Place every tarball directly in the staging dir.
    pub flat: bool,
    /// Compress the staging dir into one archive and delete it.
    pub archive: bool,
    /// Use the persistent resolution cache.
    pub use_cache: bool,
    /// Explicit archive file name.
    pub out_file: Option<PathBuf>,
    /// Resolve every published version of root specifiers.
    pub all_versions: bool,
    /// Resolve every published version of every dependency as well.
    pub all_versions_recursive: bool,
    /// In-flight request limit for both resolution and downloads.
    pub concurrency: Option<usize>,
    /// Registry, proxy, auth, and TLS settings.
    pub http: HttpOptions,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("."),
            include_dev: false,
            include_optional: false,
            include_dev_recursive: false,
            include_optional_recursive: false,
            flat: false,
            archive: true,
            use_cache: true,
            out_file: None,
            all_versions: false,
            all_versions_recursive: false,
            concurrency: None,
            http: HttpOptions::default(),
        }
    }
}

impl BundleConfig {
    /// The staging directory for this run.
    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        let name = if self.archive {
            STAGING_DIR_ARCHIVED
        } else {
            STAGING_DIR_KEPT
        };
        self.working_dir.join(name)
    }

    /// The persistent cache file path.
    #[must_use]
    pub fn cache_file(&self) -> PathBuf {
        self.working_dir.join(CACHE_FILE)
    }

    /// The archive output path, timestamp-derived unless given explicitly.
    #[must_use]
    pub fn archive_file(&self) -> PathBuf {
        match &self.out_file {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.working_dir.join(path),
            None => self.working_dir.join(format!(
                "package-bundle-{}.tgz",
                chrono::Utc::now().timestamp_millis()
            )),
        }
    }

    /// The root manifest path (`package.json`).
    #[must_use]
    pub fn manifest_file(&self) -> PathBuf {
        self.working_dir.join("package.json")
    }

    /// In-flight limit for registry metadata requests.
    #[must_use]
    pub fn resolve_concurrency(&self) -> usize {
        self.concurrency
            .unwrap_or(DEFAULT_RESOLVE_CONCURRENCY)
            .max(1)
    }

    /// In-flight limit for tarball downloads.
    #[must_use]
    pub fn download_concurrency(&self) -> usize {
        self.concurrency
            .unwrap_or(DEFAULT_DOWNLOAD_CONCURRENCY)
            .max(1)
    }

    /// Whether every published version of this package should be expanded.
    #[must_use]
    pub fn expand_all_versions(&self, is_root: bool) -> bool {
        (self.all_versions && is_root) || self.all_versions_recursive
    }

    /// Override the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: &Path) -> Self {
        self.working_dir = dir.to_path_buf();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_dir_depends_on_archive_flag() {
        let config = BundleConfig::default();
        assert!(config.staging_dir().ends_with(STAGING_DIR_ARCHIVED));

        let config = BundleConfig {
            archive: false,
            ..BundleConfig::default()
        };
        assert!(config.staging_dir().ends_with(STAGING_DIR_KEPT));
    }

    #[test]
    fn test_concurrency_defaults() {
        let config = BundleConfig::default();
        assert_eq!(config.resolve_concurrency(), DEFAULT_RESOLVE_CONCURRENCY);
        assert_eq!(config.download_concurrency(), DEFAULT_DOWNLOAD_CONCURRENCY);

        let config = BundleConfig {
            concurrency: Some(1),
            ..BundleConfig::default()
        };
        assert_eq!(config.resolve_concurrency(), 1);
        assert_eq!(config.download_concurrency(), 1);
    }

    #[test]
    fn test_zero_concurrency_clamped() {
        let config = BundleConfig {
            concurrency: Some(0),
            ..BundleConfig::default()
        };
        assert_eq!(config.resolve_concurrency(), 1);
    }

    #[test]
    fn test_all_versions_scope() {
        let config = BundleConfig {
            all_versions: true,
            ..BundleConfig::default()
        };
        assert!(config.expand_all_versions(true));
        assert!(!config.expand_all_versions(false));

        let config = BundleConfig {
            all_versions_recursive: true,
            ..BundleConfig::default()
        };
        assert!(config.expand_all_versions(false));
    }

    #[test]
    fn test_explicit_out_file() {
        let config = BundleConfig {
            out_file: Some(PathBuf::from("bundle.tgz")),
            ..BundleConfig::default()
        };
        assert!(config.archive_file().ends_with("bundle.tgz"));
    }
}
