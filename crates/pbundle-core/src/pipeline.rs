//! Run orchestration: Resolve -> Download -> Archive -> Cleanup.
//!
//! Each stage proceeds only if the previous stage produced no run-level
//! failure. Branch-level failures are isolated inside the resolver and
//! downloader and surface here only in aggregate.

use crate::archive::create_archive;
use crate::cache::ResolutionCache;
use crate::config::BundleConfig;
use crate::download::{cleanup, Downloader};
use crate::error::BundleError;
use crate::progress::BundleObserver;
use crate::registry::RegistryClient;
use crate::resolve::Resolver;
use crate::spec::PackageSpec;
use std::path::PathBuf;

/// Terminal state of a successful run.
#[derive(Debug)]
pub struct BundleSummary {
    /// Number of downloaded packages.
    pub downloaded: usize,
    /// Total bytes across downloads.
    pub total_bytes: u64,
    /// Archive location when archiving was enabled.
    pub archive: Option<PathBuf>,
    /// Staging directory location when files were left on disk.
    pub staged: Option<PathBuf>,
}

/// Execute one bundling run.
///
/// # Errors
/// Returns `PREFLIGHT` if the staging directory already exists (before any
/// network or filesystem side effect), the first root-level resolution
/// failure, `EMPTY_RESULT` (informational severity) when resolution leaves
/// nothing to download, `DOWNLOAD_FAILED` if any download task failed, or an
/// archive / cache persistence error.
pub async fn run(
    config: &BundleConfig,
    specs: &[PackageSpec],
    observer: &dyn BundleObserver,
) -> Result<BundleSummary, BundleError> {
    let staging_dir = config.staging_dir();

    if staging_dir.exists() {
        return Err(BundleError::preflight(format!(
            "Output dir \"{}\" already exists",
            staging_dir.display()
        )));
    }

    let cache = if config.use_cache {
        ResolutionCache::load(&config.cache_file())?
    } else {
        ResolutionCache::default()
    };

    let registry = RegistryClient::new(&config.http)?;

    let resolver = Resolver::new(config, &registry, cache, observer);
    resolver.resolve(specs).await?;
    let (downloads, cache) = resolver.into_parts();

    if downloads.is_empty() {
        let hint = if config.use_cache {
            " Try running with the `--no-cache` option."
        } else {
            ""
        };
        return Err(BundleError::empty_result(format!(
            "No new packages required.{hint}"
        )));
    }

    let downloader = Downloader::new(config, registry.http(), observer);
    let outcome = downloader.fetch_all(&downloads).await;

    if !outcome.is_complete() {
        if config.archive {
            // Best effort: do not leave a half-populated hidden staging dir
            // behind a failed archive run.
            let _ = cleanup(&staging_dir);
        }
        let (first_id, first_err) = &outcome.failed[0];
        return Err(BundleError::download_failed(format!(
            "{} of {} downloads failed; first failure {first_id}: {first_err}",
            outcome.failed.len(),
            downloads.len(),
        )));
    }

    if config.use_cache {
        cache.save(&config.cache_file())?;
    }

    if !config.archive {
        return Ok(BundleSummary {
            downloaded: outcome.completed,
            total_bytes: outcome.total_bytes,
            archive: None,
            staged: Some(staging_dir),
        });
    }

    observer.archive_started();
    let archive_file = config.archive_file();

    if let Err(err) = create_archive(&staging_dir, &archive_file) {
        let _ = cleanup(&staging_dir);
        return Err(err);
    }

    observer.archive_completed(&archive_file);
    cleanup(&staging_dir)?;

    Ok(BundleSummary {
        downloaded: outcome.completed,
        total_bytes: outcome.total_bytes,
        archive: Some(archive_file),
        staged: None,
    })
}
