//! Progress reporting for the terminal.
//!
//! Implements the core's observer interface by emitting log lines; the
//! engine itself never touches the terminal.

use pbundle_core::{BundleError, BundleObserver};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Observer that renders lifecycle events as tracing output.
#[derive(Debug, Default)]
pub struct LogObserver {
    resolved: AtomicUsize,
    downloaded: AtomicUsize,
}

impl BundleObserver for LogObserver {
    fn resolve_started(&self) {
        tracing::info!("[1/3] Resolving dependencies...");
    }

    fn package_resolved(&self, name: &str, version: &str) {
        self.resolved.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("resolved {name}@{version}");
    }

    fn branch_abandoned(&self, name: &str, error: &BundleError) {
        tracing::warn!("{} - ignoring \"{name}\"", error.message());
    }

    fn resolve_completed(&self, count: usize) {
        let plural = if count == 1 { "" } else { "s" };
        tracing::info!("Found {count} package{plural}");
    }

    fn download_started(&self, total: usize) {
        tracing::info!("[2/3] Downloading {total} packages...");
    }

    fn package_downloaded(&self, name: &str, version: &str, bytes: u64) {
        let done = self.downloaded.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!("downloaded {name}@{version} ({bytes} bytes, {done} done)");
    }

    fn download_failed(&self, name: &str, version: &str, error: &BundleError) {
        tracing::warn!("failed to download {name}@{version}: {}", error.message());
    }

    fn download_completed(&self, total_bytes: u64) {
        tracing::info!("Downloaded packages ({total_bytes} bytes)");
    }

    fn archive_started(&self) {
        tracing::info!("[3/3] Creating archive...");
    }

    fn archive_completed(&self, path: &Path) {
        tracing::info!("Created archive at \"{}\"", path.display());
    }
}
