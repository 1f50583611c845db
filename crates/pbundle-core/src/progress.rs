//! Progress observation.
//!
//! The core reports lifecycle events through an injected observer so that
//! terminal rendering stays out of the engine. Implementations must be cheap
//! and non-blocking; they are called from concurrent tasks.

use crate::error::BundleError;
use std::path::Path;

/// Receiver for pipeline lifecycle events. All methods default to no-ops.
pub trait BundleObserver: Send + Sync {
    /// Resolution is starting.
    fn resolve_started(&self) {}

    /// A concrete (name, version) was added to the download set.
    fn package_resolved(&self, _name: &str, _version: &str) {}

    /// A non-root branch failed and was abandoned.
    fn branch_abandoned(&self, _name: &str, _error: &BundleError) {}

    /// Resolution finished with this many packages to download.
    fn resolve_completed(&self, _count: usize) {}

    /// Downloads are starting.
    fn download_started(&self, _total: usize) {}

    /// One artifact finished downloading and verifying.
    fn package_downloaded(&self, _name: &str, _version: &str, _bytes: u64) {}

    /// One download failed (the run continues).
    fn download_failed(&self, _name: &str, _version: &str, _error: &BundleError) {}

    /// All downloads reached a terminal state.
    fn download_completed(&self, _total_bytes: u64) {}

    /// Archival is starting.
    fn archive_started(&self) {}

    /// The archive was written.
    fn archive_completed(&self, _path: &Path) {}
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl BundleObserver for NoopObserver {}
