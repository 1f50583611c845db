//! Persistent resolution cache.
//!
//! A flat JSON map of package name to the version strings already resolved
//! by previous runs (`package-bundle-cache.json`). Loaded once at startup,
//! written back wholesale at the end of a successful run. Entries only grow
//! during a run. Concurrent invocations sharing one cache file are not
//! coordinated; last write wins.

use crate::error::BundleError;
use crate::version::any_satisfies;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Default cache file name, relative to the working directory.
pub const CACHE_FILE: &str = "package-bundle-cache.json";

/// In-memory view of the resolution cache.
#[derive(Debug, Clone, Default)]
pub struct ResolutionCache {
    entries: BTreeMap<String, Vec<String>>,
}

impl ResolutionCache {
    /// Load the cache from `path`.
    ///
    /// A missing file yields an empty cache; any other read or parse
    /// failure is fatal.
    ///
    /// # Errors
    /// Returns `CACHE` if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, BundleError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(BundleError::cache(format!(
                    "Failed to read cache file {}: {e}",
                    path.display()
                )));
            }
        };

        let entries: BTreeMap<String, Vec<String>> = serde_json::from_str(&content)
            .map_err(|e| {
                BundleError::cache(format!("Invalid cache file {}: {e}", path.display()))
            })?;

        Ok(Self { entries })
    }

    /// Write the cache to `path`, replacing any previous contents.
    ///
    /// # Errors
    /// Returns `CACHE` if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), BundleError> {
        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| BundleError::cache(format!("Failed to encode cache: {e}")))?;

        fs::write(path, json).map_err(|e| {
            BundleError::cache(format!("Failed to write cache file {}: {e}", path.display()))
        })
    }

    /// Whether a cached version of `name` already satisfies `range`.
    ///
    /// `None` (latest dist-tag requested) never short-circuits: the latest
    /// target can move between runs.
    #[must_use]
    pub fn satisfies(&self, name: &str, range: Option<&str>) -> bool {
        let Some(range) = range else {
            return false;
        };
        let Some(versions) = self.entries.get(name) else {
            return false;
        };
        any_satisfies(versions, range)
    }

    /// Record `name@version`. Returns `true` if the pair was newly added,
    /// `false` if this exact version was already present.
    pub fn insert(&mut self, name: &str, version: &str) -> bool {
        let versions = self.entries.entry(name.to_string()).or_default();
        if versions.iter().any(|v| v == version) {
            return false;
        }
        versions.push(version.to_string());
        true
    }

    /// Number of distinct package names in the cache.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
