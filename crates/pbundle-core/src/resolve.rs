//! Dependency graph resolution.
//!
//! Expands root specifiers into a deduplicated download set. The walk runs
//! in waves: every pending (name, range) item in a wave fetches its
//! packument concurrently under a bounded limit, then expands into the next
//! wave's items. The resolution cache collapses diamonds and terminates
//! cycles: a (name, version) pair is recorded at most once per run, and a
//! range already covered by a cached version is never re-descended.

use crate::cache::ResolutionCache;
use crate::config::BundleConfig;
use crate::error::BundleError;
use crate::progress::BundleObserver;
use crate::registry::{Packument, RegistryClient, VersionRecord};
use crate::spec::PackageSpec;
use crate::version::select_version;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Composite identity of one resolved package version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageId {
    pub name: String,
    pub version: String,
}

impl PackageId {
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Artifact location and published digests for one download-set entry.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub tarball: String,
    pub integrity: Option<String>,
    pub shasum: Option<String>,
}

/// The frozen output of resolution: unique (name, version) keys mapped to
/// artifact records.
pub type DownloadSet = BTreeMap<PackageId, Artifact>;

/// Cache and download set share one lock so every check-then-insert is
/// atomic with respect to concurrent branches.
struct SharedState {
    cache: ResolutionCache,
    downloads: DownloadSet,
}

/// One specifier-resolution task.
#[derive(Debug, Clone)]
struct Pending {
    name: String,
    range: Option<String>,
    is_root: bool,
}

/// Resolves specifiers into a [`DownloadSet`].
pub struct Resolver<'a> {
    config: &'a BundleConfig,
    registry: &'a RegistryClient,
    observer: &'a dyn BundleObserver,
    state: Mutex<SharedState>,
}

impl<'a> Resolver<'a> {
    #[must_use]
    pub fn new(
        config: &'a BundleConfig,
        registry: &'a RegistryClient,
        cache: ResolutionCache,
        observer: &'a dyn BundleObserver,
    ) -> Self {
        Self {
            config,
            registry,
            observer,
            state: Mutex::new(SharedState {
                cache,
                downloads: DownloadSet::new(),
            }),
        }
    }

    /// Resolve all root specifiers and their transitive dependencies.
    ///
    /// Returns the number of packages in the download set. Failures on
    /// non-root branches are reported to the observer and isolated; the
    /// same failures on a root specifier abort the run.
    ///
    /// # Errors
    /// Returns the first root-level failure encountered.
    pub async fn resolve(&self, roots: &[PackageSpec]) -> Result<usize, BundleError> {
        self.observer.resolve_started();

        let mut pending: VecDeque<Pending> = roots
            .iter()
            .map(|spec| Pending {
                name: spec.name.clone(),
                range: spec.range.clone(),
                is_root: true,
            })
            .collect();

        while !pending.is_empty() {
            let batch: Vec<Pending> = pending.drain(..).collect();
            let next = self.resolve_wave(batch).await?;
            pending.extend(next);
        }

        let count = self.state.lock().await.downloads.len();
        self.observer.resolve_completed(count);
        Ok(count)
    }

    /// Consume the resolver, yielding the frozen download set and the
    /// updated cache.
    #[must_use]
    pub fn into_parts(self) -> (DownloadSet, ResolutionCache) {
        let state = self.state.into_inner();
        (state.downloads, state.cache)
    }

    /// Resolve one wave of pending items, returning the next wave.
    async fn resolve_wave(&self, batch: Vec<Pending>) -> Result<Vec<Pending>, BundleError> {
        // Short-circuit items already covered by the cache; no network call
        // is made for them and their subtrees are never re-descended.
        let batch = {
            let state = self.state.lock().await;
            batch
                .into_iter()
                .filter(|item| !state.cache.satisfies(&item.name, item.range.as_deref()))
                .collect::<Vec<_>>()
        };

        if batch.is_empty() {
            return Ok(Vec::new());
        }

        // Fetch each distinct name once per wave.
        let names: BTreeSet<String> = batch.iter().map(|item| item.name.clone()).collect();

        let registry = self.registry;
        let fetched: Vec<(String, Result<Packument, BundleError>)> = stream::iter(names)
            .map(|name| async move {
                let result = registry.fetch_packument(&name).await;
                (name, result)
            })
            .buffer_unordered(self.config.resolve_concurrency())
            .collect()
            .await;

        let packuments: HashMap<String, Result<Arc<Packument>, BundleError>> = fetched
            .into_iter()
            .map(|(name, result)| (name, result.map(Arc::new)))
            .collect();

        let mut next = Vec::new();

        for item in batch {
            match self.expand_item(&item, &packuments).await {
                Ok(children) => next.extend(children),
                Err(err) if item.is_root => return Err(err),
                Err(err) => {
                    tracing::warn!(name = %item.name, error = %err, "abandoning branch");
                    self.observer.branch_abandoned(&item.name, &err);
                }
            }
        }

        Ok(next)
    }

    /// Select versions for one pending item and record them, returning the
    /// dependencies to resolve next.
    async fn expand_item(
        &self,
        item: &Pending,
        packuments: &HashMap<String, Result<Arc<Packument>, BundleError>>,
    ) -> Result<Vec<Pending>, BundleError> {
        let packument = match packuments.get(&item.name) {
            Some(Ok(packument)) => Arc::clone(packument),
            Some(Err(err)) => return Err(err.clone()),
            None => {
                return Err(BundleError::registry(format!(
                    "No metadata fetched for '{}'",
                    item.name
                )))
            }
        };

        let chosen: Vec<&VersionRecord> = if self.config.expand_all_versions(item.is_root) {
            packument.versions.values().collect()
        } else {
            let version = match &item.range {
                Some(range) => {
                    select_version(&item.name, &packument.version_strings(), range)?
                }
                None => packument
                    .latest()
                    .ok_or_else(|| BundleError::version_not_found(&item.name, "latest"))?
                    .to_string(),
            };

            let record = packument
                .versions
                .get(&version)
                .ok_or_else(|| BundleError::version_not_found(&item.name, &version))?;
            vec![record]
        };

        let mut children = Vec::new();

        for record in chosen {
            let newly_added = {
                let mut state = self.state.lock().await;
                if state.cache.insert(&record.name, &record.version) {
                    state.downloads.insert(
                        PackageId::new(&record.name, &record.version),
                        Artifact {
                            tarball: record.dist.tarball.clone(),
                            integrity: record.dist.integrity.clone(),
                            shasum: record.dist.shasum.clone(),
                        },
                    );
                    true
                } else {
                    // Exact version already recorded this run or a prior
                    // one: diamond collapse / cycle termination.
                    false
                }
            };

            if !newly_added {
                continue;
            }

            self.observer.package_resolved(&record.name, &record.version);
            tracing::debug!(package = %PackageId::new(&record.name, &record.version), "resolved");

            for (name, range) in merged_dependencies(record, self.config) {
                children.push(Pending {
                    name,
                    range: Some(range),
                    is_root: false,
                });
            }
        }

        Ok(children)
    }
}

/// Merge a version's dependency maps per configuration. Production
/// dependencies always apply; dev/optional maps of transitive packages are
/// only expanded under the recursive flags, with later maps overriding
/// earlier ones on name collisions.
fn merged_dependencies(
    record: &VersionRecord,
    config: &BundleConfig,
) -> BTreeMap<String, String> {
    let mut merged = record.dependencies.clone();

    if config.include_dev_recursive {
        for (name, range) in &record.dev_dependencies {
            merged.insert(name.clone(), range.clone());
        }
    }

    if config.include_optional_recursive {
        for (name, range) in &record.optional_dependencies {
            merged.insert(name.clone(), range.clone());
        }
    }

    merged
}
