//! Concurrent tarball downloads with inline integrity verification.
//!
//! Each download-set entry is streamed to its destination while the digest
//! published by the registry is computed over the bytes as they arrive; there
//! is never a separate re-read pass. One failed task never cancels its
//! siblings.

use crate::config::BundleConfig;
use crate::error::BundleError;
use crate::progress::BundleObserver;
use crate::resolve::{Artifact, DownloadSet, PackageId};
use base64::Engine;
use futures::stream::{self, StreamExt};
use sha1::Sha1;
use sha2::{Digest as _, Sha256, Sha384, Sha512};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;

/// Result of downloading the whole set.
#[derive(Debug)]
pub struct DownloadOutcome {
    /// Tasks that completed and verified.
    pub completed: usize,
    /// Tasks that failed, with their errors. Failures here never cancelled
    /// other tasks.
    pub failed: Vec<(PackageId, BundleError)>,
    /// Running byte total across completed downloads.
    pub total_bytes: u64,
}

impl DownloadOutcome {
    /// Whether every task completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Destination path for one artifact.
///
/// Flat mode places everything in the staging dir, replacing the scope
/// separator with a dash. Nested mode mirrors the registry layout:
/// `{dir}/{name}/-/{leaf}-{version}.tgz`, where `leaf` is the scoped name's
/// final segment.
#[must_use]
pub fn tarball_path(staging_dir: &Path, flat: bool, id: &PackageId) -> PathBuf {
    if flat {
        staging_dir.join(format!("{}-{}.tgz", id.name.replace('/', "-"), id.version))
    } else {
        let leaf = id.name.rsplit('/').next().unwrap_or(id.name.as_str());
        staging_dir
            .join(&id.name)
            .join("-")
            .join(format!("{leaf}-{}.tgz", id.version))
    }
}

/// Fetches a frozen [`DownloadSet`] under bounded concurrency.
pub struct Downloader<'a> {
    config: &'a BundleConfig,
    http: &'a reqwest::Client,
    observer: &'a dyn BundleObserver,
}

impl<'a> Downloader<'a> {
    #[must_use]
    pub fn new(
        config: &'a BundleConfig,
        http: &'a reqwest::Client,
        observer: &'a dyn BundleObserver,
    ) -> Self {
        Self {
            config,
            http,
            observer,
        }
    }

    /// Download every entry of `set` to the staging directory.
    ///
    /// Completion order across tasks is unconstrained; all tasks reach a
    /// terminal state before this returns.
    pub async fn fetch_all(&self, set: &DownloadSet) -> DownloadOutcome {
        self.observer.download_started(set.len());

        let total_bytes = AtomicU64::new(0);

        let results: Vec<(PackageId, Result<(), BundleError>)> = stream::iter(set.iter())
            .map(|(id, artifact)| {
                let total_bytes = &total_bytes;
                async move {
                    let result = self.fetch_one(id, artifact, total_bytes).await;
                    (id.clone(), result)
                }
            })
            .buffer_unordered(self.config.download_concurrency())
            .collect()
            .await;

        let mut completed = 0;
        let mut failed = Vec::new();

        for (id, result) in results {
            match result {
                Ok(()) => completed += 1,
                Err(err) => {
                    tracing::warn!(package = %id, error = %err, "download failed");
                    self.observer.download_failed(&id.name, &id.version, &err);
                    failed.push((id, err));
                }
            }
        }

        let total_bytes = total_bytes.load(Ordering::Relaxed);
        self.observer.download_completed(total_bytes);

        DownloadOutcome {
            completed,
            failed,
            total_bytes,
        }
    }

    /// Stream one artifact to disk, verifying its digest inline.
    async fn fetch_one(
        &self,
        id: &PackageId,
        artifact: &Artifact,
        total_bytes: &AtomicU64,
    ) -> Result<(), BundleError> {
        let dest = tarball_path(&self.config.staging_dir(), self.config.flat, id);

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let expected = ExpectedDigest::for_artifact(artifact);
        if expected.is_none() {
            tracing::warn!(package = %id, "no published digest; skipping verification");
        }

        match self.stream_to_file(id, artifact, &dest, expected, total_bytes).await {
            Ok(()) => Ok(()),
            Err(err) => {
                // A partially written or mismatched file is never a valid
                // completed download.
                let _ = tokio::fs::remove_file(&dest).await;
                Err(err)
            }
        }
    }

    async fn stream_to_file(
        &self,
        id: &PackageId,
        artifact: &Artifact,
        dest: &Path,
        expected: Option<ExpectedDigest>,
        total_bytes: &AtomicU64,
    ) -> Result<(), BundleError> {
        let response = self
            .http
            .get(&artifact.tarball)
            .send()
            .await
            .map_err(|e| {
                BundleError::download_failed(format!(
                    "Failed to download '{}': {e}",
                    artifact.tarball
                ))
            })?;

        if !response.status().is_success() {
            return Err(BundleError::download_failed(format!(
                "Download of '{}' returned status {}",
                artifact.tarball,
                response.status()
            )));
        }

        let reported_len = response.content_length();

        let mut hasher = expected.as_ref().map(|e| Hasher::new(e.algorithm()));
        let mut file = tokio::fs::File::create(dest).await?;
        let mut streamed: u64 = 0;

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| {
                BundleError::network(format!("Stream error for '{}': {e}", artifact.tarball))
            })?;
            if let Some(hasher) = hasher.as_mut() {
                hasher.update(&chunk);
            }
            streamed += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }

        file.flush().await?;
        drop(file);

        if let (Some(expected), Some(hasher)) = (expected, hasher) {
            let observed = hasher.finalize();
            if observed != expected.digest {
                return Err(BundleError::integrity(
                    &id.name,
                    &id.version,
                    &format!(
                        "expected {}-{}, got {}-{}",
                        expected.algorithm().name(),
                        hex::encode(&expected.digest),
                        expected.algorithm().name(),
                        hex::encode(&observed)
                    ),
                ));
            }
        }

        let bytes = reported_len.unwrap_or(streamed);
        total_bytes.fetch_add(bytes, Ordering::Relaxed);

        self.observer.package_downloaded(&id.name, &id.version, bytes);
        tracing::debug!(package = %id, bytes, "downloaded");

        Ok(())
    }
}

/// Delete the staging directory recursively. Missing directory is fine.
pub fn cleanup(staging_dir: &Path) -> Result<(), BundleError> {
    match std::fs::remove_dir_all(staging_dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Digest algorithms the registry publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    fn from_sri_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            "sha384" => Some(Self::Sha384),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }
}

/// The digest an artifact is expected to match.
#[derive(Debug, Clone)]
pub struct ExpectedDigest {
    algorithm: DigestAlgorithm,
    digest: Vec<u8>,
}

impl ExpectedDigest {
    /// Pick the digest to verify for an artifact: the SRI `integrity` field
    /// when present and parseable, otherwise the legacy hex `shasum`.
    #[must_use]
    pub fn for_artifact(artifact: &Artifact) -> Option<Self> {
        if let Some(sri) = artifact.integrity.as_deref() {
            if let Some(parsed) = Self::parse_sri(sri) {
                return Some(parsed);
            }
        }

        let shasum = artifact.shasum.as_deref()?;
        let digest = hex::decode(shasum.trim()).ok()?;
        (digest.len() == 20).then_some(Self {
            algorithm: DigestAlgorithm::Sha1,
            digest,
        })
    }

    /// Parse an SRI string like `sha512-<base64>`, taking the first entry
    /// with a recognized algorithm. Trailing `?options` are ignored.
    fn parse_sri(sri: &str) -> Option<Self> {
        for entry in sri.split_whitespace() {
            let Some((prefix, rest)) = entry.split_once('-') else {
                continue;
            };
            let Some(algorithm) = DigestAlgorithm::from_sri_prefix(prefix) else {
                continue;
            };
            let b64 = rest.split('?').next().unwrap_or(rest);
            if let Ok(digest) = base64::engine::general_purpose::STANDARD.decode(b64) {
                return Some(Self { algorithm, digest });
            }
        }
        None
    }

    #[must_use]
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }
}

/// Incremental hasher matching the published algorithm.
enum Hasher {
    Sha1(Sha1),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl Hasher {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Sha1 => Self::Sha1(Sha1::new()),
            DigestAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            DigestAlgorithm::Sha384 => Self::Sha384(Sha384::new()),
            DigestAlgorithm::Sha512 => Self::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha1(h) => sha1::Digest::update(h, data),
            Self::Sha256(h) => h.update(data),
            Self::Sha384(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha1(h) => sha1::Digest::finalize(h).to_vec(),
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Sha384(h) => h.finalize().to_vec(),
            Self::Sha512(h) => h.finalize().to_vec(),
        }
    }
}
