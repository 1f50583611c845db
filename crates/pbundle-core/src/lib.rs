#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::struct_excessive_bools)]

//! Core engine for pbundle.
//!
//! Resolves package specifiers against an npm-style registry, walks the
//! transitive dependency graph, downloads the deduplicated set of tarballs
//! with inline integrity verification, and optionally archives the result.

pub mod archive;
pub mod cache;
pub mod config;
pub mod download;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod resolve;
pub mod spec;
pub mod version;

pub use archive::create_archive;
pub use cache::{ResolutionCache, CACHE_FILE};
pub use config::{
    BundleConfig, DEFAULT_DOWNLOAD_CONCURRENCY, DEFAULT_RESOLVE_CONCURRENCY,
    STAGING_DIR_ARCHIVED, STAGING_DIR_KEPT,
};
pub use download::{cleanup, tarball_path, DownloadOutcome, Downloader, ExpectedDigest};
pub use error::{codes, BundleError, Severity};
pub use manifest::read_manifest_specs;
pub use pipeline::{run, BundleSummary};
pub use progress::{BundleObserver, NoopObserver};
pub use registry::{Auth, HttpOptions, Packument, RegistryClient, VersionRecord, DEFAULT_REGISTRY};
pub use resolve::{Artifact, DownloadSet, PackageId, Resolver};
pub use spec::PackageSpec;
pub use version::{max_satisfying, select_version};
