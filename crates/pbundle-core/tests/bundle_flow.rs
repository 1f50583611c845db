//! End-to-end pipeline tests against a mock registry.
//!
//! The mock serves packuments and tarballs over a local axum server, so the
//! resolution and download engines run exactly as they would against a real
//! registry, without network access.

use pbundle_core::{codes, pipeline, BundleConfig, HttpOptions, PackageSpec, Severity};

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

struct RegistryState {
    packuments: HashMap<String, Value>,
    tarball: Vec<u8>,
    metadata_hits: AtomicUsize,
}

async fn packument_handler(
    State(state): State<Arc<RegistryState>>,
    AxumPath(name): AxumPath<String>,
) -> impl IntoResponse {
    state.metadata_hits.fetch_add(1, Ordering::SeqCst);
    match state.packuments.get(&name) {
        Some(packument) => Json(packument.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "Not found"}))).into_response(),
    }
}

async fn tarball_handler(State(state): State<Arc<RegistryState>>) -> impl IntoResponse {
    state.tarball.clone()
}

/// A small but valid gzipped tarball, identical for every package.
fn make_tarball() -> Vec<u8> {
    let mut tar_bytes = Vec::new();
    {
        let mut builder = tar::Builder::new(&mut tar_bytes);
        let data = br#"{"name":"fixture","version":"1.0.0"}"#;
        let mut header = tar::Header::new_gnu();
        header.set_path("package/package.json").unwrap();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, &data[..]).unwrap();
        builder.finish().unwrap();
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar_bytes).unwrap();
    encoder.finish().unwrap()
}

fn sha1_hex(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

/// Build one version record. `shasum` of `None` means "the correct digest".
fn version_record(
    base_url: &str,
    name: &str,
    version: &str,
    deps: &[(&str, &str)],
    shasum: Option<&str>,
    tarball: &[u8],
) -> Value {
    let deps: serde_json::Map<String, Value> = deps
        .iter()
        .map(|(k, v)| ((*k).to_string(), json!(v)))
        .collect();

    json!({
        "name": name,
        "version": version,
        "dist": {
            "tarball": format!("{base_url}tarballs/{}-{version}.tgz", name.replace('/', "-")),
            "shasum": shasum.map_or_else(|| sha1_hex(tarball), String::from),
        },
        "dependencies": deps,
    })
}

struct MockRegistry {
    state: Arc<RegistryState>,
    base_url: String,
}

impl MockRegistry {
    fn hits(&self) -> usize {
        self.state.metadata_hits.load(Ordering::SeqCst)
    }
}

/// Start a mock registry serving the given packument builder output.
async fn start_registry(
    build: impl FnOnce(&str, &[u8]) -> HashMap<String, Value>,
) -> MockRegistry {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}/", listener.local_addr().unwrap());

    let tarball = make_tarball();
    let state = Arc::new(RegistryState {
        packuments: build(&base_url, &tarball),
        tarball,
        metadata_hits: AtomicUsize::new(0),
    });

    let app = Router::new()
        .route("/tarballs/:file", get(tarball_handler))
        .route("/:name", get(packument_handler))
        .with_state(Arc::clone(&state));

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockRegistry { state, base_url }
}

fn test_config(working_dir: &Path, registry: &MockRegistry) -> BundleConfig {
    BundleConfig {
        working_dir: working_dir.to_path_buf(),
        archive: false,
        use_cache: false,
        http: HttpOptions {
            registry: Some(registry.base_url.clone()),
            ..HttpOptions::default()
        },
        ..BundleConfig::default()
    }
}

fn specs(list: &[&str]) -> Vec<PackageSpec> {
    list.iter().map(|s| PackageSpec::parse(s).unwrap()).collect()
}

fn staged_files(staging_dir: &Path) -> Vec<String> {
    let mut files = Vec::new();
    collect_files(staging_dir, &mut files);
    files.sort();
    files
}

fn collect_files(dir: &Path, out: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out);
        } else {
            out.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
}

/// A graph with both a diamond (a -> b -> d, a -> c -> d) and a cycle
/// (d -> a) resolves every distinct (name, version) exactly once.
fn diamond_cycle_graph(base_url: &str, tarball: &[u8]) -> HashMap<String, Value> {
    let mut packuments = HashMap::new();
    for (name, deps) in [
        ("a", vec![("b", "1.0.0"), ("c", "1.0.0")]),
        ("b", vec![("d", "^1.0.0")]),
        ("c", vec![("d", "^1.0.0")]),
        ("d", vec![("a", "1.0.0")]),
    ] {
        packuments.insert(
            name.to_string(),
            json!({
                "name": name,
                "dist-tags": { "latest": "1.0.0" },
                "versions": {
                    "1.0.0": version_record(base_url, name, "1.0.0", &deps, None, tarball),
                },
            }),
        );
    }
    packuments
}

#[tokio::test(flavor = "multi_thread")]
async fn cycle_and_diamond_download_each_version_once() {
    let registry = start_registry(diamond_cycle_graph).await;
    let dir = tempdir().unwrap();
    let config = test_config(dir.path(), &registry);

    let summary = pipeline::run(&config, &specs(&["a@1.0.0"]), &pbundle_core::NoopObserver)
        .await
        .unwrap();

    assert_eq!(summary.downloaded, 4);
    assert_eq!(
        staged_files(&config.staging_dir()),
        vec!["a-1.0.0.tgz", "b-1.0.0.tgz", "c-1.0.0.tgz", "d-1.0.0.tgz"]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn caret_range_selects_max_satisfying() {
    let registry = start_registry(|base_url, tarball| {
        let versions: serde_json::Map<String, Value> = ["1.1.0", "1.2.0", "1.2.5", "2.0.0"]
            .iter()
            .map(|v| {
                (
                    (*v).to_string(),
                    version_record(base_url, "p", v, &[], None, tarball),
                )
            })
            .collect();
        HashMap::from([(
            "p".to_string(),
            json!({
                "name": "p",
                "dist-tags": { "latest": "2.0.0" },
                "versions": versions,
            }),
        )])
    })
    .await;

    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path(), &registry);
    config.flat = true;

    pipeline::run(&config, &specs(&["p@^1.2.0"]), &pbundle_core::NoopObserver)
        .await
        .unwrap();

    assert_eq!(staged_files(&config.staging_dir()), vec!["p-1.2.5.tgz"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn exact_published_literal_resolves_when_range_is_invalid() {
    let registry = start_registry(|base_url, tarball| {
        HashMap::from([(
            "odd".to_string(),
            json!({
                "name": "odd",
                "dist-tags": { "latest": "1.0.0" },
                "versions": {
                    "1.0.0": version_record(base_url, "odd", "1.0.0", &[], None, tarball),
                    "0.5.0-dev.aug+2016":
                        version_record(base_url, "odd", "0.5.0-dev.aug+2016", &[], None, tarball),
                },
            }),
        )])
    })
    .await;

    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path(), &registry);
    config.flat = true;

    pipeline::run(
        &config,
        &specs(&["odd@0.5.0-dev.aug+2016"]),
        &pbundle_core::NoopObserver,
    )
    .await
    .unwrap();

    assert_eq!(
        staged_files(&config.staging_dir()),
        vec!["odd-0.5.0-dev.aug+2016.tgz"]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn root_not_found_is_fatal() {
    let registry = start_registry(diamond_cycle_graph).await;
    let dir = tempdir().unwrap();
    let config = test_config(dir.path(), &registry);

    let err = pipeline::run(&config, &specs(&["ghost"]), &pbundle_core::NoopObserver)
        .await
        .unwrap_err();
    assert_eq!(err.code(), codes::NOT_FOUND);
    assert!(!config.staging_dir().exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn transitive_not_found_is_isolated() {
    let registry = start_registry(|base_url, tarball| {
        HashMap::from([
            (
                "top".to_string(),
                json!({
                    "name": "top",
                    "dist-tags": { "latest": "1.0.0" },
                    "versions": {
                        "1.0.0": version_record(
                            base_url,
                            "top",
                            "1.0.0",
                            &[("ghost", "^1.0.0"), ("real", "1.0.0")],
                            None,
                            tarball,
                        ),
                    },
                }),
            ),
            (
                "real".to_string(),
                json!({
                    "name": "real",
                    "dist-tags": { "latest": "1.0.0" },
                    "versions": {
                        "1.0.0": version_record(base_url, "real", "1.0.0", &[], None, tarball),
                    },
                }),
            ),
        ])
    })
    .await;

    let dir = tempdir().unwrap();
    let config = test_config(dir.path(), &registry);

    let summary = pipeline::run(&config, &specs(&["top"]), &pbundle_core::NoopObserver)
        .await
        .unwrap();

    assert_eq!(summary.downloaded, 2);
    assert_eq!(
        staged_files(&config.staging_dir()),
        vec!["real-1.0.0.tgz", "top-1.0.0.tgz"]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn populated_cache_yields_empty_result_without_fetches() {
    let registry = start_registry(diamond_cycle_graph).await;
    let dir = tempdir().unwrap();

    let mut config = test_config(dir.path(), &registry);
    config.archive = true;
    config.use_cache = true;
    config.out_file = Some(dir.path().join("first.tgz"));

    let roots = specs(&["a@1.0.0"]);

    pipeline::run(&config, &roots, &pbundle_core::NoopObserver)
        .await
        .unwrap();
    assert!(config.cache_file().exists());
    assert!(dir.path().join("first.tgz").exists());

    let hits_after_first = registry.hits();

    let mut second = test_config(dir.path(), &registry);
    second.archive = true;
    second.use_cache = true;
    second.out_file = Some(dir.path().join("second.tgz"));

    let err = pipeline::run(&second, &roots, &pbundle_core::NoopObserver)
        .await
        .unwrap_err();

    assert_eq!(err.code(), codes::EMPTY_RESULT);
    assert_eq!(err.severity(), Severity::Info);
    assert!(err.message().contains("--no-cache"));
    assert_eq!(registry.hits(), hits_after_first, "no fetches on cached run");
    assert!(!dir.path().join("second.tgz").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn integrity_mismatch_rejects_artifact_but_not_siblings() {
    let registry = start_registry(|base_url, tarball| {
        HashMap::from([
            (
                "good".to_string(),
                json!({
                    "name": "good",
                    "dist-tags": { "latest": "1.0.0" },
                    "versions": {
                        "1.0.0": version_record(base_url, "good", "1.0.0", &[], None, tarball),
                    },
                }),
            ),
            (
                "bad".to_string(),
                json!({
                    "name": "bad",
                    "dist-tags": { "latest": "1.0.0" },
                    "versions": {
                        "1.0.0": version_record(
                            base_url,
                            "bad",
                            "1.0.0",
                            &[],
                            // Well-formed sha1 that cannot match the payload.
                            Some("0000000000000000000000000000000000000000"),
                            tarball,
                        ),
                    },
                }),
            ),
        ])
    })
    .await;

    let dir = tempdir().unwrap();
    let config = test_config(dir.path(), &registry);

    let err = pipeline::run(
        &config,
        &specs(&["good@1.0.0", "bad@1.0.0"]),
        &pbundle_core::NoopObserver,
    )
    .await
    .unwrap_err();

    assert_eq!(err.code(), codes::DOWNLOAD_FAILED);
    assert!(err.message().contains("bad@1.0.0"));

    // The failed artifact is not on disk; the sibling completed anyway.
    assert_eq!(staged_files(&config.staging_dir()), vec!["good-1.0.0.tgz"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrency_limit_does_not_change_outcome() {
    let mut sets = Vec::new();

    for concurrency in [1, 100] {
        let registry = start_registry(diamond_cycle_graph).await;
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path(), &registry);
        config.concurrency = Some(concurrency);

        pipeline::run(&config, &specs(&["a@1.0.0"]), &pbundle_core::NoopObserver)
            .await
            .unwrap();

        sets.push(staged_files(&config.staging_dir()));
    }

    assert_eq!(sets[0], sets[1]);
}

#[tokio::test(flavor = "multi_thread")]
async fn preexisting_staging_dir_aborts_with_zero_requests() {
    let registry = start_registry(diamond_cycle_graph).await;
    let dir = tempdir().unwrap();
    let config = test_config(dir.path(), &registry);
    std::fs::create_dir(config.staging_dir()).unwrap();

    let err = pipeline::run(&config, &specs(&["a@1.0.0"]), &pbundle_core::NoopObserver)
        .await
        .unwrap_err();

    assert_eq!(err.code(), codes::PREFLIGHT);
    assert_eq!(registry.hits(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn archive_run_produces_tgz_and_removes_staging() {
    let registry = start_registry(diamond_cycle_graph).await;
    let dir = tempdir().unwrap();

    let mut config = test_config(dir.path(), &registry);
    config.archive = true;
    config.out_file = Some(dir.path().join("bundle.tgz"));

    let summary = pipeline::run(&config, &specs(&["a@1.0.0"]), &pbundle_core::NoopObserver)
        .await
        .unwrap();

    assert_eq!(summary.archive, Some(dir.path().join("bundle.tgz")));
    assert_eq!(summary.staged, None);
    assert!(dir.path().join("bundle.tgz").exists());
    assert!(!config.staging_dir().exists());
}
