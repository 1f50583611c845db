//! Registry client and packument types.

use crate::error::BundleError;
use crate::spec::url_encoded_name;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Default registry URL.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// Connect timeout for registry requests.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Total timeout for a metadata request.
const METADATA_TIMEOUT_SECS: u64 = 30;

/// Package metadata as returned by the registry for one name.
#[derive(Debug, Clone, Deserialize)]
pub struct Packument {
    #[serde(default)]
    pub name: String,
    /// Published versions, keyed by version string.
    #[serde(default)]
    pub versions: BTreeMap<String, VersionRecord>,
    /// Named pointers to specific versions ("latest", "next", ...).
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: BTreeMap<String, String>,
}

impl Packument {
    /// Published version strings, ascending lexical order of the map.
    #[must_use]
    pub fn version_strings(&self) -> Vec<String> {
        self.versions.keys().cloned().collect()
    }

    /// Target of the `latest` dist-tag.
    #[must_use]
    pub fn latest(&self) -> Option<&str> {
        self.dist_tags.get("latest").map(String::as_str)
    }
}

/// One published version of a package.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionRecord {
    pub name: String,
    pub version: String,
    pub dist: Dist,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(rename = "devDependencies", default)]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(rename = "optionalDependencies", default)]
    pub optional_dependencies: BTreeMap<String, String>,
}

/// Artifact location and published digests.
#[derive(Debug, Clone, Deserialize)]
pub struct Dist {
    pub tarball: String,
    /// SRI digest ("sha512-<base64>"), present on newer records.
    #[serde(default)]
    pub integrity: Option<String>,
    /// Legacy hex sha1, present on effectively all records.
    #[serde(default)]
    pub shasum: Option<String>,
}

/// Credentials attached to every registry and tarball request.
#[derive(Debug, Clone)]
pub enum Auth {
    /// Pre-encoded `user:pass` base64 payload.
    Basic(String),
    /// Bearer token.
    Token(String),
}

/// Transport configuration shared by metadata and tarball requests.
#[derive(Debug, Clone, Default)]
pub struct HttpOptions {
    /// Registry base URL; `None` means [`DEFAULT_REGISTRY`].
    pub registry: Option<String>,
    /// Outbound HTTP(S) proxy.
    pub proxy: Option<String>,
    /// Authorization credentials.
    pub auth: Option<Auth>,
    /// Skip TLS certificate verification.
    pub insecure: bool,
}

/// Registry client for fetching package metadata.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: Url,
    http: Client,
}

impl RegistryClient {
    /// Create a client from transport options.
    ///
    /// # Errors
    /// Returns an error if the registry URL is invalid or the HTTP client
    /// cannot be constructed.
    pub fn new(options: &HttpOptions) -> Result<Self, BundleError> {
        let mut base = options
            .registry
            .clone()
            .unwrap_or_else(|| DEFAULT_REGISTRY.to_string());
        if !base.ends_with('/') {
            base.push('/');
        }

        let base_url = Url::parse(&base)
            .map_err(|e| BundleError::registry(format!("Invalid registry URL '{base}': {e}")))?;

        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(concat!("pbundle/", env!("CARGO_PKG_VERSION")));

        if let Some(auth) = &options.auth {
            let value = match auth {
                Auth::Basic(payload) => format!("Basic {payload}"),
                Auth::Token(token) => format!("Bearer {token}"),
            };
            let mut headers = reqwest::header::HeaderMap::new();
            let mut value = reqwest::header::HeaderValue::from_str(&value)
                .map_err(|e| BundleError::registry(format!("Invalid auth credentials: {e}")))?;
            value.set_sensitive(true);
            headers.insert(reqwest::header::AUTHORIZATION, value);
            builder = builder.default_headers(headers);
        }

        if let Some(proxy) = &options.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| BundleError::registry(format!("Invalid proxy '{proxy}': {e}")))?;
            builder = builder.proxy(proxy);
        }

        if options.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder
            .build()
            .map_err(|e| BundleError::registry(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { base_url, http })
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Get the HTTP client, for reuse in tarball downloads.
    #[must_use]
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Fetch the packument for a package name.
    ///
    /// # Errors
    /// Returns `NOT_FOUND` on HTTP 404, `REGISTRY` on other non-success
    /// statuses or undecodable bodies, `NETWORK` on transport failures.
    pub async fn fetch_packument(&self, name: &str) -> Result<Packument, BundleError> {
        let url = self
            .base_url
            .join(&url_encoded_name(name))
            .map_err(|e| BundleError::registry(format!("Failed to build URL for '{name}': {e}")))?;

        let response = self
            .http
            .get(url.as_str())
            .timeout(Duration::from_secs(METADATA_TIMEOUT_SECS))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BundleError::not_found(name));
        }

        if !response.status().is_success() {
            return Err(BundleError::registry(format!(
                "Registry returned status {} for '{name}'",
                response.status()
            )));
        }

        let packument: Packument = response.json().await?;

        if packument.versions.is_empty() {
            return Err(BundleError::registry(format!(
                "Registry response for '{name}' has no versions"
            )));
        }

        Ok(packument)
    }
}
