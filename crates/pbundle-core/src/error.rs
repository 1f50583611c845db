//! Bundle error types.

use std::fmt;
use std::io;

/// Bundle error codes.
pub mod codes {
    pub const SPEC_INVALID: &str = "SPEC_INVALID";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VERSION_NOT_FOUND: &str = "VERSION_NOT_FOUND";
    pub const REGISTRY: &str = "REGISTRY";
    pub const NETWORK: &str = "NETWORK";
    pub const INTEGRITY: &str = "INTEGRITY";
    pub const PREFLIGHT: &str = "PREFLIGHT";
    pub const CACHE: &str = "CACHE";
    pub const MANIFEST: &str = "MANIFEST";
    pub const ARCHIVE: &str = "ARCHIVE";
    pub const DOWNLOAD_FAILED: &str = "DOWNLOAD_FAILED";
    pub const IO: &str = "IO";
    pub const EMPTY_RESULT: &str = "EMPTY_RESULT";
}

/// How an error should be reported to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Informational stop (e.g. nothing left to download).
    Info,
    /// Branch-level problem that did not stop the run.
    Warn,
    /// Run-level failure.
    Error,
}

/// Bundle error.
#[derive(Debug, Clone)]
pub struct BundleError {
    code: &'static str,
    severity: Severity,
    message: String,
}

impl BundleError {
    /// Create a new error with the given code and message.
    #[must_use]
    pub fn new(code: &'static str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
        }
    }

    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Get the reporting severity.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Create a spec invalid error.
    pub fn spec_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::SPEC_INVALID, Severity::Error, msg)
    }

    /// Create a package not found error.
    #[must_use]
    pub fn not_found(name: &str) -> Self {
        Self::new(
            codes::NOT_FOUND,
            Severity::Error,
            format!("Unable to find package \"{name}\""),
        )
    }

    /// Create a version not found error.
    #[must_use]
    pub fn version_not_found(name: &str, range: &str) -> Self {
        Self::new(
            codes::VERSION_NOT_FOUND,
            Severity::Error,
            format!("Unable to find version {range} in {name}"),
        )
    }

    /// Create a registry error.
    pub fn registry(msg: impl Into<String>) -> Self {
        Self::new(codes::REGISTRY, Severity::Error, msg)
    }

    /// Create a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::new(codes::NETWORK, Severity::Error, msg)
    }

    /// Create an integrity error.
    #[must_use]
    pub fn integrity(name: &str, version: &str, detail: &str) -> Self {
        Self::new(
            codes::INTEGRITY,
            Severity::Error,
            format!("Integrity check failed for {name}@{version}: {detail}"),
        )
    }

    /// Create a pre-flight error.
    pub fn preflight(msg: impl Into<String>) -> Self {
        Self::new(codes::PREFLIGHT, Severity::Error, msg)
    }

    /// Create a cache error.
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::new(codes::CACHE, Severity::Error, msg)
    }

    /// Create a manifest error.
    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::new(codes::MANIFEST, Severity::Error, msg)
    }

    /// Create an archive error.
    pub fn archive(msg: impl Into<String>) -> Self {
        Self::new(codes::ARCHIVE, Severity::Error, msg)
    }

    /// Create a download failed error.
    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::DOWNLOAD_FAILED, Severity::Error, msg)
    }

    /// Create an informational empty-result stop.
    pub fn empty_result(msg: impl Into<String>) -> Self {
        Self::new(codes::EMPTY_RESULT, Severity::Info, msg)
    }
}

impl fmt::Display for BundleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for BundleError {}

impl From<io::Error> for BundleError {
    fn from(e: io::Error) -> Self {
        Self::new(codes::IO, Severity::Error, e.to_string())
    }
}

impl From<reqwest::Error> for BundleError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::network(format!("Request timed out: {e}"))
        } else if e.is_connect() {
            Self::network(format!("Connection failed: {e}"))
        } else if e.is_decode() {
            Self::registry(format!("Invalid registry response: {e}"))
        } else {
            Self::network(e.to_string())
        }
    }
}
