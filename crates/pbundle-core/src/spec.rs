//! Package specifier parsing.
//!
//! Specifiers take the form `[@scope/]name[@range]`:
//! - `react`
//! - `react@^18.0.0`
//! - `@types/node`
//! - `@types/node@20.0.0`
//!
//! A scoped name is a single opaque token; the `@range` suffix is the only
//! place a second `@` is meaningful.

use crate::error::BundleError;

/// A parsed package specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    /// Full package name, including a leading `@scope/` when scoped.
    pub name: String,
    /// Version range, tag, or exact version. `None` means the latest dist-tag.
    pub range: Option<String>,
}

impl PackageSpec {
    /// Create a spec from already-split parts.
    #[must_use]
    pub fn new(name: impl Into<String>, range: Option<String>) -> Self {
        Self {
            name: name.into(),
            range,
        }
    }

    /// Parse a specifier string.
    ///
    /// # Errors
    /// Returns `SPEC_INVALID` if the specifier is malformed.
    pub fn parse(input: &str) -> Result<Self, BundleError> {
        let input = input.trim();

        if input.is_empty() {
            return Err(BundleError::spec_invalid("Empty package specifier"));
        }

        // Set the leading @ aside so the range delimiter search only sees
        // the inner `name[@range]` portion.
        let (scoped, rest) = match input.strip_prefix('@') {
            Some(rest) => (true, rest),
            None => (false, input),
        };

        if rest.is_empty() {
            return Err(BundleError::spec_invalid(format!(
                "Invalid specifier '{input}': missing package name"
            )));
        }

        let (name_part, range) = match rest.find('@') {
            Some(at) => {
                let range = &rest[at + 1..];
                if range.is_empty() {
                    return Err(BundleError::spec_invalid(format!(
                        "Invalid specifier '{input}': empty version range"
                    )));
                }
                (&rest[..at], Some(range.to_string()))
            }
            None => (rest, None),
        };

        if name_part.is_empty() {
            return Err(BundleError::spec_invalid(format!(
                "Invalid specifier '{input}': empty package name"
            )));
        }

        if scoped {
            let Some((scope, leaf)) = name_part.split_once('/') else {
                return Err(BundleError::spec_invalid(format!(
                    "Invalid scoped specifier '{input}': missing '/'"
                )));
            };
            if scope.is_empty() || leaf.is_empty() {
                return Err(BundleError::spec_invalid(format!(
                    "Invalid scoped specifier '{input}': empty scope or name"
                )));
            }
        } else if name_part.contains('/') {
            return Err(BundleError::spec_invalid(format!(
                "Invalid specifier '{input}': '/' is only valid in scoped names"
            )));
        }

        let name = if scoped {
            format!("@{name_part}")
        } else {
            name_part.to_string()
        };

        Ok(Self { name, range })
    }

    /// Whether the name carries an `@scope/` prefix.
    #[must_use]
    pub fn is_scoped(&self) -> bool {
        self.name.starts_with('@')
    }
}

/// URL-encode a package name for registry requests (`/` becomes `%2f`).
#[must_use]
pub fn url_encoded_name(name: &str) -> String {
    name.replace('/', "%2f")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_name() {
        let spec = PackageSpec::parse("react").unwrap();
        assert_eq!(spec.name, "react");
        assert_eq!(spec.range, None);
        assert!(!spec.is_scoped());
    }

    #[test]
    fn test_parse_name_with_range() {
        let spec = PackageSpec::parse("react@^18.0.0").unwrap();
        assert_eq!(spec.name, "react");
        assert_eq!(spec.range.as_deref(), Some("^18.0.0"));
    }

    #[test]
    fn test_parse_name_with_tag_like_range() {
        let spec = PackageSpec::parse("lodash@4.17.21").unwrap();
        assert_eq!(spec.name, "lodash");
        assert_eq!(spec.range.as_deref(), Some("4.17.21"));
    }

    #[test]
    fn test_parse_scoped() {
        let spec = PackageSpec::parse("@types/node").unwrap();
        assert_eq!(spec.name, "@types/node");
        assert_eq!(spec.range, None);
        assert!(spec.is_scoped());
    }

    #[test]
    fn test_parse_scoped_with_range() {
        let spec = PackageSpec::parse("@types/node@^20").unwrap();
        assert_eq!(spec.name, "@types/node");
        assert_eq!(spec.range.as_deref(), Some("^20"));
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(PackageSpec::parse("").is_err());
        assert!(PackageSpec::parse("   ").is_err());
        assert!(PackageSpec::parse("@").is_err());
    }

    #[test]
    fn test_parse_rejects_empty_range() {
        assert!(PackageSpec::parse("react@").is_err());
        assert!(PackageSpec::parse("@types/node@").is_err());
    }

    #[test]
    fn test_parse_rejects_bad_scoped() {
        assert!(PackageSpec::parse("@scope").is_err());
        assert!(PackageSpec::parse("@scope/").is_err());
        assert!(PackageSpec::parse("@/name").is_err());
    }

    #[test]
    fn test_parse_rejects_slash_in_unscoped() {
        assert!(PackageSpec::parse("some/path").is_err());
    }

    #[test]
    fn test_url_encoded_name() {
        assert_eq!(url_encoded_name("react"), "react");
        assert_eq!(url_encoded_name("@types/node"), "@types%2fnode");
    }
}
