//! Root manifest (package.json) dependency extraction.
//!
//! When no specifiers are given on the command line, the dependency maps of
//! the local package.json become the root specifiers.

use crate::error::BundleError;
use crate::spec::PackageSpec;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Read root specifiers from a package.json file.
///
/// `dependencies` are always included; `devDependencies` and
/// `optionalDependencies` only when the corresponding flag is set.
/// `dependencies` take precedence on name collisions.
///
/// # Errors
/// Returns `MANIFEST` if the file is missing, unreadable, or not a JSON
/// object.
pub fn read_manifest_specs(
    path: &Path,
    include_dev: bool,
    include_optional: bool,
) -> Result<Vec<PackageSpec>, BundleError> {
    let content = fs::read_to_string(path).map_err(|e| {
        BundleError::manifest(format!("Failed to read {}: {e}", path.display()))
    })?;

    let json: Value = serde_json::from_str(&content)
        .map_err(|e| BundleError::manifest(format!("Invalid JSON in {}: {e}", path.display())))?;

    let root = json
        .as_object()
        .ok_or_else(|| BundleError::manifest("package.json must be a JSON object"))?;

    let mut merged: BTreeMap<String, String> = BTreeMap::new();

    if include_optional {
        extract_section(root, "optionalDependencies", &mut merged);
    }
    if include_dev {
        extract_section(root, "devDependencies", &mut merged);
    }
    extract_section(root, "dependencies", &mut merged);

    Ok(merged
        .into_iter()
        .map(|(name, range)| PackageSpec::new(name, Some(range)))
        .collect())
}

fn extract_section(
    root: &serde_json::Map<String, Value>,
    section: &str,
    merged: &mut BTreeMap<String, String>,
) {
    let Some(deps) = root.get(section).and_then(Value::as_object) else {
        return;
    };

    for (name, range) in deps {
        if let Some(range) = range.as_str() {
            merged.insert(name.clone(), range.to_string());
        } else {
            tracing::warn!(name = %name, section, "skipping non-string dependency range");
        }
    }
}
