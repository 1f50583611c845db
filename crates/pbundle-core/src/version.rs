//! Version selection over published version sets.
//!
//! The range grammar itself is delegated to the `semver` crate; this module
//! adapts npm-flavored syntax (x-ranges, hyphen ranges, `||` alternatives,
//! space-separated comparators) and implements the selection policy:
//! maximum satisfying version first, exact published literal second.

use crate::error::BundleError;
use semver::{Version, VersionReq};

/// Select the version to download for `range` out of `versions`.
///
/// Explicit two-step policy:
/// 1. Treat `range` as a range expression and take the maximum published
///    version satisfying it (pre-releases rank below releases).
/// 2. If that yields nothing (including when `range` does not parse as a
///    range at all), accept `range` verbatim iff it equals a published
///    version string.
///
/// # Errors
/// Returns `VERSION_NOT_FOUND` naming the package and range when both steps
/// fail.
pub fn select_version(
    name: &str,
    versions: &[String],
    range: &str,
) -> Result<String, BundleError> {
    if let Ok(Some(found)) = max_satisfying(versions, range) {
        return Ok(found);
    }

    // Registries publish version strings that are not always valid range
    // expressions (build tags, odd pre-release forms). An exact published
    // literal is accepted as-is.
    if versions.iter().any(|v| v == range) {
        return Ok(range.to_string());
    }

    Err(BundleError::version_not_found(name, range))
}

/// Find the maximum version in `versions` satisfying `range`.
///
/// Returns `Ok(None)` when the range is valid but nothing matches.
///
/// # Errors
/// Returns `SPEC_INVALID` when the range cannot be parsed.
pub fn max_satisfying(versions: &[String], range: &str) -> Result<Option<String>, BundleError> {
    let mut parsed: Vec<Version> = versions
        .iter()
        .filter_map(|v| Version::parse(v).ok())
        .collect();

    // Highest first, so the first match wins.
    parsed.sort_by(|a, b| b.cmp(a));

    let reqs = parse_alternatives(range)?;

    for version in &parsed {
        if reqs.iter().any(|req| req.matches(version)) {
            return Ok(Some(version.to_string()));
        }
    }

    Ok(None)
}

/// Check whether any version in `versions` satisfies `range`.
///
/// Falls back to exact-literal containment when the range does not parse,
/// mirroring `select_version`.
#[must_use]
pub fn any_satisfies(versions: &[String], range: &str) -> bool {
    match max_satisfying(versions, range) {
        Ok(Some(_)) => true,
        Ok(None) => false,
        Err(_) => versions.iter().any(|v| v == range),
    }
}

/// Parse a range into its `||` alternatives.
fn parse_alternatives(range: &str) -> Result<Vec<VersionReq>, BundleError> {
    let mut reqs = Vec::new();

    for alt in range.split("||") {
        let alt = alt.trim();
        if alt.is_empty() {
            continue;
        }
        // Invalid alternatives are skipped as long as at least one parses.
        if let Ok(req) = parse_single_range(alt) {
            reqs.push(req);
        }
    }

    if reqs.is_empty() {
        return Err(BundleError::spec_invalid(format!(
            "Invalid version range '{range}'"
        )));
    }

    Ok(reqs)
}

/// Parse one alternative, handling npm-specific syntax.
fn parse_single_range(range: &str) -> Result<VersionReq, BundleError> {
    let range = range.trim();

    // Hyphen ranges: "1.0.0 - 2.0.0" means ">=1.0.0, <=2.0.0".
    if let Some((start, end)) = split_hyphen_range(range) {
        let converted = format!(">={start}, <={end}");
        return VersionReq::parse(&converted)
            .map_err(|e| BundleError::spec_invalid(format!("Invalid range '{range}': {e}")));
    }

    // X-ranges: "1.x", "1.2.x", "*".
    if range == "*" || range.contains(['x', 'X']) {
        if let Some(converted) = convert_x_range(range) {
            return VersionReq::parse(&converted)
                .map_err(|e| BundleError::spec_invalid(format!("Invalid range '{range}': {e}")));
        }
    }

    // Bare versions: "1.2.3" pins exactly, "1" and "1.2" widen to their
    // x-range. rust-semver would caret-default both.
    if let Some(converted) = convert_bare_version(range) {
        return VersionReq::parse(&converted)
            .map_err(|e| BundleError::spec_invalid(format!("Invalid range '{range}': {e}")));
    }

    // npm allows space-separated comparators to mean AND; rust semver
    // wants commas.
    let converted = join_comparators(range);

    VersionReq::parse(&converted)
        .map_err(|e| BundleError::spec_invalid(format!("Invalid range '{range}': {e}")))
}

fn split_hyphen_range(range: &str) -> Option<(&str, &str)> {
    let (start, end) = range.split_once(" - ")?;
    let (start, end) = (start.trim(), end.trim());
    if start.is_empty() || end.is_empty() {
        return None;
    }
    Some((start, end))
}

fn convert_x_range(range: &str) -> Option<String> {
    if matches!(range, "*" | "x" | "X") {
        return Some(">=0.0.0".to_string());
    }

    let parts: Vec<&str> = range.split('.').collect();

    match parts.as_slice() {
        [major, "x" | "X" | "*"] => {
            let m: u64 = major.parse().ok()?;
            Some(format!(">={m}.0.0, <{}.0.0", m + 1))
        }
        [major, minor, "x" | "X" | "*"] => {
            let m: u64 = major.parse().ok()?;
            let n: u64 = minor.parse().ok()?;
            Some(format!(">={m}.{n}.0, <{m}.{}.0", n + 1))
        }
        _ => None,
    }
}

/// Translate a bare version to its npm meaning: a fully-specified
/// `X.Y.Z[-pre]` is an exact pin, a partial `X` or `X.Y` is the
/// corresponding x-range. Anything carrying an operator returns `None`.
fn convert_bare_version(range: &str) -> Option<String> {
    let bare = range.strip_prefix('v').unwrap_or(range);
    if !bare.chars().next()?.is_ascii_digit() {
        return None;
    }

    if Version::parse(bare).is_ok() {
        // Build metadata is not comparable; the pin ignores it.
        let core = bare.split('+').next().unwrap_or(bare);
        return Some(format!("={core}"));
    }

    let parts: Vec<&str> = bare.split('.').collect();
    match parts.as_slice() {
        [major] => {
            let m: u64 = major.parse().ok()?;
            Some(format!(">={m}.0.0, <{}.0.0", m + 1))
        }
        [major, minor] => {
            let m: u64 = major.parse().ok()?;
            let n: u64 = minor.parse().ok()?;
            Some(format!(">={m}.{n}.0, <{m}.{}.0", n + 1))
        }
        _ => None,
    }
}

/// Rejoin whitespace-separated comparators with commas, keeping operators
/// attached to the version that follows them (">= 1.2.0 < 2.0.0").
fn join_comparators(range: &str) -> String {
    let mut out = String::new();
    let mut pending_op = String::new();

    for token in range.split_whitespace() {
        if token.chars().any(|c| c.is_ascii_digit()) {
            if !out.is_empty() {
                out.push_str(", ");
            }
            out.push_str(&pending_op);
            out.push_str(token);
            pending_op.clear();
        } else {
            // Bare operator; attach it to the next token.
            pending_op.push_str(token);
        }
    }

    if out.is_empty() {
        range.trim().to_string()
    } else {
        out
    }
}
