//! Semantic version ordering.
//!
//! Precedence follows semver: major, minor and patch compare numerically, and
//! a pre-release tag ranks below the same core without one. Build metadata
//! does not take part in precedence.

use crate::utils::errors::{Result, UpdateError};
use semver::Version;
use std::cmp::Ordering;

/// Parse a `major.minor.patch[-pre][+build]` string.
pub fn parse_version(input: &str) -> Result<Version> {
    Version::parse(input.trim()).map_err(|e| UpdateError::VersionParse {
        version: input.to_string(),
        reason: e.to_string(),
    })
}

/// Compare two version strings. Fails if either side is not a valid version.
pub fn compare(a: &str, b: &str) -> Result<Ordering> {
    let a = parse_version(a)?;
    let b = parse_version(b)?;
    Ok(compare_versions(&a, &b))
}

pub fn compare_versions(a: &Version, b: &Version) -> Ordering {
    a.major
        .cmp(&b.major)
        .then(a.minor.cmp(&b.minor))
        .then(a.patch.cmp(&b.patch))
        .then_with(|| a.pre.cmp(&b.pre))
}

/// Next patch release, dropping any pre-release and build metadata.
pub fn bump_patch(version: &Version) -> Version {
    Version::new(version.major, version.minor, version.patch + 1)
}
