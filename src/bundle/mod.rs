//! Skill bundles
//!
//! A bundle is a named, versioned gzip tarball holding a skill payload with a
//! `SKILL.md` manifest at its root. This module handles:
//! - Parsing bundle references (`name` or `name@version`)
//! - Reading manifests and payload listings from archives
//! - Resolving references to archives through the registry

use eyre::Result;
use lazy_regex::regex_is_match;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub mod archive;
pub mod manifest;
pub mod registry;

use manifest::BundleManifest;

/// A request to install a bundle, optionally pinned to a version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRef {
    pub name: String,
    pub version: Option<String>,
}

impl FromStr for BundleRef {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        let (name, version) = match s.split_once('@') {
            Some((name, version)) => (name.trim(), Some(version.trim())),
            None => (s.trim(), None),
        };

        if !is_valid_name(name) {
            eyre::bail!("Invalid bundle name: '{}'", name);
        }
        if let Some(v) = version
            && !is_valid_version(v)
        {
            eyre::bail!("Invalid version for bundle '{}': '{}'", name, v);
        }

        Ok(Self {
            name: name.to_string(),
            version: version.map(str::to_string),
        })
    }
}

impl fmt::Display for BundleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}@{}", self.name, v),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Where a resolved archive came from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BundleSource {
    /// Found in the local source directory
    Local { path: PathBuf },
    /// Downloaded from the remote base URL into the cache
    Remote { url: String, path: PathBuf },
}

impl BundleSource {
    pub fn archive_path(&self) -> &Path {
        match self {
            BundleSource::Local { path } | BundleSource::Remote { path, .. } => path,
        }
    }
}

impl fmt::Display for BundleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleSource::Local { path } => write!(f, "{}", path.display()),
            BundleSource::Remote { url, .. } => write!(f, "{}", url),
        }
    }
}

/// A resolved bundle, ready for extraction
#[derive(Debug, Clone)]
pub struct Bundle {
    pub name: String,
    pub version: String,
    pub source: BundleSource,
    pub manifest: BundleManifest,
    /// Payload entries relative to the archive root, in archive order
    pub payload: Vec<PathBuf>,
}

impl Bundle {
    pub fn archive_path(&self) -> &Path {
        self.source.archive_path()
    }

    /// Whether the payload declares dependencies for the runtime's package installer
    pub fn has_dependency_declaration(&self) -> bool {
        self.manifest.dependencies.is_some()
    }
}

/// Canonical archive file name for a bundle version
pub fn archive_file_name(name: &str, version: &str) -> String {
    format!("{}-v{}.tar.gz", name, version)
}

/// Extract the version from `{name}-v{version}.tar.gz` (or `.tgz`) if the file belongs to `name`
pub fn version_from_file_name(name: &str, file_name: &str) -> Option<String> {
    let rest = file_name.strip_prefix(name)?.strip_prefix("-v")?;
    let version = rest.strip_suffix(".tar.gz").or_else(|| rest.strip_suffix(".tgz"))?;
    is_valid_version(version).then(|| version.to_string())
}

pub fn is_valid_name(name: &str) -> bool {
    regex_is_match!(r"^[A-Za-z0-9][A-Za-z0-9._-]*$", name)
}

pub fn is_valid_version(version: &str) -> bool {
    regex_is_match!(r"^\d+(\.\d+)*(-[0-9A-Za-z.-]+)?$", version)
}

/// Order two version strings: numeric components first, then a release sorts above its pre-release
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (a_core, a_pre) = split_pre_release(a);
    let (b_core, b_pre) = split_pre_release(b);

    let a_parts: Vec<u64> = a_core.split('.').map(|p| p.parse().unwrap_or(0)).collect();
    let b_parts: Vec<u64> = b_core.split('.').map(|p| p.parse().unwrap_or(0)).collect();
    let len = a_parts.len().max(b_parts.len());

    for i in 0..len {
        let x = a_parts.get(i).copied().unwrap_or(0);
        let y = b_parts.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }

    match (a_pre, b_pre) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => x.cmp(y),
    }
}

fn split_pre_release(version: &str) -> (&str, Option<&str>) {
    match version.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (version, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bundle_ref() {
        let r: BundleRef = "web-hunter".parse().unwrap();
        assert_eq!(r.name, "web-hunter");
        assert_eq!(r.version, None);

        let r: BundleRef = "code-ninja@2.1.0".parse().unwrap();
        assert_eq!(r.name, "code-ninja");
        assert_eq!(r.version.as_deref(), Some("2.1.0"));
        assert_eq!(r.to_string(), "code-ninja@2.1.0");
    }

    #[test]
    fn test_parse_bundle_ref_rejects_bad_input() {
        assert!("../etc".parse::<BundleRef>().is_err());
        assert!("".parse::<BundleRef>().is_err());
        assert!("alpha@latest".parse::<BundleRef>().is_err());
        assert!("a/b".parse::<BundleRef>().is_err());
    }

    #[test]
    fn test_version_from_file_name() {
        assert_eq!(
            version_from_file_name("alpha", "alpha-v1.2.0.tar.gz").as_deref(),
            Some("1.2.0")
        );
        assert_eq!(version_from_file_name("alpha", "alpha-v0.9.tgz").as_deref(), Some("0.9"));
        assert_eq!(
            version_from_file_name("alpha", "alpha-v2.0.0-rc.1.tar.gz").as_deref(),
            Some("2.0.0-rc.1")
        );
        assert_eq!(version_from_file_name("alpha", "alpha-beta-v1.0.0.tar.gz"), None);
        assert_eq!(version_from_file_name("alpha", "alpha-v1.0.0.zip"), None);
        assert_eq!(version_from_file_name("alpha", "alpha.tar.gz"), None);
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("1.0.0", "1.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.10.0", "1.9.3"), Ordering::Greater);
        assert_eq!(compare_versions("1.0", "1.0.1"), Ordering::Less);
        assert_eq!(compare_versions("2.0.0-rc.1", "2.0.0"), Ordering::Less);
        assert_eq!(compare_versions("2.0.0", "1.99.99"), Ordering::Greater);
    }

    #[test]
    fn test_archive_file_name() {
        assert_eq!(archive_file_name("beta", "0.3.1"), "beta-v0.3.1.tar.gz");
    }
}
