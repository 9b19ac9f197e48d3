//! Bundle manifest parsing (SKILL.md front matter)
//!
//! # Format
//!
//! ```markdown
//! ---
//! name: web-hunter
//! description: Search, scrape and fact-check the web
//! version: 1.2.0
//! triggers:
//!   - find emails for
//!   - check this claim
//! dependencies: requirements.txt
//! ---
//!
//! # Web Hunter
//! ...
//! ```

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Manifest file expected at the payload root
pub const MANIFEST_FILE: &str = "SKILL.md";

/// Dependency declaration picked up when the front matter names none
pub const DEFAULT_DEPENDENCY_FILE: &str = "requirements.txt";

/// Metadata from a bundle's SKILL.md front matter
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BundleManifest {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub version: Option<String>,

    /// Phrases the runtime uses to route requests to this bundle (order preserved)
    #[serde(default)]
    pub triggers: Vec<String>,

    /// Dependency declaration file, relative to the payload root
    #[serde(default)]
    pub dependencies: Option<PathBuf>,
}

impl BundleManifest {
    /// Load a manifest from a SKILL.md file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read manifest: {}", path.as_ref().display()))?;
        Self::from_str(&content).with_context(|| format!("Failed to parse front matter in {}", path.as_ref().display()))
    }

    /// Parse the YAML front matter of a SKILL.md document
    pub fn from_str(content: &str) -> Result<Self> {
        let content = content.trim_start_matches('\u{feff}').trim();
        if !content.starts_with("---") {
            eyre::bail!("{} must start with YAML front matter (---)", MANIFEST_FILE);
        }

        let rest = &content[3..];
        let end_pos = rest
            .find("\n---")
            .ok_or_else(|| eyre::eyre!("No closing front matter delimiter (---) found"))?;

        let yaml_content = rest[..end_pos].trim();
        let manifest: Self = serde_yaml::from_str(yaml_content).context("Failed to parse YAML front matter")?;

        if manifest.name.trim().is_empty() {
            eyre::bail!("Manifest name must not be empty");
        }
        if let Some(ref deps) = manifest.dependencies
            && (deps.is_absolute() || deps.components().any(|c| matches!(c, std::path::Component::ParentDir)))
        {
            eyre::bail!("Dependency declaration must stay inside the bundle: {}", deps.display());
        }

        Ok(manifest)
    }

    /// Fill in the conventional dependency file when the payload carries one
    pub fn with_detected_dependencies(mut self, payload: &[PathBuf]) -> Self {
        if self.dependencies.is_none() && payload.iter().any(|p| p == Path::new(DEFAULT_DEPENDENCY_FILE)) {
            self.dependencies = Some(PathBuf::from(DEFAULT_DEPENDENCY_FILE));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_MANIFEST: &str = r#"---
name: web-hunter
description: Search, scrape and fact-check the web
version: 1.2.0
triggers:
  - find emails for
  - check this claim
  - watch the price of
dependencies: requirements.txt
---

# Web Hunter

Use the scripts in `scripts/`.
"#;

    #[test]
    fn test_parse_full_manifest() {
        let manifest = BundleManifest::from_str(FULL_MANIFEST).unwrap();
        assert_eq!(manifest.name, "web-hunter");
        assert_eq!(manifest.version.as_deref(), Some("1.2.0"));
        assert_eq!(manifest.dependencies, Some(PathBuf::from("requirements.txt")));
    }

    #[test]
    fn test_trigger_order_preserved() {
        let manifest = BundleManifest::from_str(FULL_MANIFEST).unwrap();
        assert_eq!(
            manifest.triggers,
            vec!["find emails for", "check this claim", "watch the price of"]
        );
    }

    #[test]
    fn test_parse_minimal_manifest() {
        let manifest = BundleManifest::from_str("---\nname: simple\n---\n# Simple\n").unwrap();
        assert_eq!(manifest.name, "simple");
        assert_eq!(manifest.description, "");
        assert!(manifest.triggers.is_empty());
        assert!(manifest.dependencies.is_none());
    }

    #[test]
    fn test_missing_front_matter() {
        assert!(BundleManifest::from_str("# No Front Matter\n\nJust content").is_err());
    }

    #[test]
    fn test_missing_closing_delimiter() {
        assert!(BundleManifest::from_str("---\nname: broken\n# Missing closing").is_err());
    }

    #[test]
    fn test_missing_name() {
        assert!(BundleManifest::from_str("---\ndescription: nameless\n---\n").is_err());
    }

    #[test]
    fn test_dependency_path_must_stay_inside() {
        let content = "---\nname: escape\ndependencies: ../../etc/requirements.txt\n---\n";
        assert!(BundleManifest::from_str(content).is_err());
    }

    #[test]
    fn test_detected_dependencies() {
        let manifest = BundleManifest::from_str("---\nname: code-ninja\n---\n").unwrap();
        let payload = vec![
            PathBuf::from("SKILL.md"),
            PathBuf::from("requirements.txt"),
            PathBuf::from("scripts/refactor.py"),
        ];
        let manifest = manifest.with_detected_dependencies(&payload);
        assert_eq!(manifest.dependencies, Some(PathBuf::from("requirements.txt")));
    }

    #[test]
    fn test_nested_requirements_not_detected() {
        let manifest = BundleManifest::from_str("---\nname: code-ninja\n---\n").unwrap();
        let payload = vec![PathBuf::from("scripts/requirements.txt")];
        assert!(manifest.with_detected_dependencies(&payload).dependencies.is_none());
    }
}
