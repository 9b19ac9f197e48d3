//! Installed-bundle records (`.deya/installed.yaml`)

use eyre::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Outcome of the dependency step for an installed bundle
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DependencyStatus {
    /// Bundle declares no dependencies
    None,
    /// Payload is in place, dependency install has not finished
    Pending,
    Installed,
    Failed { message: String },
}

impl std::fmt::Display for DependencyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyStatus::None => write!(f, "none"),
            DependencyStatus::Pending => write!(f, "pending"),
            DependencyStatus::Installed => write!(f, "installed"),
            DependencyStatus::Failed { message } => write!(f, "failed ({})", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InstalledBundle {
    pub name: String,
    pub version: String,
    pub install_path: PathBuf,
    /// RFC 3339 timestamp
    pub installed_at: String,
    pub dependencies: DependencyStatus,
}

/// All installed bundles in a workspace, keyed by name in install order
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct InstalledState {
    #[serde(default)]
    pub bundles: IndexMap<String, InstalledBundle>,
}

/// Reads and writes the installed-state file
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load state; a missing file is an empty state
    pub fn load(&self) -> Result<InstalledState> {
        if !self.path.exists() {
            return Ok(InstalledState::default());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(InstalledState::default());
        }

        serde_yaml::from_str(&content).with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    /// Replace the state file atomically
    pub fn save(&self, state: &InstalledState) -> Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| eyre::eyre!("State file has no parent: {}", self.path.display()))?;
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

        let yaml = serde_yaml::to_string(state).context("Failed to serialize installed state")?;

        let mut temp = tempfile::NamedTempFile::new_in(dir).context("Failed to create temp state file")?;
        temp.write_all(yaml.as_bytes()).context("Failed to write temp state file")?;
        temp.as_file().sync_all().context("Failed to sync temp state file")?;
        temp.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Option<InstalledBundle>> {
        Ok(self.load()?.bundles.get(name).cloned())
    }

    /// Insert or overwrite the record for `record.name`
    pub fn record(&self, record: InstalledBundle) -> Result<()> {
        let mut state = self.load()?;
        state.bundles.insert(record.name.clone(), record);
        self.save(&state)
    }

    /// Update the dependency status of an existing record
    pub fn set_dependencies(&self, name: &str, status: DependencyStatus) -> Result<()> {
        let mut state = self.load()?;
        let record = state
            .bundles
            .get_mut(name)
            .ok_or_else(|| eyre::eyre!("No install record for '{}'", name))?;
        record.dependencies = status;
        self.save(&state)
    }

    /// Drop the record for `name`, returning it if there was one
    pub fn forget(&self, name: &str) -> Result<Option<InstalledBundle>> {
        let mut state = self.load()?;
        let removed = state.bundles.shift_remove(name);
        if removed.is_some() {
            self.save(&state)?;
        }
        Ok(removed)
    }
}
