//! Bundle extraction
//!
//! An archive is unpacked into a `.staging-*` directory inside `skills/` and only then
//! renamed to `skills/{name}`. A previous install is moved into a `.previous-*` directory
//! first and deleted only once the install record is written; if the record cannot be
//! written it is moved back. A run killed mid-unpack leaves a stray staging directory and
//! no record; the next run removes it and restores any set-aside install whose slot is empty.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::deps::DependencyInstaller;
use super::state::{DependencyStatus, InstalledBundle, StateStore};
use crate::bundle::Bundle;
use crate::bundle::archive;
use crate::bundle::manifest::MANIFEST_FILE;
use crate::error::{InstallError, Result};
use crate::workspace::Workspace;

const STAGING_PREFIX: &str = ".staging-";
const PREVIOUS_PREFIX: &str = ".previous-";

/// Result of a successful extraction
#[derive(Debug, Clone, Serialize)]
pub struct Extracted {
    pub install_path: PathBuf,
    pub files: usize,
    pub dependencies: DependencyStatus,
}

pub struct Extractor {
    workspace: Workspace,
    store: StateStore,
    deps: DependencyInstaller,
}

impl Extractor {
    pub fn new(workspace: Workspace, deps: DependencyInstaller) -> Self {
        let store = StateStore::new(workspace.installed_file());
        Self {
            workspace,
            store,
            deps,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Extract `bundle` into `skills/{name}`, record it, then run its dependency step.
    ///
    /// Errors are [`InstallError::ExtractionFailed`]; a failed dependency step is reported
    /// through [`Extracted::dependencies`] instead.
    pub fn install(&self, bundle: &Bundle) -> Result<Extracted> {
        let archive_path = bundle.archive_path();
        let skills_dir = self.workspace.skills_dir();
        let target = self.workspace.bundle_dir(&bundle.name);

        // An unreadable state file would fail the record write after the swap
        self.store
            .load()
            .map_err(|e| InstallError::extraction(archive_path, format!("cannot read install records: {:#}", e)))?;

        fs::create_dir_all(&skills_dir).map_err(|e| InstallError::extraction(archive_path, e))?;

        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&skills_dir)
            .map_err(|e| InstallError::extraction(archive_path, e))?;

        let files = archive::unpack_stripped(archive_path, staging.path())
            .map_err(|e| InstallError::extraction(archive_path, format!("{:#}", e)))?;

        if !staging.path().join(MANIFEST_FILE).is_file() {
            return Err(InstallError::extraction(
                archive_path,
                format!("{} missing after unpack", MANIFEST_FILE),
            ));
        }

        let swap = swap_into_place(staging, &skills_dir, &target, &bundle.name)
            .map_err(|e| InstallError::extraction(archive_path, e))?;
        log::info!("Extracted {} v{} into {} ({} files)", bundle.name, bundle.version, target.display(), files);

        let record = InstalledBundle {
            name: bundle.name.clone(),
            version: bundle.version.clone(),
            install_path: target.clone(),
            installed_at: chrono::Utc::now().to_rfc3339(),
            dependencies: if bundle.has_dependency_declaration() {
                DependencyStatus::Pending
            } else {
                DependencyStatus::None
            },
        };
        if let Err(e) = self.store.record(record) {
            swap.roll_back();
            return Err(InstallError::extraction(
                archive_path,
                format!("cannot record install: {:#}", e),
            ));
        }
        swap.commit();

        let dependencies = match bundle.manifest.dependencies.as_deref() {
            Some(declaration) => self.install_dependencies(bundle, &target, declaration),
            None => DependencyStatus::None,
        };

        Ok(Extracted {
            install_path: target,
            files,
            dependencies,
        })
    }

    fn install_dependencies(&self, bundle: &Bundle, target: &Path, declaration: &Path) -> DependencyStatus {
        let status = match self.deps.install(&bundle.name, target, declaration) {
            Ok(()) => DependencyStatus::Installed,
            Err(e) => DependencyStatus::Failed { message: e.to_string() },
        };

        if let Err(e) = self.store.set_dependencies(&bundle.name, status.clone()) {
            log::warn!("Failed to update dependency status for {}: {:#}", bundle.name, e);
        }
        status
    }

    /// Remove staging directories left behind by an interrupted run
    ///
    /// A set-aside previous install is moved back first when `skills/{name}` is empty.
    pub fn clean_stale_staging(&self) -> usize {
        let Ok(entries) = fs::read_dir(self.workspace.skills_dir()) else {
            return 0;
        };

        let mut removed = 0;
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name().to_string_lossy().to_string();
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if name.starts_with(PREVIOUS_PREFIX) {
                self.restore_previous(&path);
            } else if !name.starts_with(STAGING_PREFIX) {
                continue;
            }

            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    log::info!("Removed stale staging directory {}", path.display());
                    removed += 1;
                }
                Err(e) => log::warn!("Cannot remove {}: {}", path.display(), e),
            }
        }
        removed
    }

    fn restore_previous(&self, aside: &Path) {
        let Ok(entries) = fs::read_dir(aside) else {
            return;
        };

        for entry in entries.filter_map(|e| e.ok()) {
            let target = self.workspace.bundle_dir(&entry.file_name().to_string_lossy());
            if target.exists() {
                continue;
            }
            match fs::rename(entry.path(), &target) {
                Ok(()) => log::warn!("Restored {} left aside by an interrupted install", target.display()),
                Err(e) => log::warn!("Cannot restore {}: {}", target.display(), e),
            }
        }
    }
}

/// A new payload in `skills/{name}` with the install it replaced held aside
struct Swap {
    target: PathBuf,
    previous: Option<(tempfile::TempDir, PathBuf)>,
}

impl Swap {
    /// Delete the previous install
    fn commit(self) {
        if let Some((aside, _)) = self.previous
            && let Err(e) = aside.close()
        {
            log::warn!("Cannot remove previous install of {}: {}", self.target.display(), e);
        }
    }

    /// Discard the new payload and put the previous install back
    fn roll_back(self) {
        if let Err(e) = fs::remove_dir_all(&self.target) {
            log::warn!("Cannot remove {}: {}", self.target.display(), e);
        }
        if let Some((_, ref old)) = self.previous
            && let Err(e) = fs::rename(old, &self.target)
        {
            log::warn!("Cannot restore previous {}: {}", self.target.display(), e);
        }
    }
}

/// Move the unpacked staging directory to `target`, setting any previous install aside
fn swap_into_place(
    staging: tempfile::TempDir,
    skills_dir: &Path,
    target: &Path,
    name: &str,
) -> std::io::Result<Swap> {
    let previous = if target.exists() {
        let aside = tempfile::Builder::new().prefix(PREVIOUS_PREFIX).tempdir_in(skills_dir)?;
        let old = aside.path().join(name);
        fs::rename(target, &old)?;
        Some((aside, old))
    } else {
        None
    };

    let staged = staging.keep();
    if let Err(e) = fs::rename(&staged, target) {
        let _ = fs::remove_dir_all(&staged);
        if let Some((_, ref old)) = previous
            && let Err(restore) = fs::rename(old, target)
        {
            log::warn!("Cannot restore previous {}: {}", target.display(), restore);
        }
        return Err(e);
    }

    Ok(Swap {
        target: target.to_path_buf(),
        previous,
    })
}
