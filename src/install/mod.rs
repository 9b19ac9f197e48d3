//! Install runs
//!
//! One run walks `START → resolve/extract (per bundle) → materialize → DONE`. A bundle that
//! fails to resolve or extract is marked skipped and the loop continues; only a missing
//! prerequisite or a workspace write failure ends the run early.

use colored::*;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

pub mod deps;
pub mod extractor;
pub mod state;

use crate::bundle::BundleRef;
use crate::bundle::registry::{Fetcher, HttpFetcher, Registry};
use crate::config::Config;
use crate::error::{InstallError, Result};
use crate::prereq;
use crate::workspace::Workspace;
use crate::workspace::materializer::{MaterializeReport, Materializer};
use deps::DependencyInstaller;
use extractor::Extractor;
use state::{DependencyStatus, InstalledBundle, StateStore};

#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    pub skip_prereqs: bool,
    /// Print per-step markers to stdout
    pub progress: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BundleStatus {
    Installed {
        version: String,
        install_path: PathBuf,
        dependencies: DependencyStatus,
    },
    Skipped {
        reason: String,
        /// Version of an earlier install left in place
        #[serde(skip_serializing_if = "Option::is_none")]
        kept_version: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct BundleReport {
    pub name: String,
    #[serde(flatten)]
    pub status: BundleStatus,
}

impl BundleReport {
    pub fn is_installed(&self) -> bool {
        matches!(self.status, BundleStatus::Installed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub workspace: PathBuf,
    pub bundles: Vec<BundleReport>,
    pub materialized: MaterializeReport,
}

impl RunReport {
    pub fn installed_count(&self) -> usize {
        self.bundles.iter().filter(|b| b.is_installed()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.bundles.len() - self.installed_count()
    }
}

/// Drives registry, extractor and materializer for one workspace
pub struct Installer<F: Fetcher = HttpFetcher> {
    workspace: Workspace,
    prerequisites: Vec<String>,
    registry: Registry<F>,
    extractor: Extractor,
    materializer: Materializer,
}

impl Installer<HttpFetcher> {
    pub fn from_config(config: &Config) -> eyre::Result<Self> {
        let workspace = Workspace::new(config.workspace_root());
        Ok(Installer::new(
            workspace.clone(),
            config.prerequisites.clone(),
            Registry::from_config(config, &workspace),
            Extractor::new(workspace.clone(), DependencyInstaller::from_config(&config.dependencies)),
            Materializer::from_config(config, &workspace)?,
        ))
    }
}

impl<F: Fetcher> Installer<F> {
    pub fn new(
        workspace: Workspace,
        prerequisites: Vec<String>,
        registry: Registry<F>,
        extractor: Extractor,
        materializer: Materializer,
    ) -> Self {
        Self {
            workspace,
            prerequisites,
            registry,
            extractor,
            materializer,
        }
    }

    /// Run the install. `Err` is always fatal; per-bundle failures are in the report.
    pub fn run(&self, refs: &[BundleRef], options: &InstallOptions) -> Result<RunReport> {
        let progress = options.progress;
        log::info!("Install run into {} for {} bundle(s)", self.workspace.root().display(), refs.len());

        if options.skip_prereqs {
            log::info!("Skipping prerequisite check");
        } else {
            if progress {
                println!("{} Checking prerequisites", "→".blue());
            }
            prereq::check(&self.prerequisites)?;
        }

        self.extractor.clean_stale_staging();

        let mut seen = HashSet::new();
        let mut bundles = Vec::new();
        for bundle_ref in refs {
            if !seen.insert(bundle_ref.name.clone()) {
                log::warn!("{} listed more than once; ignoring {}", bundle_ref.name, bundle_ref);
                if progress {
                    println!("  {} {} listed more than once, ignoring", "⚠".yellow(), bundle_ref);
                }
                continue;
            }
            bundles.push(self.install_one(bundle_ref, progress));
        }

        if progress {
            println!("{} Materializing workspace {}", "→".blue(), self.workspace.root().display());
        }
        let materialized = self.materializer.materialize()?;
        if progress {
            for doc in materialized.documents.iter().chain(std::iter::once(&materialized.runtime_config)) {
                println!("  {} {} ({:?})", "✓".green(), doc.name, doc.outcome);
            }
        }

        Ok(RunReport {
            workspace: self.workspace.root().to_path_buf(),
            bundles,
            materialized,
        })
    }

    fn install_one(&self, bundle_ref: &BundleRef, progress: bool) -> BundleReport {
        if progress {
            println!("{} Installing {}", "→".blue(), bundle_ref.to_string().cyan());
        }

        let outcome = self.registry.resolve(bundle_ref).and_then(|bundle| {
            if progress {
                println!("  {} Resolved v{} from {}", "✓".green(), bundle.version, bundle.source);
            }
            let extracted = self.extractor.install(&bundle)?;
            Ok((bundle.version, extracted))
        });

        let status = match outcome {
            Ok((version, extracted)) => {
                if progress {
                    println!("  {} Extracted to {}", "✓".green(), extracted.install_path.display());
                    if let DependencyStatus::Failed { ref message } = extracted.dependencies {
                        println!("  {} Dependencies: {}", "⚠".yellow(), message);
                    } else if extracted.dependencies == DependencyStatus::Installed {
                        println!("  {} Dependencies installed", "✓".green());
                    }
                }
                BundleStatus::Installed {
                    version,
                    install_path: extracted.install_path,
                    dependencies: extracted.dependencies,
                }
            }
            Err(e) => self.skipped(&bundle_ref.name, e, progress),
        };

        BundleReport {
            name: bundle_ref.name.clone(),
            status,
        }
    }

    fn skipped(&self, name: &str, error: InstallError, progress: bool) -> BundleStatus {
        log::warn!("Skipping {}: {}", name, error);

        let kept_version = match self.extractor.store().get(name) {
            Ok(record) => record.map(|r| r.version),
            Err(e) => {
                log::warn!("Cannot read install record for {}: {:#}", name, e);
                None
            }
        };

        if progress {
            println!("  {} {}", "✗".red(), error);
            if let Some(ref version) = kept_version {
                println!("  {} Keeping previously installed v{}", "→".blue(), version);
            }
        }

        BundleStatus::Skipped {
            reason: error.to_string(),
            kept_version,
        }
    }
}

/// Delete an installed bundle's payload and record
pub fn remove(workspace: &Workspace, name: &str) -> eyre::Result<InstalledBundle> {
    let store = StateStore::new(workspace.installed_file());
    let record = store
        .get(name)?
        .ok_or_else(|| eyre::eyre!("Bundle '{}' is not installed in {}", name, workspace.root().display()))?;

    let dir = workspace.bundle_dir(name);
    if dir.exists() {
        fs::remove_dir_all(&dir).map_err(|e| eyre::eyre!("Failed to remove {}: {}", dir.display(), e))?;
    } else {
        log::warn!("Payload directory already gone: {}", dir.display());
    }

    store.forget(name)?;
    log::info!("Removed {} v{}", name, record.version);
    Ok(record)
}
