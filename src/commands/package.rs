//! Package a bundle directory into an installable archive

use colored::*;
use eyre::{Context, Result};
use std::path::{Path, PathBuf};

use crate::bundle::manifest::{BundleManifest, MANIFEST_FILE};
use crate::bundle::{archive, archive_file_name, is_valid_name, is_valid_version};
use crate::config::Config;

pub fn run(dir: &Path, out: Option<PathBuf>, version: Option<String>, quiet: bool, config: &Config) -> Result<()> {
    let manifest_path = dir.join(MANIFEST_FILE);
    if !manifest_path.is_file() {
        eyre::bail!("No {} in {}", MANIFEST_FILE, dir.display());
    }
    let manifest = BundleManifest::load(&manifest_path)?;

    let name = manifest.name.trim();
    if !is_valid_name(name) {
        eyre::bail!("Manifest name '{}' is not a valid bundle name", name);
    }

    let version = version
        .or_else(|| manifest.version.clone())
        .ok_or_else(|| eyre::eyre!("No version given and {} declares none (use --version)", MANIFEST_FILE))?;
    if !is_valid_version(&version) {
        eyre::bail!("Invalid version: '{}'", version);
    }

    if let Some(ref deps) = manifest.dependencies
        && !dir.join(deps).is_file()
    {
        println!(
            "{} {} declares dependencies in {} but the file is missing",
            "⚠".yellow(),
            MANIFEST_FILE,
            deps.display()
        );
    }

    let out_dir = out
        .or_else(|| config.source.local.as_deref().map(Config::expand_path))
        .unwrap_or_else(|| PathBuf::from("."));
    let out_file = out_dir.join(archive_file_name(name, &version));

    if !quiet {
        println!("{} Packaging {} v{}", "→".blue(), name.cyan(), version);
    }
    let files = archive::pack(dir, name, &out_file).with_context(|| format!("Failed to package {}", dir.display()))?;

    log::info!("Packaged {} v{} ({} files) to {}", name, version, files, out_file.display());
    println!("  {} {} ({} files)", "✓".green(), out_file.display(), files);

    Ok(())
}
