//! List installed or available bundles

use colored::*;
use eyre::Result;
use serde::Serialize;
use std::path::PathBuf;

use crate::bundle::registry::Registry;
use crate::cli::OutputFormat;
use crate::config::Config;
use crate::install::state::{InstalledBundle, StateStore};
use crate::workspace::Workspace;

#[derive(Serialize)]
struct AvailableInfo {
    name: String,
    version: String,
    path: PathBuf,
}

pub fn run(available: bool, workspace: Option<PathBuf>, format: OutputFormat, config: Config) -> Result<()> {
    let config = super::with_workspace(config, workspace);
    let workspace = Workspace::new(config.workspace_root());

    if available {
        list_available(&config, &workspace, format)
    } else {
        list_installed(&workspace, format)
    }
}

fn list_installed(workspace: &Workspace, format: OutputFormat) -> Result<()> {
    let state = StateStore::new(workspace.installed_file()).load()?;
    let bundles: Vec<&InstalledBundle> = state.bundles.values().collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&bundles)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&bundles)?),
        OutputFormat::Text => {
            println!("{}", "Installed bundles:".bold());
            println!();

            if bundles.is_empty() {
                println!("  {}", "(none)".dimmed());
                println!();
                println!("  Install one with:");
                println!("    deya install <name>");
            } else {
                for bundle in &bundles {
                    let marker = if bundle.install_path.is_dir() {
                        "✓".green()
                    } else {
                        "✗".red()
                    };
                    println!(
                        "  {} {} {} (dependencies: {})",
                        marker,
                        bundle.name.green(),
                        format!("v{}", bundle.version).dimmed(),
                        bundle.dependencies
                    );
                    println!("      {}", bundle.installed_at.dimmed());
                }
            }
            println!();
            println!("  Workspace: {}", workspace.root().display());
        }
    }

    Ok(())
}

fn list_available(config: &Config, workspace: &Workspace, format: OutputFormat) -> Result<()> {
    let registry = Registry::from_config(config, workspace);
    let archives: Vec<AvailableInfo> = registry
        .available()
        .into_iter()
        .map(|a| AvailableInfo {
            name: a.name,
            version: a.version,
            path: a.path,
        })
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&archives)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&archives)?),
        OutputFormat::Text => {
            println!("{}", "Available bundles:".bold());
            println!();

            match config.source.local {
                None => {
                    println!("  {}", "(no local source configured)".dimmed());
                    println!();
                    println!("  Set {} in deya.yaml or pass --source to install", "source.local".cyan());
                }
                Some(_) if archives.is_empty() => println!("  {}", "(none)".dimmed()),
                Some(_) => {
                    for archive in &archives {
                        println!("  {} {}", archive.name.green(), format!("v{}", archive.version).dimmed());
                    }
                }
            }

            if let Some(ref url) = config.source.url {
                println!();
                println!("  Remote source: {}", url);
            }
        }
    }

    Ok(())
}
