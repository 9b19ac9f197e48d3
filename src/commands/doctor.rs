//! Diagnose Deya setup issues

use colored::*;
use eyre::Result;

use crate::bundle::manifest::MANIFEST_FILE;
use crate::config::Config;
use crate::install::deps::DependencyInstaller;
use crate::install::state::{DependencyStatus, StateStore};
use crate::prereq;
use crate::workspace::documents::{self, RUNTIME_CONFIG_FILE};
use crate::workspace::{SKELETON, Workspace};

pub fn run(config: &Config) -> Result<()> {
    println!("{}", "Deya Doctor".bold());
    println!("{}", "═".repeat(50));
    println!();

    let mut issues = 0;
    let workspace = Workspace::new(config.workspace_root());

    // Prerequisites
    println!("{}", "Prerequisites:".bold());
    if config.prerequisites.is_empty() {
        println!("  {} None configured", "→".blue());
    }
    for (binary, path) in prereq::locate(&config.prerequisites) {
        match path {
            Some(path) => println!("  {} {} ({})", "✓".green(), binary, path.display().to_string().dimmed()),
            None => {
                println!("  {} {} not found on PATH", "✗".red(), binary);
                issues += 1;
            }
        }
    }

    match DependencyInstaller::from_config(&config.dependencies).resolve_command() {
        Some(command) => println!("  {} Dependency installer: {}", "✓".green(), command.join(" ")),
        None => println!(
            "  {} No dependency installer (uv or pip3); bundles with requirements will warn",
            "⚠".yellow()
        ),
    }
    println!();

    // Workspace
    println!("{}", "Workspace:".bold());
    if workspace.root().is_dir() {
        println!("  {} {}", "✓".green(), workspace.root().display());
    } else {
        println!("  {} {} does not exist", "✗".red(), workspace.root().display());
        println!("    Run {} to create it", "deya init".cyan());
        issues += 1;
    }

    for dir in SKELETON {
        if workspace.root().join(dir).is_dir() {
            println!("  {} {}/", "✓".green(), dir);
        } else {
            println!("  {} {}/ missing", "✗".red(), dir);
            issues += 1;
        }
    }

    let document_names = documents::identity_documents(&config.instance)
        .into_iter()
        .map(|d| d.name)
        .chain(std::iter::once(RUNTIME_CONFIG_FILE));
    for name in document_names {
        if workspace.root().join(name).is_file() {
            println!("  {} {}", "✓".green(), name);
        } else {
            println!("  {} {} missing", "⚠".yellow(), name);
        }
    }
    println!();

    // Installed bundles
    println!("{}", "Installed bundles:".bold());
    let store = StateStore::new(workspace.installed_file());
    match store.load() {
        Ok(state) if state.bundles.is_empty() => println!("  {}", "(none)".dimmed()),
        Ok(state) => {
            for bundle in state.bundles.values() {
                if !bundle.install_path.join(MANIFEST_FILE).is_file() {
                    println!(
                        "  {} {} v{}: {} missing from {}",
                        "✗".red(),
                        bundle.name,
                        bundle.version,
                        MANIFEST_FILE,
                        bundle.install_path.display()
                    );
                    println!("    Reinstall with {}", format!("deya install {}", bundle.name).cyan());
                    issues += 1;
                    continue;
                }

                match bundle.dependencies {
                    DependencyStatus::Failed { ref message } => {
                        println!("  {} {} v{}: dependencies failed", "⚠".yellow(), bundle.name, bundle.version);
                        println!("    {}", message.dimmed());
                    }
                    DependencyStatus::Pending => {
                        println!(
                            "  {} {} v{}: dependency install never finished",
                            "⚠".yellow(),
                            bundle.name,
                            bundle.version
                        );
                    }
                    _ => println!("  {} {} v{}", "✓".green(), bundle.name, bundle.version),
                }
            }
        }
        Err(e) => {
            println!("  {} Cannot read {}: {:#}", "✗".red(), store.path().display(), e);
            issues += 1;
        }
    }
    println!();

    // Sources
    println!("{}", "Sources:".bold());
    match config.source.local {
        Some(ref local) => {
            let local = Config::expand_path(local);
            if local.is_dir() {
                println!("  {} Local: {}", "✓".green(), local.display());
            } else {
                println!("  {} Local: {} does not exist", "✗".red(), local.display());
                issues += 1;
            }
        }
        None => println!("  {} Local: not configured", "→".blue()),
    }
    match config.source.url {
        Some(ref url) => println!("  {} Remote: {} (timeout {}s)", "✓".green(), url, config.source.timeout_secs),
        None => println!("  {} Remote: not configured", "→".blue()),
    }
    if config.source.local.is_none() && config.source.url.is_none() {
        println!("  {} No bundle source configured; every install will be skipped", "⚠".yellow());
    }

    println!();

    // Summary
    println!("{}", "═".repeat(50));
    if issues == 0 {
        println!("{} All checks passed!", "✓".green().bold());
    } else {
        println!("{} {} issue(s) found", "⚠".yellow().bold(), issues);
    }

    Ok(())
}
