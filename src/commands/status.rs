//! Workspace status command
//!
//! Shows installed bundles, what is on disk, and the state of the external services.

use chrono::{DateTime, Local};
use colored::*;
use eyre::Result;
use serde::Serialize;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

use crate::cli::OutputFormat;
use crate::config::Config;
use crate::install::state::StateStore;
use crate::service::{SERVICE_NAMES, ServiceManager, ServiceState};
use crate::workspace::Workspace;

#[derive(Serialize)]
struct Status {
    version: String,
    workspace: String,
    initialized: bool,
    installed: Vec<InstalledStatus>,
    /// Bundle directories under skills/, installed through deya or not
    skills_on_disk: usize,
    memory_notes: usize,
    last_install: Option<String>,
    services: Vec<ServiceStatus>,
}

#[derive(Serialize)]
struct InstalledStatus {
    name: String,
    version: String,
    dependencies: String,
}

#[derive(Serialize)]
struct ServiceStatus {
    name: String,
    port: u16,
    #[serde(flatten)]
    state: ServiceState,
}

pub fn run(format: OutputFormat, config: &Config) -> Result<()> {
    let workspace = Workspace::new(config.workspace_root());
    let state = StateStore::new(workspace.installed_file()).load()?;

    let installed: Vec<InstalledStatus> = state
        .bundles
        .values()
        .map(|b| InstalledStatus {
            name: b.name.clone(),
            version: b.version.clone(),
            dependencies: b.dependencies.to_string(),
        })
        .collect();

    let last_install = state
        .bundles
        .values()
        .filter_map(|b| DateTime::parse_from_rfc3339(&b.installed_at).ok())
        .max()
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string());

    let manager = ServiceManager::new(workspace.clone(), config.services.clone());
    let mut services = Vec::new();
    for name in SERVICE_NAMES {
        let port = config.services.get(name).map(|s| s.port).unwrap_or_default();
        services.push(ServiceStatus {
            name: name.to_string(),
            port,
            state: manager.status(name)?,
        });
    }

    let status = Status {
        version: env!("GIT_DESCRIBE").to_string(),
        workspace: workspace.root().display().to_string(),
        initialized: workspace.root().is_dir(),
        installed,
        skills_on_disk: count_skill_dirs(&workspace.skills_dir()),
        memory_notes: count_markdown(&workspace.memory_dir()),
        last_install,
        services,
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&status)?),
        OutputFormat::Text => print_text(&status),
    }

    Ok(())
}

fn print_text(status: &Status) {
    println!("{} {}", "Deya".bold(), status.version.dimmed());
    println!("{}", "═".repeat(50));
    println!();

    println!("{}", "Workspace:".bold());
    if status.initialized {
        println!("  {} {}", "✓".green(), status.workspace);
    } else {
        println!("  {} {} (not initialized)", "✗".red(), status.workspace);
    }
    println!("  Skills on disk: {}", status.skills_on_disk);
    println!("  Memory notes:   {}", status.memory_notes);
    println!();

    println!("{} ({})", "Installed bundles:".bold(), status.installed.len());
    if status.installed.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for bundle in &status.installed {
        println!(
            "  {} {} (dependencies: {})",
            bundle.name.green(),
            format!("v{}", bundle.version).dimmed(),
            bundle.dependencies
        );
    }
    if let Some(ref last) = status.last_install {
        println!("  Last install: {}", last);
    }
    println!();

    println!("{}", "Services:".bold());
    for service in &status.services {
        let state = match service.state {
            ServiceState::Running { .. } => service.state.to_string().green(),
            ServiceState::Stopped => service.state.to_string().dimmed(),
            ServiceState::Stale { .. } => service.state.to_string().yellow(),
        };
        println!("  {:<10} :{:<6} {}", service.name, service.port, state);
    }
}

fn count_skill_dirs(dir: &Path) -> usize {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_dir() && !e.file_name().to_string_lossy().starts_with('.'))
                .count()
        })
        .unwrap_or(0)
}

fn count_markdown(dir: &Path) -> usize {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.path().extension().is_some_and(|ext| ext == "md"))
        .count()
}
