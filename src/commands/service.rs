use colored::*;
use eyre::Result;
use serde::Serialize;

use crate::cli::{OutputFormat, ServiceAction};
use crate::config::Config;
use crate::service::{SERVICE_NAMES, ServiceManager, ServiceState};
use crate::workspace::Workspace;

#[derive(Serialize)]
struct ServiceInfo {
    name: String,
    #[serde(flatten)]
    state: ServiceState,
}

pub fn run(action: ServiceAction, config: &Config) -> Result<()> {
    let workspace = Workspace::new(config.workspace_root());
    let manager = ServiceManager::new(workspace, config.services.clone());

    match action {
        ServiceAction::Start { name } => start(&manager, &name),
        ServiceAction::Stop { name } => stop(&manager, &name),
        ServiceAction::Status { name, format } => status(&manager, name, OutputFormat::resolve(format)),
    }
}

fn start(manager: &ServiceManager, name: &str) -> Result<()> {
    let command = manager.command_line(name)?;
    println!("{} Starting {}: {}", "→".blue(), name.cyan(), command.join(" ").dimmed());

    let pid = manager.start(name)?;
    println!("  {} {} running (pid {})", "✓".green(), name, pid);
    println!("  Logs: {}", manager.log_file(name).display());
    Ok(())
}

fn stop(manager: &ServiceManager, name: &str) -> Result<()> {
    match manager.stop(name)? {
        Some(pid) => println!("{} Stopped {} (pid {})", "✓".green(), name, pid),
        None => println!("{} {} was not running", "→".blue(), name),
    }
    Ok(())
}

fn status(manager: &ServiceManager, name: Option<String>, format: OutputFormat) -> Result<()> {
    let names: Vec<String> = match name {
        Some(name) => vec![name],
        None => SERVICE_NAMES.iter().map(|n| n.to_string()).collect(),
    };

    let services = names
        .into_iter()
        .map(|name| {
            let state = manager.status(&name)?;
            Ok(ServiceInfo { name, state })
        })
        .collect::<Result<Vec<_>>>()?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&services)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&services)?),
        OutputFormat::Text => {
            for service in &services {
                let marker = match service.state {
                    ServiceState::Running { .. } => "✓".green(),
                    ServiceState::Stopped => "→".blue(),
                    ServiceState::Stale { .. } => "⚠".yellow(),
                };
                println!("{} {}: {}", marker, service.name, service.state);
            }
        }
    }

    Ok(())
}
