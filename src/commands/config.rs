use colored::*;
use eyre::Result;
use std::path::Path;

use crate::cli::{ConfigAction, OutputFormat};
use crate::config::Config;

pub fn run(action: ConfigAction, config: &Config, loaded_from: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Show { format } => show(OutputFormat::resolve(format), config),
        ConfigAction::Get { key } => get(&key, config),
        ConfigAction::Path => path(loaded_from),
    }
}

fn show(format: OutputFormat, config: &Config) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(config)?);
        }
        OutputFormat::Text => {
            println!("{}", "Deya Configuration".bold());
            println!();

            println!("{}:", "workspace".cyan());
            println!("  root: {}", config.workspace_root().display());
            println!();

            println!("{}:", "source".cyan());
            match config.source.local {
                Some(ref local) => println!("  local: {}", local.display()),
                None => println!("  local: {}", "(none)".dimmed()),
            }
            println!("  url: {}", config.source.url.as_deref().unwrap_or("(none)"));
            println!("  timeout_secs: {}", config.source.timeout_secs);
            println!();

            println!("{}:", "instance".cyan());
            println!("  name: {}", config.instance.name);
            println!("  version: {}", config.instance.version);
            println!("  persona: {}", config.instance.persona);
            println!();

            println!("{}:", "services".cyan());
            println!("  gateway: :{} ({})", config.services.gateway.port, config.services.gateway.command.join(" "));
            println!(
                "  dashboard: :{} ({})",
                config.services.dashboard.port,
                config.services.dashboard.command.join(" ")
            );
            println!();

            println!("{}: {}", "bundles".cyan(), config.bundles.join(", "));
            println!("{}: {}", "prerequisites".cyan(), config.prerequisites.join(", "));
            println!("{}: {}", "log_level".cyan(), config.log_level.as_filter());
        }
    }

    Ok(())
}

fn get(key: &str, config: &Config) -> Result<()> {
    let value = match key {
        "workspace" => Some(config.workspace_root().display().to_string()),
        "source.local" => config.source.local.as_ref().map(|p| p.display().to_string()),
        "source.url" => config.source.url.clone(),
        "source.timeout_secs" => Some(config.source.timeout_secs.to_string()),
        "instance.name" => Some(config.instance.name.clone()),
        "instance.version" => Some(config.instance.version.clone()),
        "instance.persona" => Some(config.instance.persona.clone()),
        "services.gateway.port" => Some(config.services.gateway.port.to_string()),
        "services.dashboard.port" => Some(config.services.dashboard.port.to_string()),
        "bundles" => Some(config.bundles.join(",")),
        "prerequisites" => Some(config.prerequisites.join(",")),
        "log_level" | "log-level" => Some(config.log_level.as_filter().to_string()),
        _ => eyre::bail!("Unknown config key: {}", key),
    };

    // Known key, unset value: print nothing
    if let Some(v) = value {
        println!("{}", v);
    }

    Ok(())
}

fn path(loaded_from: Option<&Path>) -> Result<()> {
    match loaded_from {
        Some(path) => println!("{}", path.display()),
        None => {
            eprintln!("{} No config file loaded, using defaults", "→".blue());
            eprintln!(
                "  Searched: $DEYA_CONFIG, {}, ~/.config/deya/deya.yaml, ./deya.yaml",
                Config::deya_dir().join("deya.yaml").display()
            );
        }
    }
    Ok(())
}
