use clap::Parser;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;

mod bundle;
mod cli;
mod commands;
mod config;
mod error;
mod install;
mod prereq;
mod service;
mod workspace;

use cli::{Cli, Commands};
use config::{Config, LogLevel};

fn setup_logging(log_level: &LogLevel) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("deya")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("deya.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // RUST_LOG env var takes precedence, otherwise use config log_level
    let mut builder = env_logger::Builder::new();

    if std::env::var("RUST_LOG").is_ok() {
        builder.parse_default_env();
    } else {
        builder.parse_filters(log_level.as_filter());
    }

    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    info!(
        "Log level: {} (from {})",
        log_level.as_filter(),
        if std::env::var("RUST_LOG").is_ok() { "RUST_LOG env" } else { "config" }
    );
    Ok(())
}

fn run(cli: Cli, config: Config, config_file: Option<PathBuf>) -> Result<()> {
    let quiet = cli.quiet;
    match cli.command {
        Commands::Install {
            bundles,
            workspace,
            source,
            skip_prereqs,
            format,
        } => commands::install::run(
            commands::install::InstallArgs {
                bundles,
                workspace,
                source,
                skip_prereqs,
                quiet,
            },
            cli::OutputFormat::resolve(format),
            config,
        ),
        Commands::Package { dir, out, version } => commands::package::run(&dir, out, version, quiet, &config),
        Commands::List {
            available,
            workspace,
            format,
        } => commands::list::run(available, workspace, cli::OutputFormat::resolve(format), config),
        Commands::Remove { name, workspace } => commands::remove::run(&name, workspace, quiet, config),
        Commands::Init { workspace } => commands::init::run(workspace, quiet, config),
        Commands::Doctor => commands::doctor::run(&config),
        Commands::Status { format } => commands::status::run(cli::OutputFormat::resolve(format), &config),
        Commands::Config { action } => commands::config::run(action, &config, config_file.as_deref()),
        Commands::Service { action } => commands::service::run(action, &config),
        Commands::Completions { shell } => commands::completions::run(shell),
    }
}

fn main() -> Result<()> {
    // Parse CLI arguments first
    let cli = Cli::parse();

    // Load configuration (before logging, so log messages in Config::load are silent)
    let (config, config_file) = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging with log level from config (or RUST_LOG env var)
    setup_logging(&config.log_level).context("Failed to setup logging")?;

    info!("Starting deya with config from: {:?}", config_file);

    run(cli, config, config_file).context("Command failed")?;

    Ok(())
}
