//! Install command
//!
//! Resolves, extracts and materializes, then prints the run summary.

use colored::*;
use eyre::{Context, Result};
use std::path::PathBuf;

use crate::bundle::BundleRef;
use crate::cli::OutputFormat;
use crate::config::Config;
use crate::install::{BundleStatus, InstallOptions, Installer, RunReport};
use crate::workspace::materializer::Outcome;

pub struct InstallArgs {
    pub bundles: Vec<String>,
    pub workspace: Option<PathBuf>,
    pub source: Option<String>,
    pub skip_prereqs: bool,
    pub quiet: bool,
}

pub fn run(args: InstallArgs, format: OutputFormat, config: Config) -> Result<()> {
    let mut config = super::with_workspace(config, args.workspace);
    if let Some(ref source) = args.source {
        config.override_source(source);
    }

    let names = if args.bundles.is_empty() {
        config.bundles.clone()
    } else {
        args.bundles
    };
    let refs = names
        .iter()
        .map(|n| n.parse::<BundleRef>())
        .collect::<Result<Vec<_>>>()
        .context("Invalid bundle reference")?;

    if refs.is_empty() {
        log::info!("No bundles requested; materializing workspace only");
    }

    let installer = Installer::from_config(&config)?;
    let options = InstallOptions {
        skip_prereqs: args.skip_prereqs,
        progress: format == OutputFormat::Text && !args.quiet,
    };

    let report = installer.run(&refs, &options).map_err(|e| {
        log::error!("Install run failed: {}", e);
        eyre::Report::new(e)
    })?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&report)?),
        OutputFormat::Text => print_summary(&report),
    }

    Ok(())
}

fn print_summary(report: &RunReport) {
    println!();
    println!("{}", "Summary:".bold());

    for bundle in &report.bundles {
        match &bundle.status {
            BundleStatus::Installed {
                version, dependencies, ..
            } => {
                println!("  {}: {} (v{}, dependencies: {})", bundle.name, "INSTALLED".green(), version, dependencies);
            }
            BundleStatus::Skipped { reason, kept_version } => {
                println!("  {}: {}", bundle.name, "SKIPPED".yellow());
                println!("    {}", reason.dimmed());
                if let Some(version) = kept_version {
                    println!("    previous v{} left in place", version);
                }
            }
        }
    }

    let created: Vec<&str> = report
        .materialized
        .documents
        .iter()
        .chain(std::iter::once(&report.materialized.runtime_config))
        .filter(|d| d.outcome == Outcome::Created)
        .map(|d| d.name.as_str())
        .collect();

    println!();
    println!("  Workspace: {}", report.workspace.display());
    if created.is_empty() {
        println!("  Documents: {}", "all present, left untouched".dimmed());
    } else {
        println!("  Documents created: {}", created.join(", "));
    }

    println!();
    println!(
        "{} {} installed, {} skipped",
        "✓".green().bold(),
        report.installed_count(),
        report.skipped_count()
    );
}
