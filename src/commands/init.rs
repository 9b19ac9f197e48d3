//! Initialize a workspace without installing bundles

use colored::*;
use eyre::Result;
use std::path::PathBuf;

use crate::config::Config;
use crate::workspace::Workspace;
use crate::workspace::materializer::{Materializer, Outcome};

pub fn run(workspace: Option<PathBuf>, quiet: bool, config: Config) -> Result<()> {
    let config = super::with_workspace(config, workspace);
    let workspace = Workspace::new(config.workspace_root());

    if !quiet {
        println!("{} Initializing workspace {}", "→".blue(), workspace.root().display());
    }

    let report = Materializer::from_config(&config, &workspace)?
        .materialize()
        .map_err(eyre::Report::new)?;

    if !quiet {
        for entry in report
            .directories
            .iter()
            .chain(&report.documents)
            .chain(std::iter::once(&report.runtime_config))
        {
            match entry.outcome {
                Outcome::Created => println!("  {} Created {}", "✓".green(), entry.name),
                Outcome::Unchanged => println!("  {} {} already exists", "→".blue(), entry.name),
            }
        }
        println!();
    }

    if report.created_count() == 0 {
        println!("{} Workspace already initialized", "✓".green().bold());
    } else {
        println!("{} Workspace ready", "✓".green().bold());
        println!();
        println!("Next steps:");
        println!("  1. Edit {} to describe yourself", workspace.root().join("USER.md").display());
        println!("  2. Install skills: {}", "deya install <bundle>".cyan());
    }

    Ok(())
}
