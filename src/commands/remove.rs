use colored::*;
use eyre::Result;
use std::path::PathBuf;

use crate::config::Config;
use crate::install;
use crate::workspace::Workspace;

pub fn run(name: &str, workspace: Option<PathBuf>, quiet: bool, config: Config) -> Result<()> {
    let config = super::with_workspace(config, workspace);
    let workspace = Workspace::new(config.workspace_root());

    if !quiet {
        println!("{} Removing {}", "→".blue(), name.cyan());
    }
    let removed = install::remove(&workspace, name)?;
    println!(
        "  {} Removed {} v{} from {}",
        "✓".green(),
        removed.name,
        removed.version,
        removed.install_path.display()
    );

    Ok(())
}
