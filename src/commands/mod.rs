pub mod completions;
pub mod config;
pub mod doctor;
pub mod init;
pub mod install;
pub mod list;
pub mod package;
pub mod remove;
pub mod service;
pub mod status;

use std::path::PathBuf;

use crate::config::Config;

/// Apply a `--workspace` override
pub(crate) fn with_workspace(mut config: Config, workspace: Option<PathBuf>) -> Config {
    if let Some(root) = workspace {
        config.workspace = root;
    }
    config
}
