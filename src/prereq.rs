//! External prerequisite checks

use std::path::PathBuf;

use crate::error::{InstallError, Result};

/// Ensure every binary in `required` is on PATH; the first missing one is an error
pub fn check(required: &[String]) -> Result<()> {
    for binary in required {
        match which::which(binary) {
            Ok(path) => log::debug!("Prerequisite {} found at {}", binary, path.display()),
            Err(_) => {
                log::error!("Prerequisite {} not found on PATH", binary);
                return Err(InstallError::PrerequisiteMissing { binary: binary.clone() });
            }
        }
    }
    Ok(())
}

/// Where each binary resolves, for `doctor`
pub fn locate(required: &[String]) -> Vec<(String, Option<PathBuf>)> {
    required
        .iter()
        .map(|binary| (binary.clone(), which::which(binary).ok()))
        .collect()
}
