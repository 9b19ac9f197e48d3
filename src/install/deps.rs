//! Dependency installation for bundles that declare one

use std::path::Path;
use std::process::{Command, Stdio};

use crate::config::DependencyConfig;
use crate::error::{InstallError, Result};

/// Runs the runtime's package installer against a declaration file
#[derive(Debug, Clone, Default)]
pub struct DependencyInstaller {
    command: Option<Vec<String>>,
}

impl DependencyInstaller {
    pub fn new(command: Option<Vec<String>>) -> Self {
        Self {
            command: command.filter(|c| !c.is_empty()),
        }
    }

    pub fn from_config(config: &DependencyConfig) -> Self {
        Self::new(config.installer.clone())
    }

    /// The argv prefix that will be used, detecting uv or pip3 when unset
    pub fn resolve_command(&self) -> Option<Vec<String>> {
        if let Some(ref command) = self.command {
            return Some(command.clone());
        }

        if which::which("uv").is_ok() {
            Some(vec!["uv".into(), "pip".into(), "install".into(), "-r".into()])
        } else if which::which("pip3").is_ok() {
            Some(vec!["pip3".into(), "install".into(), "-r".into()])
        } else {
            None
        }
    }

    /// Install dependencies declared in `declaration` (relative to `bundle_dir`)
    pub fn install(&self, name: &str, bundle_dir: &Path, declaration: &Path) -> Result<()> {
        let failed = |reason: String| InstallError::DependencyInstallFailed {
            name: name.to_string(),
            reason,
        };

        if !bundle_dir.join(declaration).is_file() {
            return Err(failed(format!("declaration file {} is missing", declaration.display())));
        }

        let command = self
            .resolve_command()
            .ok_or_else(|| failed("no package installer found (uv or pip3)".to_string()))?;
        let (program, args) = command
            .split_first()
            .ok_or_else(|| failed("empty installer command".to_string()))?;

        log::info!(
            "Installing dependencies for {}: {} {} {}",
            name,
            program,
            args.join(" "),
            declaration.display()
        );

        let output = Command::new(program)
            .args(args)
            .arg(declaration)
            .current_dir(bundle_dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| failed(format!("failed to run {}: {}", program, e)))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
        let reason = if detail.is_empty() {
            format!("{} exited with {}", program, output.status)
        } else {
            format!("{} exited with {}: {}", program, output.status, detail)
        };
        log::warn!("Dependency install for {} failed: {}", name, reason);
        Err(failed(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn bundle_with_requirements() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("requirements.txt"), "requests\n").unwrap();
        temp
    }

    #[test]
    fn test_configured_command_wins() {
        let installer = DependencyInstaller::new(Some(vec!["poetry".into(), "install".into()]));
        assert_eq!(installer.resolve_command(), Some(vec!["poetry".to_string(), "install".to_string()]));
    }

    #[test]
    fn test_empty_command_means_auto() {
        let installer = DependencyInstaller::new(Some(vec![]));
        assert!(installer.command.is_none());
    }

    #[test]
    #[cfg(unix)]
    fn test_successful_install() {
        let temp = bundle_with_requirements();
        let installer = DependencyInstaller::new(Some(vec!["true".into()]));
        installer
            .install("alpha", temp.path(), Path::new("requirements.txt"))
            .unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn test_failing_installer_reports_reason() {
        let temp = bundle_with_requirements();
        let installer = DependencyInstaller::new(Some(vec![
            "sh".into(),
            "-c".into(),
            "echo 'no matching distribution' >&2; exit 3".into(),
        ]));

        let err = installer
            .install("alpha", temp.path(), Path::new("requirements.txt"))
            .unwrap_err();
        assert!(matches!(err, InstallError::DependencyInstallFailed { .. }));
        assert!(err.to_string().contains("no matching distribution"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_missing_program() {
        let temp = bundle_with_requirements();
        let installer = DependencyInstaller::new(Some(vec!["definitely-not-a-real-installer-xyz".into()]));
        let err = installer
            .install("alpha", temp.path(), Path::new("requirements.txt"))
            .unwrap_err();
        assert!(err.to_string().contains("failed to run"));
    }

    #[test]
    fn test_missing_declaration_file() {
        let temp = TempDir::new().unwrap();
        let installer = DependencyInstaller::new(Some(vec!["true".into()]));
        let err = installer
            .install("alpha", temp.path(), Path::new("requirements.txt"))
            .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
