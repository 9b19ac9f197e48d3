//! External service processes (gateway, dashboard)
//!
//! Services are launched detached with output appended to `.deya/logs/{name}.log` and
//! their PID recorded in `.deya/run/{name}.pid`. Nothing here supervises them.

use eyre::{Context, Result};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::config::{ServiceConfig, ServicesConfig};
use crate::workspace::Workspace;

pub const SERVICE_NAMES: [&str; 2] = ["gateway", "dashboard"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ServiceState {
    Running { pid: u32 },
    Stopped,
    /// A PID file points at a process that no longer exists
    Stale { pid: u32 },
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::Running { pid } => write!(f, "running (pid {})", pid),
            ServiceState::Stopped => write!(f, "stopped"),
            ServiceState::Stale { pid } => write!(f, "stale pid file (pid {})", pid),
        }
    }
}

pub struct ServiceManager {
    workspace: Workspace,
    services: ServicesConfig,
}

impl ServiceManager {
    pub fn new(workspace: Workspace, services: ServicesConfig) -> Self {
        Self { workspace, services }
    }

    fn service(&self, name: &str) -> Result<&ServiceConfig> {
        self.services.get(name).ok_or_else(|| {
            eyre::eyre!("Unknown service '{}' (expected one of: {})", name, SERVICE_NAMES.join(", "))
        })
    }

    pub fn pid_file(&self, name: &str) -> PathBuf {
        self.workspace.run_dir().join(format!("{}.pid", name))
    }

    pub fn log_file(&self, name: &str) -> PathBuf {
        self.workspace.logs_dir().join(format!("{}.log", name))
    }

    /// The service argv with `{port}` and `{workspace}` substituted
    pub fn command_line(&self, name: &str) -> Result<Vec<String>> {
        let service = self.service(name)?;
        let port = service.port.to_string();
        let workspace = self.workspace.root().display().to_string();

        // A config that only sets the port keeps the built-in command
        let defaults = ServicesConfig::default();
        let command = match defaults.get(name) {
            Some(default) if service.command.is_empty() => &default.command,
            _ => &service.command,
        };

        Ok(command
            .iter()
            .map(|arg| arg.replace("{port}", &port).replace("{workspace}", &workspace))
            .collect())
    }

    pub fn status(&self, name: &str) -> Result<ServiceState> {
        self.service(name)?;
        let Some(pid) = self.read_pid(name)? else {
            return Ok(ServiceState::Stopped);
        };

        if is_alive(pid) {
            Ok(ServiceState::Running { pid })
        } else {
            Ok(ServiceState::Stale { pid })
        }
    }

    /// Launch the service and record its PID
    pub fn start(&self, name: &str) -> Result<u32> {
        match self.status(name)? {
            ServiceState::Running { pid } => eyre::bail!("Service '{}' is already running (pid {})", name, pid),
            ServiceState::Stale { pid } => {
                log::info!("Removing stale pid file for {} (pid {})", name, pid);
                fs::remove_file(self.pid_file(name)).ok();
            }
            ServiceState::Stopped => {}
        }

        let argv = self.command_line(name)?;
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| eyre::eyre!("Service '{}' has an empty command", name))?;

        let logs_dir = self.workspace.logs_dir();
        let run_dir = self.workspace.run_dir();
        fs::create_dir_all(&logs_dir).with_context(|| format!("Failed to create {}", logs_dir.display()))?;
        fs::create_dir_all(&run_dir).with_context(|| format!("Failed to create {}", run_dir.display()))?;

        let log_path = self.log_file(name);
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open {}", log_path.display()))?;
        let log_err = log.try_clone().context("Failed to clone log handle")?;

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(self.workspace.root())
            .stdin(Stdio::null())
            .stdout(log)
            .stderr(log_err);

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let child = command
            .spawn()
            .with_context(|| format!("Failed to launch {} ({})", name, argv.join(" ")))?;
        let pid = child.id();

        let pid_file = self.pid_file(name);
        fs::write(&pid_file, format!("{}\n", pid)).with_context(|| format!("Failed to write {}", pid_file.display()))?;

        log::info!("Started {} (pid {}): {}", name, pid, argv.join(" "));
        Ok(pid)
    }

    /// Stop the service; returns the PID that was signalled, if one was running
    pub fn stop(&self, name: &str) -> Result<Option<u32>> {
        let pid_file = self.pid_file(name);
        let signalled = match self.status(name)? {
            ServiceState::Stopped => return Ok(None),
            ServiceState::Stale { pid } => {
                log::info!("{} was not running (stale pid {})", name, pid);
                None
            }
            ServiceState::Running { pid } => {
                let status = Command::new("kill")
                    .arg(pid.to_string())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status()
                    .context("Failed to run kill")?;
                if !status.success() {
                    eyre::bail!("kill {} failed for service '{}'", pid, name);
                }
                log::info!("Stopped {} (pid {})", name, pid);
                Some(pid)
            }
        };

        fs::remove_file(&pid_file).with_context(|| format!("Failed to remove {}", pid_file.display()))?;
        Ok(signalled)
    }

    fn read_pid(&self, name: &str) -> Result<Option<u32>> {
        let pid_file = self.pid_file(name);
        if !pid_file.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&pid_file).with_context(|| format!("Failed to read {}", pid_file.display()))?;
        let pid = content
            .trim()
            .parse()
            .with_context(|| format!("Invalid pid in {}", pid_file.display()))?;
        Ok(Some(pid))
    }
}

/// Probe a process with `kill -0`
fn is_alive(pid: u32) -> bool {
    Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
