use colored::*;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main Deya configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub log_level: LogLevel,
    /// Root of the agent workspace (skills/, memory/, assets/, identity documents)
    pub workspace: PathBuf,
    pub source: SourceConfig,
    /// Bundles installed when `deya install` is given no names
    pub bundles: Vec<String>,
    pub instance: InstanceConfig,
    pub services: ServicesConfig,
    pub dependencies: DependencyConfig,
    /// Binaries that must be on PATH before an install run starts
    pub prerequisites: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

/// Where bundle archives come from
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Directory searched for `{name}-v{version}.tar.gz`
    pub local: Option<PathBuf>,
    /// Base URL tried when the local directory has no match
    pub url: Option<String>,
    /// Timeout for the single remote fetch attempt, in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InstanceConfig {
    pub name: String,
    pub version: String,
    /// Identity document the runtime loads as the active persona
    pub persona: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub gateway: ServiceConfig,
    pub dashboard: ServiceConfig,
}

/// An external long-running process launched by `deya service start`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServiceConfig {
    pub port: u16,
    /// Argv; `{port}` and `{workspace}` are substituted at launch
    #[serde(default)]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DependencyConfig {
    /// Argv prefix for the package installer; the declaration file is appended.
    /// Unset means uv if available, else pip3.
    pub installer: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            workspace: Config::deya_dir().join("workspace"),
            source: SourceConfig::default(),
            bundles: Vec::new(),
            instance: InstanceConfig::default(),
            services: ServicesConfig::default(),
            dependencies: DependencyConfig::default(),
            prerequisites: vec!["openclaw".to_string(), "python3".to_string()],
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            local: None,
            url: None,
            timeout_secs: 10,
        }
    }
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            name: "Deya".to_string(),
            version: "1.0.0".to_string(),
            persona: "SOUL.md".to_string(),
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            gateway: ServiceConfig {
                port: 18789,
                command: vec![
                    "openclaw".to_string(),
                    "gateway".to_string(),
                    "--port".to_string(),
                    "{port}".to_string(),
                ],
            },
            dashboard: ServiceConfig {
                port: 8000,
                command: vec![
                    "python3".to_string(),
                    "-m".to_string(),
                    "uvicorn".to_string(),
                    "main:app".to_string(),
                    "--port".to_string(),
                    "{port}".to_string(),
                ],
            },
        }
    }
}

impl ServicesConfig {
    pub fn get(&self, name: &str) -> Option<&ServiceConfig> {
        match name {
            "gateway" => Some(&self.gateway),
            "dashboard" => Some(&self.dashboard),
            _ => None,
        }
    }
}

impl Config {
    /// Load configuration with fallback chain.
    ///
    /// Returns the config together with the file it came from, if any.
    pub fn load(config_path: Option<&PathBuf>) -> Result<(Self, Option<PathBuf>)> {
        // If explicit config path provided, it must load
        if let Some(path) = config_path {
            let config = Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()))?;
            return Ok((config, Some(path.clone())));
        }

        let mut candidates = Vec::new();
        if let Ok(env_path) = std::env::var("DEYA_CONFIG") {
            candidates.push(PathBuf::from(env_path));
        }
        if let Ok(deya_dir) = std::env::var("DEYA_DIR") {
            candidates.push(PathBuf::from(deya_dir).join("deya.yaml"));
        }
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("deya").join("deya.yaml"));
        }
        // For development
        candidates.push(PathBuf::from("deya.yaml"));

        for path in candidates {
            if !path.exists() {
                continue;
            }
            match Self::load_from_file(&path) {
                Ok(config) => return Ok((config, Some(path))),
                Err(e) => {
                    // Logging is not set up yet; the warning has to reach the terminal too
                    eprintln!("{} Ignoring config {}: {:#}", "⚠".yellow(), path.display(), e);
                    log::warn!("Failed to load config from {}: {:#}", path.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok((Self::default(), None))
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Get the Deya home directory (config, default workspace)
    pub fn deya_dir() -> PathBuf {
        std::env::var("DEYA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".deya"))
    }

    /// The workspace root with `~` and env vars expanded
    pub fn workspace_root(&self) -> PathBuf {
        Self::expand_path(&self.workspace)
    }

    /// Expand a path that may contain ~ or env vars
    pub fn expand_path(path: &Path) -> PathBuf {
        let path_str = path.to_string_lossy();
        let expanded = shellexpand::full(&path_str).unwrap_or_else(|_| path_str.clone());
        PathBuf::from(expanded.as_ref())
    }

    /// Apply a `--source` override: URLs replace `source.url`, anything else `source.local`
    pub fn override_source(&mut self, source: &str) {
        if source.starts_with("http://") || source.starts_with("https://") {
            self.source.url = Some(source.trim_end_matches('/').to_string());
            self.source.local = None;
        } else {
            self.source.local = Some(PathBuf::from(source));
            self.source.url = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.instance.name, "Deya");
        assert_eq!(config.services.gateway.port, 18789);
        assert_eq!(config.source.timeout_secs, 10);
        assert!(config.prerequisites.contains(&"python3".to_string()));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
workspace: /tmp/ws
source:
  local: /srv/bundles
bundles:
  - alpha
  - beta@1.2.0
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.workspace, PathBuf::from("/tmp/ws"));
        assert_eq!(config.source.local, Some(PathBuf::from("/srv/bundles")));
        assert_eq!(config.source.timeout_secs, 10);
        assert_eq!(config.bundles, vec!["alpha", "beta@1.2.0"]);
        assert_eq!(config.services.dashboard.port, 8000);
    }

    #[test]
    fn test_service_lookup() {
        let services = ServicesConfig::default();
        assert!(services.get("gateway").is_some());
        assert!(services.get("dashboard").is_some());
        assert!(services.get("scheduler").is_none());
    }

    #[test]
    fn test_override_source_url() {
        let mut config = Config::default();
        config.source.local = Some(PathBuf::from("/srv/bundles"));
        config.override_source("https://example.com/bundles/");
        assert_eq!(config.source.url.as_deref(), Some("https://example.com/bundles"));
        assert!(config.source.local.is_none());
    }

    #[test]
    fn test_override_source_dir() {
        let mut config = Config::default();
        config.override_source("./dist");
        assert_eq!(config.source.local, Some(PathBuf::from("./dist")));
        assert!(config.source.url.is_none());
    }

    #[test]
    fn test_expand_path_no_expansion() {
        let path = PathBuf::from("/usr/local/bin");
        let expanded = Config::expand_path(&path);
        assert_eq!(expanded, PathBuf::from("/usr/local/bin"));
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = Config::expand_path(&path);
        assert!(!expanded.to_string_lossy().contains('~'));
        assert!(expanded.to_string_lossy().contains("test"));
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let missing = PathBuf::from("/nonexistent/deya.yaml");
        assert!(Config::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("deya.yaml");
        fs::write(&path, "instance:\n  name: Nova\n").unwrap();

        let (config, loaded_from) = Config::load(Some(&path)).unwrap();
        assert_eq!(config.instance.name, "Nova");
        assert_eq!(config.instance.version, "1.0.0");
        assert_eq!(loaded_from, Some(path));
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = Config::default();
        let yaml_str = serde_yaml::to_string(&config).expect("Failed to serialize");
        let parsed: Config = serde_yaml::from_str(&yaml_str).expect("Failed to deserialize");
        assert_eq!(parsed.services.gateway, config.services.gateway);
        assert_eq!(parsed.prerequisites, config.prerequisites);
    }
}
