use clap::{Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::path::PathBuf;

/// Output format for commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
}

impl OutputFormat {
    /// Resolve the effective output format.
    /// If user specified a format, use it.
    /// Otherwise: TTY → Text, non-TTY (pipe) → Json
    pub fn resolve(user_choice: Option<OutputFormat>) -> OutputFormat {
        match user_choice {
            Some(fmt) => fmt,
            None => {
                if std::io::stdout().is_terminal() {
                    OutputFormat::Text
                } else {
                    OutputFormat::Json
                }
            }
        }
    }
}

#[derive(Parser)]
#[command(
    name = "deya",
    about = "Skill bundle installer for the Deya agent workspace",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to: ~/.local/share/deya/logs/deya.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to deya.yaml config file")]
    pub config: Option<PathBuf>,

    /// Suppress non-error output
    #[arg(short, long, global = true, help = "Suppress per-step progress output")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install skill bundles and materialize the workspace
    Install {
        /// Bundles to install (`name` or `name@version`); defaults to the configured list
        bundles: Vec<String>,

        /// Workspace root (overrides config)
        #[arg(long, short = 'w')]
        workspace: Option<PathBuf>,

        /// Bundle source: a local directory or a base URL (overrides config)
        #[arg(long, short = 's')]
        source: Option<String>,

        /// Do not check for required binaries on PATH
        #[arg(long)]
        skip_prereqs: bool,

        /// Output format (default: text for TTY, json for pipes)
        #[arg(long, short = 'o', value_enum)]
        format: Option<OutputFormat>,
    },

    /// Package a bundle directory into a {name}-v{version}.tar.gz archive
    Package {
        /// Bundle directory containing SKILL.md
        dir: PathBuf,

        /// Output directory (defaults to the configured local source, then the current directory)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Version (defaults to the manifest version)
        #[arg(long)]
        version: Option<String>,
    },

    /// List installed bundles
    List {
        /// List archives in the local source instead
        #[arg(long)]
        available: bool,

        /// Workspace root (overrides config)
        #[arg(long, short = 'w')]
        workspace: Option<PathBuf>,

        /// Output format (default: text for TTY, json for pipes)
        #[arg(long, short = 'o', value_enum)]
        format: Option<OutputFormat>,
    },

    /// Remove an installed bundle
    Remove {
        /// Bundle name
        name: String,

        /// Workspace root (overrides config)
        #[arg(long, short = 'w')]
        workspace: Option<PathBuf>,
    },

    /// Create the workspace skeleton and default documents
    Init {
        /// Workspace root (overrides config)
        #[arg(long, short = 'w')]
        workspace: Option<PathBuf>,
    },

    /// Diagnose setup issues
    Doctor,

    /// Show workspace status
    Status {
        /// Output format (default: text for TTY, json for pipes)
        #[arg(long, short = 'o', value_enum)]
        format: Option<OutputFormat>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Start, stop or inspect the gateway and dashboard processes
    Service {
        #[command(subcommand)]
        action: ServiceAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Output format (default: text for TTY, json for pipes)
        #[arg(long, short = 'o', value_enum)]
        format: Option<OutputFormat>,
    },

    /// Get a configuration value
    Get {
        /// Configuration key (dot notation)
        key: String,
    },

    /// Show which config file was loaded
    Path,
}

#[derive(Subcommand)]
pub enum ServiceAction {
    /// Launch a service and record its PID
    Start {
        /// Service name (gateway or dashboard)
        name: String,
    },

    /// Stop a running service
    Stop {
        /// Service name (gateway or dashboard)
        name: String,
    },

    /// Show service state (all services when no name is given)
    Status {
        /// Service name (gateway or dashboard)
        name: Option<String>,

        /// Output format (default: text for TTY, json for pipes)
        #[arg(long, short = 'o', value_enum)]
        format: Option<OutputFormat>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_install() {
        let cli = Cli::try_parse_from([
            "deya",
            "install",
            "alpha",
            "beta@0.2.0",
            "--source",
            "https://bundles.example.com",
            "--skip-prereqs",
            "-o",
            "json",
        ])
        .unwrap();

        match cli.command {
            Commands::Install {
                bundles,
                source,
                skip_prereqs,
                format,
                ..
            } => {
                assert_eq!(bundles, vec!["alpha", "beta@0.2.0"]);
                assert_eq!(source.as_deref(), Some("https://bundles.example.com"));
                assert!(skip_prereqs);
                assert_eq!(format, Some(OutputFormat::Json));
            }
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["deya", "status", "-q", "-c", "/tmp/deya.yaml"]).unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/deya.yaml")));
    }

    #[test]
    fn test_service_requires_name_for_start() {
        assert!(Cli::try_parse_from(["deya", "service", "start"]).is_err());
        assert!(Cli::try_parse_from(["deya", "service", "status"]).is_ok());
    }

    #[test]
    fn test_output_format_explicit_wins() {
        assert_eq!(OutputFormat::resolve(Some(OutputFormat::Yaml)), OutputFormat::Yaml);
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
