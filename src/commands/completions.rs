//! Shell completion scripts

use clap::CommandFactory;
use clap_complete::{Shell, generate};
use eyre::Result;
use std::io::{self, Write};

use crate::cli::Cli;

pub fn run(shell: Shell) -> Result<()> {
    write_completions(shell, &mut io::stdout());
    Ok(())
}

/// Completions for `shell`, named after the binary clap knows
fn write_completions(shell: Shell, out: &mut dyn Write) {
    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, out);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bash_completions_cover_subcommands() {
        let mut out = Vec::new();
        write_completions(Shell::Bash, &mut out);
        let script = String::from_utf8(out).unwrap();

        assert!(script.contains("_deya()"));
        for subcommand in ["install", "package", "service", "doctor"] {
            assert!(script.contains(subcommand), "missing {}", subcommand);
        }
    }
}
