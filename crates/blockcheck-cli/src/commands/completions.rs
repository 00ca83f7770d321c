//! Shell completion scripts

use anyhow::Result;
use clap::{Args, CommandFactory};
use clap_complete::Shell;
use std::io::{self, Write};

use crate::args::Args as CliArgs;

/// Completions command arguments
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Write the completion script to stdout
pub fn execute(args: &CompletionsArgs) -> Result<()> {
    write_script(args.shell, &mut io::stdout().lock())
}

/// Generate the script for `shell` into any writer
fn write_script(shell: Shell, out: &mut dyn Write) -> Result<()> {
    let mut cmd = CliArgs::command();
    let bin = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, bin, out);
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::ValueEnum;

    #[test]
    fn test_every_shell_mentions_binary() {
        for shell in Shell::value_variants() {
            let mut script = Vec::new();
            write_script(*shell, &mut script).unwrap();
            let text = String::from_utf8_lossy(&script);
            assert!(text.contains("blockcheck"), "{shell} script lacks the binary name");
        }
    }

    #[test]
    fn test_zsh_lists_switches() {
        let mut script = Vec::new();
        write_script(Shell::Zsh, &mut script).unwrap();
        let text = String::from_utf8_lossy(&script);
        assert!(text.contains("--force-dpi-check"));
        assert!(text.contains("--no-isup"));
    }
}
