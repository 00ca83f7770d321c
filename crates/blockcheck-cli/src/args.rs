//! Command-line argument parsing

use blockcheck_core::Config;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::commands::Command;

/// Blockcheck - find out how your provider blocks sites
///
/// Compares DNS answers, probes blacklisted sites directly and through a
/// relay, checks certificates and tries a set of request mutations to tell
/// DNS spoofing, IP blocking and the different kinds of DPI apart.
#[derive(Parser, Debug)]
#[command(name = "blockcheck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Subcommand to execute (default: run)
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Presume every site is up instead of asking the availability oracle
    #[arg(long, global = true)]
    pub no_isup: bool,

    /// Do not upload the transcript
    #[arg(long, global = true)]
    pub no_report: bool,

    /// Run the DPI checks even if no HTTP blocking was found
    #[arg(long, global = true)]
    pub force_dpi_check: bool,

    /// Skip every IPv6 check
    #[arg(long, global = true, conflicts_with = "force_ipv6")]
    pub disable_ipv6: bool,

    /// Use IPv6 even through tunnels
    #[arg(long, global = true)]
    pub force_ipv6: bool,

    /// Debug mode (implies --no-report)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Probe targets concurrently
    #[arg(long, global = true)]
    pub parallel: bool,

    /// Print the report as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output format for logs
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Log file path
    #[arg(long, value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Run in quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text
    Text,
    /// JSON format
    Json,
    /// Compact format
    Compact,
}

impl Args {
    /// Apply command-line switches on top of the file configuration
    pub fn apply_overrides(&self, config: &mut Config) {
        if self.no_isup {
            config.oracle.enabled = false;
        }
        if self.no_report || self.debug {
            config.report.enabled = false;
        }
        if self.force_dpi_check {
            config.probes.force_dpi_check = true;
        }
        if self.disable_ipv6 {
            config.probes.disable_ipv6 = true;
        }
        if self.force_ipv6 {
            config.probes.force_ipv6 = true;
        }
        if self.parallel {
            config.probes.parallel = true;
        }
    }
}
