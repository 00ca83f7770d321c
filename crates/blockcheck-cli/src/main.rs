//! Blockcheck CLI
//!
//! Command-line interface for the blocking diagnosis.

mod args;
mod commands;
mod logging;
mod render;
mod upload;

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing::error;

use args::Args;
use commands::Command;

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = logging::init(&args) {
        eprintln!("Error: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(&args) {
        Ok(code) => code,
        Err(e) => {
            error!("Fatal error: {:#}", e);
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<ExitCode> {
    match &args.command {
        Some(Command::Run) | None => commands::run::execute(args),
        Some(Command::Config(config_args)) => {
            commands::config::execute(config_args, args.config.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Command::Completions(comp_args)) => {
            commands::completions::execute(comp_args)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
