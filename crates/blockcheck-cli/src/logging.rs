//! Logging initialization
//!
//! Logs go to stderr so stdout carries only the transcript and the result.
//! Transcript lines are logged at info, which stays hidden until `-v`.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::args::{Args, LogFormat};

/// Level selected by the verbosity switches
pub fn level(args: &Args) -> Level {
    if args.quiet {
        return Level::ERROR;
    }
    match (args.verbose, args.debug) {
        (0, false) => Level::WARN,
        (0, true) | (1, _) => Level::INFO,
        (2, _) => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialize logging based on CLI arguments
pub fn init(args: &Args) -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(level(args).into())
        .from_env_lossy();

    let file_layer = match args.log_file.as_deref() {
        Some(path) => Some(file_appender(path)?),
        None => None,
    };

    match args.log_format {
        LogFormat::Text => {
            let file_layer =
                file_layer.map(|writer| fmt::layer().with_ansi(false).with_writer(writer));
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(args.verbose >= 2)
                        .with_thread_ids(args.verbose >= 3)
                        .with_file(args.verbose >= 3)
                        .with_line_number(args.verbose >= 3),
                )
                .with(file_layer)
                .try_init()
                .context("Failed to install log subscriber")?;
        }
        LogFormat::Json => {
            let file_layer = file_layer.map(|writer| fmt::layer().json().with_writer(writer));
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .with(file_layer)
                .try_init()
                .context("Failed to install log subscriber")?;
        }
        LogFormat::Compact => {
            let file_layer = file_layer
                .map(|writer| fmt::layer().compact().with_ansi(false).with_writer(writer));
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .with(file_layer)
                .try_init()
                .context("Failed to install log subscriber")?;
        }
    }

    Ok(())
}

fn file_appender(path: &Path) -> Result<tracing_appender::rolling::RollingFileAppender> {
    let file_name = path
        .file_name()
        .with_context(|| format!("Log file path has no file name: {}", path.display()))?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    Ok(tracing_appender::rolling::never(dir, file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_levels() {
        assert_eq!(level(&Args::parse_from(["blockcheck"])), Level::WARN);
        assert_eq!(level(&Args::parse_from(["blockcheck", "-v"])), Level::INFO);
        assert_eq!(level(&Args::parse_from(["blockcheck", "--debug"])), Level::INFO);
        assert_eq!(level(&Args::parse_from(["blockcheck", "-vv"])), Level::DEBUG);
        assert_eq!(level(&Args::parse_from(["blockcheck", "-vvvv"])), Level::TRACE);
        assert_eq!(level(&Args::parse_from(["blockcheck", "-q", "-vv"])), Level::ERROR);
    }
}
