//! Config command - configuration management

use anyhow::{Context, Result};
use blockcheck_core::Config;
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const FILE_NAMES: [&str; 2] = ["blockcheck.toml", "config.toml"];

/// Config command arguments
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show {
        /// Config file to show (default: detect)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file with the built-in defaults
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "blockcheck.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Config file to validate
        file: PathBuf,
    },

    /// Show config file locations
    Paths,
}

/// Execute config command
pub fn execute(args: &ConfigArgs, global: Option<&Path>) -> Result<()> {
    match &args.action {
        ConfigAction::Show { file } => show_config(file.as_deref().or(global)),
        ConfigAction::Generate { output, force } => generate_config(output, *force),
        ConfigAction::Validate { file } => validate_config(file),
        ConfigAction::Paths => {
            show_paths();
            Ok(())
        }
    }
}

/// Load the explicit file, the first file found in the search path, or the defaults
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(),
    };
    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading configuration");
            Config::load(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))
        }
        None => {
            debug!("no configuration file found, using defaults");
            Ok(Config::default())
        }
    }
}

fn show_config(file: Option<&Path>) -> Result<()> {
    let config = load(file)?;
    let toml_str = config.to_toml().context("Failed to serialize config")?;
    println!("{toml_str}");
    Ok(())
}

fn generate_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
    }

    let toml_str = Config::default().to_toml().context("Failed to serialize config")?;
    let content = format!(
        "# Blockcheck configuration\n\
         # Every key is optional; missing keys take the built-in defaults\n\n\
         {toml_str}"
    );

    std::fs::write(output, content)
        .with_context(|| format!("Failed to write config to {}", output.display()))?;

    info!(path = %output.display(), "generated config file");
    println!("Configuration file generated: {}", output.display());
    Ok(())
}

fn validate_config(file: &Path) -> Result<()> {
    let config = Config::load(file)
        .with_context(|| format!("Failed to load config from {}", file.display()))?;
    config.validate().context("Configuration validation failed")?;

    println!("✓ Configuration is valid");
    println!("  DNS domains: {}", config.targets.dns_domains.len());
    println!("  HTTP targets: {}", config.targets.http.len());
    println!("  HTTPS targets: {}", config.targets.https.len());
    println!("  DPI targets: {}", config.targets.dpi.len());
    println!("  Relay: {}", config.relay_address().unwrap_or("disabled"));
    println!(
        "  Oracle: {}",
        if config.oracle.enabled { config.oracle.name.as_str() } else { "disabled" }
    );
    Ok(())
}

fn show_paths() {
    println!("Configuration file search paths:");
    println!();
    for (i, name) in FILE_NAMES.iter().enumerate() {
        println!("  {}. ./{}", i + 1, name);
    }
    if let Some(dirs) = project_dirs() {
        println!("  {}. {}", FILE_NAMES.len() + 1, dirs.config_dir().join("config.toml").display());
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "blockcheck")
}

fn find_config_file() -> Option<PathBuf> {
    FILE_NAMES
        .iter()
        .map(PathBuf::from)
        .chain(project_dirs().map(|dirs| dirs.config_dir().join("config.toml")))
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[probes]\nparallel = true\n").unwrap();

        let config = load(Some(&path)).unwrap();
        assert!(config.probes.parallel);
        assert!(!config.targets.dns_domains.is_empty());
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = TempDir::new().unwrap();
        assert!(load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_generate_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blockcheck.toml");
        generate_config(&path, false).unwrap();
        assert!(generate_config(&path, false).is_err());
        generate_config(&path, true).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# Blockcheck configuration"));
        assert!(Config::from_toml(&content).unwrap().validate().is_ok());
    }
}
