use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clipfeed_cache::CacheConfig;
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

pub mod logging;
pub mod simulate;

#[derive(Debug, Parser)]
#[command(name = "clipfeed-cli")]
#[command(about = "clipfeed playback lifecycle simulator")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Replay a JSON scroll script and print a JSON report.
    Simulate {
        #[arg(value_name = "SCRIPT")]
        script: PathBuf,
        /// Override the configured cache capacity.
        #[arg(long)]
        capacity: Option<usize>,
        /// Read cache configuration from this file instead of the environment.
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Print the effective cache configuration.
    Config {
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Also write the configuration to this file.
        #[arg(long, value_name = "FILE")]
        save: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct ConfigOutput {
    capacity: usize,
    pressure_policy: String,
    source: String,
    default_path: String,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Simulate { script, capacity, config } => {
            run_simulate(&script, capacity, config.as_deref())
        }
        Commands::Config { config, save } => run_config(config.as_deref(), save.as_deref()),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_simulate(script: &Path, capacity: Option<usize>, config: Option<&Path>) -> Result<()> {
    ensure_file_exists(script)?;

    let (mut cache_config, _) = load_config(config)?;
    if let Some(capacity) = capacity {
        cache_config = cache_config.with_capacity(capacity);
    }

    let contents = fs::read_to_string(script)
        .with_context(|| format!("failed to read script {}", script.display()))?;
    let parsed: simulate::Script =
        serde_json::from_str(&contents).context("failed to parse script")?;

    let report = simulate::run_script(parsed, &cache_config)?;

    let json = serde_json::to_string_pretty(&report)?;
    println!("{json}");

    Ok(())
}

fn run_config(config: Option<&Path>, save: Option<&Path>) -> Result<()> {
    let (cache_config, source) = load_config(config)?;

    if let Some(save) = save {
        cache_config
            .save_to_file(save)
            .with_context(|| format!("failed to write config to {}", save.display()))?;
    }

    let payload = ConfigOutput {
        capacity: cache_config.capacity,
        pressure_policy: cache_config.pressure_policy.to_string(),
        source,
        default_path: CacheConfig::default_config_path().display().to_string(),
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

/// Config from `path` if given, otherwise from the environment
fn load_config(path: Option<&Path>) -> Result<(CacheConfig, String)> {
    match path {
        Some(path) => {
            ensure_file_exists(path)?;
            let config = CacheConfig::from_file(path)
                .with_context(|| format!("invalid config file {}", path.display()))?;
            Ok((config, path.display().to_string()))
        }
        None => {
            let config = CacheConfig::from_env().context("invalid cache configuration")?;
            Ok((config, "env".to_owned()))
        }
    }
}

fn ensure_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}
