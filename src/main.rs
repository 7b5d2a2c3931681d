//! Command line entry point: gathers configuration from a file, the environment
//! and `--set` overrides, validates it and prints the effective record.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use deep_q_config::store::DEFAULT_ENV_PREFIX;
use deep_q_config::ConfigStore;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Toml,
    Json,
}

#[derive(Debug, Parser)]
#[command(about = "Validate a Deep Q-Network training configuration")]
struct Args {
    /// TOML or JSON file with the base configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override a field, e.g. `--set batch_size=128` or `--set exploration_options.decay=0.99`
    #[arg(short, long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Prefix of environment variables to read
    #[arg(long, default_value = DEFAULT_ENV_PREFIX)]
    env_prefix: String,

    /// Ignore environment variables
    #[arg(long)]
    no_env: bool,

    /// Output format of the effective configuration
    #[arg(short, long, value_enum, default_value_t = Format::Toml)]
    format: Format,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut store = ConfigStore::new();
    if let Some(path) = &args.config {
        store = store
            .with_file(path)
            .with_context(|| format!("Loading {}", path.display()))?;
    }
    if !args.no_env {
        store = store
            .with_env(&args.env_prefix)
            .context("Reading environment")?;
    }
    store = store
        .with_overrides(&args.overrides)
        .context("Applying overrides")?;

    let config = store.build().context("Validating training configuration")?;

    let rendered = match args.format {
        Format::Toml => toml::to_string_pretty(&config)?,
        Format::Json => serde_json::to_string_pretty(&config)?,
    };
    println!("{rendered}");

    Ok(())
}
