use clap::Args;
use std::path::PathBuf;

/// CLI arguments shared by every tsdbq command
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    #[arg(long, global = true, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

impl CommonArgs {
    /// Log level implied by the flags, `RUST_LOG` wins when set
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            "warn"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::{CONFIG, Configuration};
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Initialize logging based on CLI arguments
    pub fn init_logging(args: &CommonArgs) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(args.log_level()));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Load configuration once and keep it in [`CONFIG`]
    pub fn init_config(config_path: Option<&PathBuf>) -> Result<&'static Configuration> {
        CONFIG.get_or_try_init(|| load_config(config_path))
    }

    /// Display configuration in human-readable or JSON format
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        if json {
            let json = serde_json::to_string_pretty(config)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            println!("tsdbq configuration:");
            println!("====================");
            println!("OpenTSDB host: {}", config.tsdb.host);
            println!(
                "Query timeout: {}",
                humantime::format_duration(config.tsdb.timeout)
            );
            if config.query.target_points > 0 {
                println!("Auto-downsample target: {} points", config.query.target_points);
            } else {
                println!("Auto-downsample: disabled");
            }
        }
        Ok(())
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        if config.tsdb.host.is_empty() {
            anyhow::bail!("OpenTSDB host cannot be empty");
        }
        if config.tsdb.timeout.is_zero() {
            anyhow::bail!("Query timeout must be greater than zero");
        }
        if config.query.target_points < 0 {
            anyhow::bail!("Auto-downsample target cannot be negative");
        }
        Ok(())
    }
}
