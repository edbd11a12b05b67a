use anyhow::Result;
use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use garde::Validate;
use std::path::PathBuf;

use super::AppConfig;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "staff-access", version, about = "Page-access policy service for the staff portal")]
pub struct Cli {
    /// Path to an extra configuration file, merged after the environment file
    #[arg(long, env = "APP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Server port
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Environment name (development, staging, production)
    #[arg(long, env = "ENVIRONMENT")]
    pub environment: Option<String>,

    /// Path of the JSON document store
    #[arg(long)]
    pub store_path: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

/// Load configuration from the process arguments
pub fn load_config() -> Result<AppConfig> {
    load_config_from(&Cli::parse())
}

/// Load configuration with the layered hierarchy:
/// defaults, `config/default.toml`, `config/{env}.toml`, `APP_` variables, CLI flags
pub fn load_config_from(cli: &Cli) -> Result<AppConfig> {
    load_config_in(cli, "config")
}

pub(crate) fn load_config_in(cli: &Cli, config_dir: impl Into<PathBuf>) -> Result<AppConfig> {
    let config_dir = config_dir.into();
    let env_name = cli.environment.clone().unwrap_or_else(|| {
        std::env::var("ENVIRONMENT").unwrap_or_else(|_| "production".to_string())
    });

    let mut figment = Figment::new()
        // 1. Embedded defaults (lowest priority)
        .merge(Serialized::defaults(AppConfig::default()))
        // 2. Default config file
        .merge(Toml::file(config_dir.join("default.toml")))
        // 3. Environment-specific config
        .merge(Toml::file(config_dir.join(format!("{}.toml", env_name))))
        .merge(Serialized::default("environment", env_name.to_lowercase()));

    if let Some(path) = &cli.config {
        figment = figment.merge(Toml::file(path));
    }

    // 4. Environment variables with APP_ prefix
    figment = figment.merge(Env::prefixed("APP_").split("__"));

    // 5. CLI arguments (highest priority)
    if let Some(port) = cli.port {
        figment = figment.merge(Serialized::default("server.port", port));
    }
    if let Some(path) = &cli.store_path {
        figment = figment.merge(Serialized::default("store.path", path));
    }
    if cli.debug {
        figment = figment.merge(Serialized::default("logging.level", "debug"));
    }

    let config: AppConfig = figment.extract()?;

    config.validate()?;

    Ok(config)
}
