//! Layered configuration: embedded defaults, an optional file, then the
//! environment.

use super::types::ServerConfig;
use anyhow::{Context, Result};
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use config::builder::DefaultState;
use std::path::PathBuf;
use tracing::{info, warn};

const DEFAULTS: &str = include_str!("defaults.toml");

/// Conventional Redis variables and the config keys they override.
const REDIS_ENV_OVERRIDES: [(&str, &str); 5] = [
    ("REDIS_URL", "cache.redis.url"),
    ("REDIS_HOST", "cache.redis.host"),
    ("REDIS_PORT", "cache.redis.port"),
    ("REDIS_PASSWORD", "cache.redis.password"),
    ("REDIS_DB", "cache.redis.db"),
];

/// Builds a [`ServerConfig`] from its sources, lowest precedence first.
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_prefix: String,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            file: None,
            env_prefix: "ARTHUB".to_string(),
        }
    }

    /// Layer a TOML/YAML/JSON file over the defaults. A missing file is
    /// skipped with a warning.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Prefix of `<PREFIX>__SECTION__KEY` variables.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn load(&self) -> Result<ServerConfig> {
        self.load_with(|name| std::env::var(name).ok())
    }

    /// Like [`load`](Self::load), reading the `REDIS_*` variables through
    /// `lookup`.
    pub fn load_with<F>(&self, lookup: F) -> Result<ServerConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = self.sources();

        for (var, key) in REDIS_ENV_OVERRIDES {
            let value = lookup(var).filter(|v| !v.trim().is_empty());
            builder = builder
                .set_override_option(key, value)
                .with_context(|| format!("Invalid override for {var}"))?;
        }

        builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    fn sources(&self) -> ConfigBuilder<DefaultState> {
        let mut builder = Config::builder().add_source(File::from_str(DEFAULTS, FileFormat::Toml));

        match &self.file {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "Loading config file");
                builder = builder.add_source(File::from(path.as_path()));
            }
            Some(path) => warn!(path = %path.display(), "Config file not found, skipping"),
            None => {}
        }

        builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .separator("__")
                .try_parsing(true),
        )
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Load configuration, taking the optional file from `CONFIG_PATH`.
pub fn load_config() -> Result<ServerConfig> {
    match std::env::var_os("CONFIG_PATH") {
        Some(path) => ConfigLoader::new().with_file(path).load(),
        None => ConfigLoader::new().load(),
    }
}
