//! Sandbox configuration
//!
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. A TOML file: the explicit path, or `sandbox.toml` in the working directory
//! 3. Environment variables, e.g. `SANDBOX__EXECUTION__EXEC_LIMIT_MS=5000`
//! 4. Builder overrides (CLI flags)

use anyhow::{bail, Context, Result};
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::plugin::ExecConfig;

pub const DEFAULT_CONFIG_FILE: &str = "sandbox.toml";
pub const DEFAULT_ENV_PREFIX: &str = "SANDBOX";
pub const DEFAULT_EXEC_LIMIT_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub execution: ExecutionSettings,
    #[serde(default)]
    pub session: SessionSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSettings {
    /// Wall-clock limit handed to plugins. Plugins enforce it.
    pub exec_limit_ms: u64,
    pub retain_globals: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Session uid used to address host messages.
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load from the default sources with no overrides.
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    pub fn exec_config(&self) -> ExecConfig {
        ExecConfig {
            retain_globals: self.execution.retain_globals,
            exec_limit_ms: self.execution.exec_limit_ms,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.execution.exec_limit_ms == 0 {
            bail!("execution.exec_limit_ms must be greater than zero");
        }
        if self.logging.level.trim().is_empty() {
            bail!("logging.level must not be empty");
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    session_id: Option<String>,
    log_level: Option<String>,
    env_prefix: Option<String>,
}

impl ConfigBuilder {
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn session_id(mut self, id: Option<String>) -> Self {
        self.session_id = id;
        self
    }

    pub fn log_level(mut self, level: Option<String>) -> Self {
        self.log_level = level;
        self
    }

    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    pub fn build(self) -> Result<Config> {
        let file = match &self.config_path {
            Some(path) => File::from(path.as_path())
                .format(FileFormat::Toml)
                .required(true),
            None => File::from(std::path::Path::new(DEFAULT_CONFIG_FILE))
                .format(FileFormat::Toml)
                .required(false),
        };
        let prefix = self.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);

        let settings = config::Config::builder()
            .set_default("execution.exec_limit_ms", DEFAULT_EXEC_LIMIT_MS)?
            .set_default("execution.retain_globals", true)?
            .set_default("logging.level", "info")?
            .add_source(file)
            .add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("session.id", self.session_id)?
            .set_override_option("logging.level", self.log_level)?
            .build()
            .context("Failed to read configuration sources")?;

        let config: Config = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }
}
