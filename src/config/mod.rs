//! Configuration management for the blocking query client.
//!
//! Provides hierarchical configuration loading from multiple sources with priority:
//! 1. Default values (hardcoded)
//! 2. Config file named by `CONFIG_PATH`
//! 3. Override files applied with [`BlockingConfig::with_override_config`]
//! 4. Environment variables with the `BLOCKING__` prefix (highest priority)


use std::env;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Tunables for long-poll watches
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BlockingConfig {
    /// Slug handed to the settings provider when asking whether blocking is enabled
    /// Default: "client"
    #[serde(default = "default_settings_slug")]
    pub settings_slug: String,

    /// Buffered events per source before slow listeners start lagging
    /// Default: 16
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Keep the last cursor/event of closed sources and resume from it on reopen
    /// Default: true
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            settings_slug: default_settings_slug(),
            event_capacity: default_event_capacity(),
            cache_enabled: default_cache_enabled(),
        }
    }
}

impl BlockingConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `BLOCKING__` prefix (highest priority)
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("BLOCKING__SETTINGS_SLUG", "ui");
    /// let cfg = BlockingConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("BLOCKING")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Environment variables are layered again on top of the file.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("BLOCKING")
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    pub fn validate(self) -> Result<Self> {
        if self.settings_slug.trim().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "settings_slug must not be empty".to_string(),
            )));
        }

        if self.event_capacity == 0 {
            return Err(Error::Config(ConfigError::Message(
                "event_capacity must be > 0".to_string(),
            )));
        }

        Ok(self)
    }
}

fn default_settings_slug() -> String {
    "client".to_string()
}
fn default_event_capacity() -> usize {
    16
}
fn default_cache_enabled() -> bool {
    true
}
