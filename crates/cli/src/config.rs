//! Configuration management for magicbind.
//!
//! Uses figment to merge configuration from multiple sources:
//! 1. Default values
//! 2. Config file (TOML)
//! 3. Environment variables
//! 4. Command-line arguments

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use magicbind::{Flags, Parameter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Detection defaults
    #[serde(default)]
    pub magic: MagicConfig,

    /// Engine limits applied after opening, keyed by parameter name
    #[serde(default)]
    pub parameters: BTreeMap<String, usize>,
}

/// Detection defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MagicConfig {
    /// Flag names such as `mime_type` or `CONTINUE`
    #[serde(default)]
    pub flags: Vec<String>,

    /// Databases to load instead of the engine's defaults
    #[serde(default)]
    pub paths: Vec<String>,

    /// Fail on unreadable files instead of reporting the engine's text
    #[serde(default = "default_true")]
    pub stop_on_errors: bool,

    /// Load databases when opening
    #[serde(default = "default_true")]
    pub auto_load: bool,

    /// libmagic file to open instead of searching the usual sonames
    #[serde(default)]
    pub library: Option<String>,
}

/// A configured name that does not resolve.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown flag in configuration: {0}")]
    UnknownFlag(String),

    #[error("unknown parameter in configuration: {0}")]
    UnknownParameter(String),
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            magic: MagicConfig::default(),
            parameters: BTreeMap::new(),
        }
    }
}

impl Default for MagicConfig {
    fn default() -> Self {
        Self {
            flags: Vec::new(),
            paths: Vec::new(),
            stop_on_errors: true,
            auto_load: true,
            library: None,
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_file: Option<&PathBuf>) -> Result<Self, figment::Error> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        } else {
            let default_paths = [
                PathBuf::from("/etc/magicbind/config.toml"),
                dirs::config_dir()
                    .unwrap_or_default()
                    .join("magicbind/config.toml"),
            ];

            for path in &default_paths {
                if path.exists() {
                    figment = figment.merge(Toml::file(path));
                    break;
                }
            }
        }

        // MAGICBIND_LOG_LEVEL, MAGICBIND_MAGIC__STOP_ON_ERRORS, ...
        figment = figment.merge(Env::prefixed("MAGICBIND_").split("__"));

        figment.extract()
    }

    /// Override log level from CLI
    pub fn with_log_level(mut self, log_level: Option<String>) -> Self {
        if let Some(level) = log_level {
            self.log_level = level;
        }
        self
    }

    /// Configured flags combined into one set.
    pub fn flags(&self) -> Result<Flags, ConfigError> {
        self.magic.flags.iter().try_fold(Flags::NONE, |acc, name| {
            Flags::parse_name(name)
                .map(|flag| acc | flag)
                .ok_or_else(|| ConfigError::UnknownFlag(name.clone()))
        })
    }

    /// Configured parameters resolved to engine tags.
    pub fn parameters(&self) -> Result<Vec<(Parameter, usize)>, ConfigError> {
        self.parameters
            .iter()
            .map(|(name, value)| {
                Parameter::parse_name(name)
                    .map(|p| (p, *value))
                    .ok_or_else(|| ConfigError::UnknownParameter(name.clone()))
            })
            .collect()
    }
}
