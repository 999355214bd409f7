//! Bridge configuration
//!
//! Loaded from TOML; every section and field has a default, so an empty
//! document is a valid configuration.
//!
//! ```toml
//! [registry]
//! duplicates = "reuse"      # or "reject"
//! collisions = "first-wins" # or "reject"
//!
//! [logging]
//! level = "debug"
//! json = false
//! ```

use crate::logging::{self, LogConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Environment variable naming a config file
pub const CONFIG_ENV: &str = "NRNBRIDGE_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub duplicates: DuplicatePolicy,

    #[serde(default)]
    pub collisions: CollisionPolicy,
}

/// What to do when a host type is registered a second time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Return the existing descriptor
    #[default]
    Reuse,
    /// Fail with `RegistrationError::AlreadyRegistered`
    Reject,
}

/// What to do when overloads collapse to one foreign signature
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionPolicy {
    /// Keep all variants; resolution picks the first registered
    #[default]
    FirstWins,
    /// Refuse to register the class
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,

    #[serde(default)]
    pub file: Option<String>,

    #[serde(default)]
    pub spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            file: None,
            spans: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl LoggingConfig {
    /// Translate into the logging module's config
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            level: logging::parse_level(&self.level).unwrap_or(tracing::Level::INFO),
            log_path: self.file.clone(),
            json_format: self.json,
            show_spans: self.spans,
        }
    }
}

/// Failure to load a configuration file
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "Failed to read config: {}", e),
            Self::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl BridgeConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(ConfigError::Parse)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content)
    }

    /// Load from the file named by `NRNBRIDGE_CONFIG`, or use defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(Path::new(&path)),
            Err(_) => Ok(Self::default()),
        }
    }
}
