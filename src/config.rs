use crate::core::{ExecError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::executor::DEFAULT_TIMEOUT;

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    /// Stored procedures: name to SQL body
    #[serde(default)]
    pub procedures: HashMap<String, String>,
}

/// Database-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub connection_string: String,
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Parses configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Config> {
        let config: Config = toml::from_str(content).map_err(|e| ExecError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Command timeout, falling back to the executor default.
    pub fn timeout(&self) -> Duration {
        self.database
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    fn validate(&self) -> Result<()> {
        if self.database.connection_string.trim().is_empty() {
            return Err(ExecError::Config(
                "database.connection_string must not be empty".to_string(),
            ));
        }
        if self.database.timeout_secs == Some(0) {
            return Err(ExecError::Config(
                "database.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if let Some((name, _)) = self.procedures.iter().find(|(_, body)| body.trim().is_empty()) {
            return Err(ExecError::Config(format!("procedure '{}' has an empty body", name)));
        }
        Ok(())
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Arguments
///
/// * `path` - The file path to the TOML configuration file.
///
/// # Example
///
/// ```no_run
/// let config = sqlexec::config::load_config("config.toml").expect("Failed to load config");
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    Config::from_toml_str(&content)
}

/// Default location of the configuration file: `<config dir>/sqlexec/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("sqlexec").join("config.toml"))
}
