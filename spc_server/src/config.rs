//! Configuration Management
//!
//! Configuration values are read from environment variables with sensible defaults.
//!
//! ## Configuration Variables
//!
//! - `DATABASE_URL`: SQLite database URL (default: `sqlite://spc.db`)
//! - `BIND_ADDRESS`: HTTP server bind address (default: `0.0.0.0:8000`)
//! - `SPC_CONNECT_TIMEOUT_SECS`: connection-test timeout in seconds (default: `5`)
//! - `SPC_DEFAULT_ROLE`: role given to newly registered users (default: `READ_ONLY`)
//! - `SPC_LOG_DIR`: when set, also write a daily-rolling log file there
//! - `SPC_LOG_JSON`: `1`/`true` to log JSON lines to stdout

use std::path::PathBuf;
use std::time::Duration;

use spc_model::Role;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub connect_timeout: Duration,
    pub default_role: Role,
    pub log_dir: Option<PathBuf>,
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://spc.db".to_string(),
            bind_address: "0.0.0.0:8000".to_string(),
            connect_timeout: Duration::from_secs(5),
            default_role: Role::ReadOnly,
            log_dir: None,
            log_json: false,
        }
    }
}

#[derive(Debug)]
pub struct ConfigError {
    pub variable: &'static str,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid {}: {}", self.variable, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(url) = lookup("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(addr) = lookup("BIND_ADDRESS") {
            config.bind_address = addr;
        }
        if let Some(secs) = lookup("SPC_CONNECT_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| ConfigError {
                variable: "SPC_CONNECT_TIMEOUT_SECS",
                message: format!("expected a whole number of seconds, got {:?}", secs),
            })?;
            if secs == 0 {
                return Err(ConfigError {
                    variable: "SPC_CONNECT_TIMEOUT_SECS",
                    message: "must be at least 1".to_string(),
                });
            }
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(role) = lookup("SPC_DEFAULT_ROLE") {
            config.default_role = role.parse().map_err(|message| ConfigError {
                variable: "SPC_DEFAULT_ROLE",
                message,
            })?;
        }
        config.log_dir = lookup("SPC_LOG_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from);
        config.log_json = lookup("SPC_LOG_JSON")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(config)
    }
}
