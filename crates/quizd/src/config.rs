//! Daemon configuration.
//!
//! Resolution order, later wins:
//! 1. Built-in defaults
//! 2. TOML config file (`--config`, or `<config_dir>/quizd/config.toml` if present)
//! 3. `QUIZD_LISTEN` environment variable
//! 4. `--listen` on the command line (applied by the binary)
//!
//! ```toml
//! listen = "0.0.0.0:5150"
//! poll_interval_ms = 500
//! idle_timeout_secs = 0   # seconds of silence before a client is dropped; 0 never drops
//! max_clients = 64
//! ```

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::registry::MAX_CLIENTS;

/// Environment variable overriding the listen address.
pub const LISTEN_ENV_VAR: &str = "QUIZD_LISTEN";

/// Default listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:5150";

/// Default housekeeping interval, also the bounded wait of the event loop.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Default idle timeout; clients are only dropped on close or transport error.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 0;

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Failed to parse config file {path}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid listen address {value:?}: {error}")]
    InvalidListen { value: String, error: String },

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Runtime configuration of the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    /// Address the buzzer listener binds to
    pub listen: SocketAddr,

    /// Bounded wait of the event loop; control requests are serviced at this cadence
    pub poll_interval_ms: u64,

    /// Silent clients are dropped after this long (0 disables)
    pub idle_timeout_secs: u64,

    /// Maximum concurrent clients
    pub max_clients: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 5150)),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            max_clients: MAX_CLIENTS,
        }
    }
}

impl DaemonConfig {
    /// Returns the default config file path, if a config dir exists.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("quizd").join("config.toml"))
    }

    /// Parses configuration from TOML text.
    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Resolves file and environment layers.
    ///
    /// An explicit path must exist. The default path is used only if present.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => {
                    debug!(path = %path.display(), "Loading default config file");
                    Self::load(&path)?
                }
                None => Self::default(),
            },
        };

        config.apply_listen_override(env::var(LISTEN_ENV_VAR).ok().as_deref())?;
        Ok(config)
    }

    /// Replaces the listen address if an override is given.
    pub fn apply_listen_override(&mut self, value: Option<&str>) -> Result<(), ConfigError> {
        if let Some(value) = value {
            self.listen = value.parse().map_err(|e: std::net::AddrParseError| {
                ConfigError::InvalidListen {
                    value: value.to_string(),
                    error: e.to_string(),
                }
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_clients == 0 {
            return Err(ConfigError::Invalid {
                field: "max_clients",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Idle timeout, or `None` when the sweep is disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}
