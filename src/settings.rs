//! Settings loaded from TOML
//!
//! ```toml
//! path = "irma_configuration"
//! assets = "assets/irma_configuration"
//!
//! [http]
//! timeout_seconds = 30
//! user_agent = "irma-scheme/0.1.0"
//!
//! [logging]
//! filter = "info"
//! ```
//!
//! Every key is optional; unknown keys are rejected.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default configuration root
pub const DEFAULT_PATH: &str = "irma_configuration";

/// Default per-request HTTP timeout
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Upper bound for `http.timeout_seconds`
pub const MAX_TIMEOUT_SECONDS: u64 = 600;

pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("http.timeout_seconds must be in (0, {max}], got {value}")]
    TimeoutOutOfBounds { value: u64, max: u64 },

    #[error("http.user_agent must not be empty")]
    EmptyUserAgent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Configuration root holding one folder per scheme manager
    pub path: PathBuf,
    /// Read-only tree the configuration is seeded from
    pub assets: Option<PathBuf>,
    pub http: HttpSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpSettings {
    pub timeout_seconds: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` takes precedence
    pub filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_PATH),
            assets: None,
            http: HttpSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            user_agent: format!("irma-scheme/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Settings {
    pub fn from_toml_str(s: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let timeout = self.http.timeout_seconds;
        if timeout == 0 || timeout > MAX_TIMEOUT_SECONDS {
            return Err(SettingsError::TimeoutOutOfBounds {
                value: timeout,
                max: MAX_TIMEOUT_SECONDS,
            });
        }
        if self.http.user_agent.trim().is_empty() {
            return Err(SettingsError::EmptyUserAgent);
        }
        Ok(())
    }
}
