//! Configuration management for CampusHub
//!
//! Process-wide configuration: loaded once at startup (from a TOML file,
//! with environment-variable overrides), validated, and immutable
//! thereafter. Every component receives the section it needs by value.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Persistent store configuration
    pub store: StoreConfig,

    /// Content moderation configuration
    pub moderation: ModerationConfig,

    /// Administrative gate configuration
    pub admin: AdminConfig,

    /// Logging configuration
    pub logging: LoggingSection,
}

/// Persistent store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("campushub.db"),
        }
    }
}

/// Content moderation configuration
///
/// When `enabled` is false, or the classifier cannot be reached within
/// `classifier_timeout`, content passes unflagged (fail-open policy).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    /// Whether content moderation is active
    pub enabled: bool,

    /// Remote classifier endpoint
    pub classifier_endpoint: Option<String>,

    /// Credential for the classifier endpoint
    pub classifier_api_key: Option<String>,

    /// Upper bound on a single classifier call
    #[serde(with = "humantime_serde")]
    pub classifier_timeout: Duration,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            classifier_endpoint: None,
            classifier_api_key: None,
            classifier_timeout: Duration::from_secs(5),
        }
    }
}

/// Administrative gate configuration
///
/// A single shared secret elevates an account to the `admin` role at
/// registration or login. A supplied-but-mismatched secret is a hard
/// authentication failure, never a silent downgrade.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// The shared admin secret
    pub secret: String,
}

/// Logging section of the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Emit JSON-formatted log lines
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment
    /// overrides and validate.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileReadError(format!("{}: {}", path.display(), e)))?;
        let mut config: Config =
            toml::from_str(&raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply `CAMPUSHUB_*` environment variable overrides.
    fn apply_env(&mut self) {
        if let Ok(v) = env::var("CAMPUSHUB_DB_PATH") {
            self.store.db_path = PathBuf::from(v);
        }
        if let Ok(v) = env::var("CAMPUSHUB_MODERATION_ENABLED") {
            self.moderation.enabled = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = env::var("CAMPUSHUB_CLASSIFIER_ENDPOINT") {
            self.moderation.classifier_endpoint = Some(v);
        }
        if let Ok(v) = env::var("CAMPUSHUB_CLASSIFIER_API_KEY") {
            self.moderation.classifier_api_key = Some(v);
        }
        if let Ok(v) = env::var("CAMPUSHUB_ADMIN_SECRET") {
            self.admin.secret = v;
        }
        if let Ok(v) = env::var("CAMPUSHUB_LOG_LEVEL") {
            self.logging.level = v;
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.moderation.classifier_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "moderation.classifier_timeout must be non-zero".to_string(),
            ));
        }
        if self.moderation.enabled && self.moderation.classifier_endpoint.is_none() {
            return Err(ConfigError::ValidationFailed(
                "moderation.enabled requires moderation.classifier_endpoint".to_string(),
            ));
        }
        if crate::logging::LogLevel::from_str(&self.logging.level).is_none() {
            return Err(ConfigError::InvalidValue(format!(
                "unknown log level '{}'",
                self.logging.level
            )));
        }
        Ok(())
    }
}
