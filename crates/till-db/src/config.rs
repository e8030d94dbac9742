//! # Engine Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TILL_DATABASE_PATH=/var/lib/till/till.db                            │
//! │     TILL_LOG=info,till_db=debug                                         │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/till/till.toml (Linux)                                    │
//! │     ~/Library/Application Support/com.till.ledger/till.toml (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "till.db"
//! max_connections = 5
//! busy_timeout_secs = 10
//!
//! [numbering]
//! invoice_code = "INV"
//! quote_code = "QUO"
//! padding = 6
//!
//! [outbox]
//! batch_size = 100
//! max_attempts = 10
//! poll_interval_secs = 5
//!
//! [logging]
//! filter = "info,till_db=debug"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use till_core::numbering::default_code;
use till_core::DocumentType;

use crate::pool::DbConfig;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Sections
// =============================================================================

/// `[database]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits for the write lock before failing.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("till.db")
}
fn default_max_connections() -> u32 {
    5
}
fn default_busy_timeout() -> u64 {
    10
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}

/// `[numbering]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberingSettings {
    #[serde(default = "default_invoice_code")]
    pub invoice_code: String,

    #[serde(default = "default_quote_code")]
    pub quote_code: String,

    #[serde(default = "default_padding")]
    pub padding: usize,
}

fn default_invoice_code() -> String {
    default_code(DocumentType::Invoice).to_string()
}
fn default_quote_code() -> String {
    default_code(DocumentType::Quote).to_string()
}
fn default_padding() -> usize {
    6
}

impl Default for NumberingSettings {
    fn default() -> Self {
        NumberingSettings {
            invoice_code: default_invoice_code(),
            quote_code: default_quote_code(),
            padding: default_padding(),
        }
    }
}

impl NumberingSettings {
    /// Code used when a series is first created.
    pub fn code_for(&self, document_type: DocumentType) -> &str {
        match document_type {
            DocumentType::Invoice => &self.invoice_code,
            DocumentType::Quote => &self.quote_code,
        }
    }
}

/// `[outbox]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Entries that failed this many times are skipped.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_batch_size() -> u32 {
    100
}
fn default_max_attempts() -> i64 {
    10
}
fn default_poll_interval() -> u64 {
    5
}

impl Default for OutboxSettings {
    fn default() -> Self {
        OutboxSettings {
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl OutboxSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `tracing_subscriber::EnvFilter` directive.
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            filter: default_filter(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TillConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub numbering: NumberingSettings,

    #[serde(default)]
    pub outbox: OutboxSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl TillConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`till.toml`)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading till config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load till config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn from_toml(contents: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.numbering.invoice_code.trim().is_empty()
            || self.numbering.quote_code.trim().is_empty()
        {
            return Err(ConfigError::Invalid(
                "numbering codes must not be empty".into(),
            ));
        }

        if self.numbering.padding > 18 {
            return Err(ConfigError::Invalid(
                "numbering.padding must be at most 18".into(),
            ));
        }

        if self.outbox.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "outbox.batch_size must be greater than 0".into(),
            ));
        }

        if self.outbox.max_attempts <= 0 {
            return Err(ConfigError::Invalid(
                "outbox.max_attempts must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Pool settings derived from `[database]`.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database.path.clone())
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_secs(self.database.busy_timeout_secs))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("TILL_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(max) = std::env::var("TILL_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring invalid TILL_MAX_CONNECTIONS"),
            }
        }

        if let Ok(filter) = std::env::var("TILL_LOG") {
            self.logging.filter = filter;
        }

        if let Ok(batch) = std::env::var("TILL_OUTBOX_BATCH_SIZE") {
            match batch.parse::<u32>() {
                Ok(n) => self.outbox.batch_size = n,
                Err(_) => warn!(value = %batch, "Ignoring invalid TILL_OUTBOX_BATCH_SIZE"),
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "till", "ledger")
            .map(|dirs| dirs.config_dir().join("till.toml"))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
