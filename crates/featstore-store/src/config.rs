//! Store configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::id::IdProviderType;

/// Default number of upserts queued before a batch is flushed.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 10_000;

/// Feature store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file path.
    pub path: PathBuf,
    /// Table name, the store variant's default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Scope given to every internal id issued by this store.
    pub id_scope: u32,
    /// How new internal ids are assigned.
    pub id_provider: IdProviderType,
    /// Rows fetched per page when iterating entries.
    pub fetch_size: usize,
    /// Batched ingestion settings.
    pub batch: BatchConfig,
    /// Entry cache settings.
    pub cache: CacheConfig,
    /// Connection pool settings.
    pub pool: PoolConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: crate::default_db_path(),
            table: None,
            id_scope: 1,
            id_provider: IdProviderType::default(),
            fetch_size: 1000,
            batch: BatchConfig::default(),
            cache: CacheConfig::default(),
            pool: PoolConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Load configuration from the default path, or defaults if it is missing.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return all problems found.
    ///
    /// Table names are interpolated into SQL, so they must be plain
    /// identifiers (`[A-Za-z_][A-Za-z0-9_]*`).
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError::new("path", "database path cannot be empty"));
        }
        if let Some(table) = &self.table
            && !is_identifier(table)
        {
            errors.push(ValidationError::new(
                "table",
                format!("invalid table name '{}'", table),
            ));
        }
        if self.fetch_size == 0 {
            errors.push(ValidationError::new("fetch_size", "must be at least 1"));
        }
        errors.extend(self.batch.validate());
        errors.extend(self.pool.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Configuration for a store at `path` with every other setting defaulted.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// Batched ingestion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Queue upserts and flush them in one transaction.
    pub enabled: bool,
    /// Pending upserts that force a flush.
    pub max_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

impl BatchConfig {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.max_size == 0 {
            errors.push(ValidationError::new("batch.max_size", "must be at least 1"));
        }
        errors
    }
}

/// Entry cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached entries.
    pub max_capacity: u64,
    /// Entries not read for this long are evicted.
    pub idle_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 150_000,
            idle_timeout_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Connection pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of open connections.
    pub max_size: usize,
    /// How long to wait for a free connection.
    pub acquire_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 4,
            acquire_timeout_ms: 5_000,
        }
    }
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.max_size == 0 {
            errors.push(ValidationError::new("pool.max_size", "must be at least 1"));
        }
        if self.acquire_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "pool.acquire_timeout_ms",
                "must be at least 1",
            ));
        }
        errors
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation problem with the field it concerns.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g. `batch.max_size`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("featstore")
        .join("store.toml")
}
