//! # Tally Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                            │
//! │     TALLY_DB_BACKEND=memory                                             │
//! │     TALLY_DB_PATH=/var/lib/tally/tally.db                               │
//! │                                                                         │
//! │  2. TOML Config File                                                    │
//! │     ~/.config/tally-pos/tally.toml (Linux)                              │
//! │     ~/Library/Application Support/com.tally.pos/tally.toml (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! backend = "sqlite"   # sqlite | memory
//! path = "/var/lib/tally/tally.db"
//! max_connections = 5
//!
//! [sales]
//! max_attempts = 5
//! initial_backoff_ms = 10
//! max_backoff_ms = 200
//!
//! [catalog]
//! enforce_unique_sku = false
//! low_stock_threshold = 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use tally_core::LOW_STOCK_THRESHOLD;
use tally_db::DbConfig;

use crate::error::{ServiceError, ServiceResult};
use crate::retry::RetryPolicy;

// =============================================================================
// Store Backend
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// SQLite database file.
    #[default]
    Sqlite,

    /// Process-local store. Everything is lost on exit.
    Memory,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Sqlite => write!(f, "sqlite"),
            StoreBackend::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" | "file" => Ok(StoreBackend::Sqlite),
            "memory" | "mem" => Ok(StoreBackend::Memory),
            other => Err(ServiceError::InvalidConfig(format!(
                "Unknown store backend: '{}'. Valid options: sqlite, memory",
                other
            ))),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Database file. Defaults to `tally.db` in the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Default: 5
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            backend: StoreBackend::default(),
            path: None,
            max_connections: default_max_connections(),
        }
    }
}

/// Conflict retry for sale completion and stock adjustment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesSettings {
    /// Total attempts including the first. Default: 5
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Default: 10
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Default: 200
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_initial_backoff() -> u64 {
    10
}
fn default_max_backoff() -> u64 {
    200
}

impl Default for SalesSettings {
    fn default() -> Self {
        SalesSettings {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSettings {
    /// Reject a product whose SKU another product already uses.
    /// Default: false
    #[serde(default)]
    pub enforce_unique_sku: bool,

    /// Stock at or below this shows on the dashboard. Default: 10
    #[serde(default = "default_low_stock_threshold")]
    pub low_stock_threshold: i64,
}

fn default_low_stock_threshold() -> i64 {
    LOW_STOCK_THRESHOLD
}

impl Default for CatalogSettings {
    fn default() -> Self {
        CatalogSettings {
            enforce_unique_sku: false,
            low_stock_threshold: default_low_stock_threshold(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TallyConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub sales: SalesSettings,

    #[serde(default)]
    pub catalog: CatalogSettings,
}

impl TallyConfig {
    /// Defaults with the in-memory backend.
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.database.backend = StoreBackend::Memory;
        config
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (tally.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ServiceResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
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
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn save(&self, config_path: Option<PathBuf>) -> ServiceResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ServiceError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ServiceError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)
            .map_err(|e| ServiceError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Config saved");
        Ok(())
    }

    pub fn validate(&self) -> ServiceResult<()> {
        if self.database.max_connections == 0 {
            return Err(ServiceError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if self.sales.max_attempts == 0 {
            return Err(ServiceError::InvalidConfig(
                "sales.max_attempts must be greater than 0".into(),
            ));
        }
        if self.sales.initial_backoff_ms > self.sales.max_backoff_ms {
            return Err(ServiceError::InvalidConfig(format!(
                "sales.initial_backoff_ms ({}) exceeds sales.max_backoff_ms ({})",
                self.sales.initial_backoff_ms, self.sales.max_backoff_ms
            )));
        }
        if self.catalog.low_stock_threshold < 0 {
            return Err(ServiceError::InvalidConfig(
                "catalog.low_stock_threshold cannot be negative".into(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `TALLY_*` overrides read through `lookup`. Unparseable values
    /// are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup("TALLY_DB_BACKEND") {
            match backend.parse() {
                Ok(parsed) => {
                    debug!(backend = %backend, "Overriding store backend from environment");
                    self.database.backend = parsed;
                }
                Err(_) => warn!(backend = %backend, "Unknown store backend in environment"),
            }
        }

        if let Some(path) = lookup("TALLY_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(max) = lookup("TALLY_DB_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse::<u32>() {
                self.database.max_connections = n;
            }
        }

        if let Some(attempts) = lookup("TALLY_SALE_MAX_ATTEMPTS") {
            if let Ok(n) = attempts.parse::<u32>() {
                debug!(max_attempts = n, "Overriding sale retry attempts from environment");
                self.sales.max_attempts = n;
            }
        }

        if let Some(enforce) = lookup("TALLY_ENFORCE_UNIQUE_SKU") {
            match enforce.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.catalog.enforce_unique_sku = true,
                "0" | "false" | "no" => self.catalog.enforce_unique_sku = false,
                _ => warn!(value = %enforce, "Unknown TALLY_ENFORCE_UNIQUE_SKU value"),
            }
        }

        if let Some(threshold) = lookup("TALLY_LOW_STOCK_THRESHOLD") {
            if let Ok(n) = threshold.parse::<i64>() {
                self.catalog.low_stock_threshold = n;
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "pos")
            .map(|dirs| dirs.config_dir().join("tally.toml"))
    }

    fn default_database_path() -> PathBuf {
        directories::ProjectDirs::from("com", "tally", "pos")
            .map(|dirs| dirs.data_dir().join("tally.db"))
            .unwrap_or_else(|| PathBuf::from("tally.db"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(Self::default_database_path)
    }

    /// Pool settings for the SQLite backend.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database_path()).max_connections(self.database.max_connections)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.sales.max_attempts).with_backoff(
            Duration::from_millis(self.sales.initial_backoff_ms),
            Duration::from_millis(self.sales.max_backoff_ms),
        )
    }
}
