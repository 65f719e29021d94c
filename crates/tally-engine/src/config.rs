//! # Engine Configuration
//!
//! Loyalty constants, batch pacing, store location and report thresholds.
//!
//! ## Configuration Sources (Priority Order)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Configuration Resolution                            │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_DB_PATH, TALLY_CHUNK_SIZE, TALLY_PAUSE_MS, ...               │
//! │                          │                                              │
//! │                          ▼                                              │
//! │  2. Config File (tally.toml)                                           │
//! │     ~/.config/tally/tally.toml (Linux)                                 │
//! │     ~/Library/Application Support/com.tally.tally/ (macOS)             │
//! │     %APPDATA%\tally\tally\config\ (Windows)                            │
//! │                          │                                              │
//! │                          ▼                                              │
//! │  3. Default Values (lowest priority)                                   │
//! │     250 starting points, rates 40/50, chunks of 400, 1 s pause         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use tally_core::loyalty::LoyaltyPolicy;
use tally_core::{Money, DEFAULT_EXCLUSION_TAGS, IMPORT_TAG};
use tally_store::StoreConfig;

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Loyalty Settings
// =============================================================================

/// Point balance rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltySettings {
    /// Opening balance of every new customer.
    #[serde(default = "default_starting_points")]
    pub starting_points: i64,

    /// Points per currency unit when redeemed as a sale discount.
    #[serde(default = "default_discount_rate")]
    pub discount_rate: i64,

    /// Points per currency unit when redeemed as cash back.
    #[serde(default = "default_cashback_rate")]
    pub cashback_rate: i64,

    /// Customers carrying any of these tags never hold points.
    #[serde(default = "default_exclusion_tags")]
    pub exclusion_tags: Vec<String>,

    /// Tag stamped on customers created by a CSV import.
    #[serde(default = "default_import_tag")]
    pub import_tag: String,
}

fn default_starting_points() -> i64 {
    tally_core::STARTING_POINTS
}

fn default_discount_rate() -> i64 {
    tally_core::DISCOUNT_RATE
}

fn default_cashback_rate() -> i64 {
    tally_core::CASHBACK_RATE
}

fn default_exclusion_tags() -> Vec<String> {
    DEFAULT_EXCLUSION_TAGS.iter().map(|t| t.to_string()).collect()
}

fn default_import_tag() -> String {
    IMPORT_TAG.to_string()
}

impl Default for LoyaltySettings {
    fn default() -> Self {
        LoyaltySettings {
            starting_points: default_starting_points(),
            discount_rate: default_discount_rate(),
            cashback_rate: default_cashback_rate(),
            exclusion_tags: default_exclusion_tags(),
            import_tag: default_import_tag(),
        }
    }
}

// =============================================================================
// Batch Settings
// =============================================================================

/// Pacing of bulk jobs (reconciliation, import, purge).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Documents written per committed chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Wait between chunks (milliseconds).
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,
}

fn default_chunk_size() -> usize {
    400
}

fn default_pause_ms() -> u64 {
    1000
}

impl Default for BatchSettings {
    fn default() -> Self {
        BatchSettings {
            chunk_size: default_chunk_size(),
            pause_ms: default_pause_ms(),
        }
    }
}

impl BatchSettings {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

// =============================================================================
// Store Settings
// =============================================================================

/// Where the SQLite document store lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Database file. Defaults to the platform data directory.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_store_path() -> PathBuf {
    directories::ProjectDirs::from("com", "tally", "tally")
        .map(|dirs| dirs.data_dir().join("tally.db"))
        .unwrap_or_else(|| PathBuf::from("tally.db"))
}

fn default_max_connections() -> u32 {
    5
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            path: default_store_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Report Settings
// =============================================================================

/// Thresholds used by the dashboard reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSettings {
    /// Daily profit target, as a decimal amount ("5000.00").
    #[serde(default = "default_daily_goal")]
    pub daily_goal: String,

    /// Days without a purchase before a customer counts as inactive.
    #[serde(default = "default_inactivity_days")]
    pub inactivity_days: u32,
}

fn default_daily_goal() -> String {
    "5000.00".to_string()
}

fn default_inactivity_days() -> u32 {
    30
}

impl Default for ReportSettings {
    fn default() -> Self {
        ReportSettings {
            daily_goal: default_daily_goal(),
            inactivity_days: default_inactivity_days(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete engine configuration.
///
/// ## Example Config File
/// ```toml
/// [loyalty]
/// starting_points = 250
/// discount_rate = 40
/// cashback_rate = 50
/// exclusion_tags = ["تاجر", "يوتيوبر"]
/// import_tag = "مستورد"
///
/// [batch]
/// chunk_size = 400
/// pause_ms = 1000
///
/// [store]
/// path = "/var/lib/tally/tally.db"
/// max_connections = 5
///
/// [reports]
/// daily_goal = "5000.00"
/// inactivity_days = 30
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyConfig {
    #[serde(default)]
    pub loyalty: LoyaltySettings,

    #[serde(default)]
    pub batch: BatchSettings,

    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub reports: ReportSettings,
}

impl TallyConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (tally.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
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

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> EngineResult<PathBuf> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EngineError::Config("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Config saved");
        Ok(path)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.loyalty.starting_points < 0 {
            return Err(EngineError::Config(
                "starting_points must not be negative".into(),
            ));
        }

        if self.loyalty.discount_rate <= 0 || self.loyalty.cashback_rate <= 0 {
            return Err(EngineError::Config(
                "discount_rate and cashback_rate must be greater than 0".into(),
            ));
        }

        if self.loyalty.import_tag.trim().is_empty() {
            return Err(EngineError::Config("import_tag must not be empty".into()));
        }

        if self.batch.chunk_size == 0 {
            return Err(EngineError::Config(
                "chunk_size must be greater than 0".into(),
            ));
        }

        if self.store.max_connections == 0 {
            return Err(EngineError::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        Money::parse_decimal(&self.reports.daily_goal)
            .map_err(|e| EngineError::Config(format!("daily_goal: {}", e)))?;

        Ok(())
    }

    /// Applies `TALLY_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("TALLY_DB_PATH") {
            debug!(path = %path, "Overriding store path from environment");
            self.store.path = PathBuf::from(path);
        }

        if let Some(size) = lookup("TALLY_CHUNK_SIZE") {
            match size.parse::<usize>() {
                Ok(n) => self.batch.chunk_size = n,
                Err(_) => warn!(value = %size, "Ignoring invalid TALLY_CHUNK_SIZE"),
            }
        }

        if let Some(pause) = lookup("TALLY_PAUSE_MS") {
            match pause.parse::<u64>() {
                Ok(ms) => self.batch.pause_ms = ms,
                Err(_) => warn!(value = %pause, "Ignoring invalid TALLY_PAUSE_MS"),
            }
        }

        if let Some(points) = lookup("TALLY_STARTING_POINTS") {
            if let Ok(p) = points.parse::<i64>() {
                self.loyalty.starting_points = p;
            }
        }

        if let Some(rate) = lookup("TALLY_DISCOUNT_RATE") {
            if let Ok(r) = rate.parse::<i64>() {
                self.loyalty.discount_rate = r;
            }
        }

        if let Some(rate) = lookup("TALLY_CASHBACK_RATE") {
            if let Ok(r) = rate.parse::<i64>() {
                self.loyalty.cashback_rate = r;
            }
        }

        if let Some(goal) = lookup("TALLY_DAILY_GOAL") {
            self.reports.daily_goal = goal;
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "tally")
            .map(|dirs| dirs.config_dir().join("tally.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// The loyalty rules this configuration describes.
    pub fn policy(&self) -> LoyaltyPolicy {
        LoyaltyPolicy {
            starting_points: self.loyalty.starting_points,
            discount_rate: self.loyalty.discount_rate,
            cashback_rate: self.loyalty.cashback_rate,
            exclusion_tags: self.loyalty.exclusion_tags.iter().cloned().collect(),
        }
    }

    /// Connection settings for the SQLite store.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(self.store.path.clone()).max_connections(self.store.max_connections)
    }

    /// Daily profit target. Falls back to the default when unparsable.
    pub fn daily_goal(&self) -> Money {
        Money::parse_decimal(&self.reports.daily_goal).unwrap_or(Money::from_major(5_000))
    }
}
