//! Engine configuration
//!
//! Configuration is loaded once at startup with the `config` crate and then
//! passed explicitly into the engine. Values come from built-in defaults,
//! optional `config/default` and `config/{RUN_MODE}` files and `OCS__*`
//! environment variables.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

/// Main engine configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub rating: RatingConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

/// A value that applies to calls of a tenant when its filters pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicOpt {
    /// Tenant this option applies to; empty or `*any` matches every tenant
    #[serde(default)]
    pub tenant: String,

    /// Filters handed to the filter evaluator; empty always passes
    #[serde(default)]
    pub filter_ids: Vec<String>,

    pub value: serde_json::Value,
}

/// Rating and debit settings
#[derive(Debug, Deserialize, Clone)]
pub struct RatingConfig {
    /// Decimals used when rounding a whole call cost
    #[serde(default = "default_rounding_decimals")]
    pub rounding_decimals: u32,

    /// Maximum depth when chasing fallback rating subjects
    #[serde(default = "default_max_recursion_depth")]
    pub max_recursion_depth: u32,

    /// Shortest destination prefix tried during longest-prefix matching
    #[serde(default = "default_min_prefix_match")]
    pub min_prefix_match: usize,

    /// Attempts to lock a consistent shared-group member set
    #[serde(default = "default_max_lock_retries")]
    pub max_lock_retries: u32,

    /// Per-tenant overrides of `rounding_decimals`
    #[serde(default)]
    pub rounding_decimals_opts: Vec<DynamicOpt>,

    /// Per-tenant overrides of `max_recursion_depth`
    #[serde(default)]
    pub max_recursion_depth_opts: Vec<DynamicOpt>,
}

fn default_rounding_decimals() -> u32 {
    5
}

fn default_max_recursion_depth() -> u32 {
    3
}

fn default_min_prefix_match() -> usize {
    1
}

fn default_max_lock_retries() -> u32 {
    3
}

/// Redis store configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// TTL applied to written accounts in seconds, 0 keeps them forever
    #[serde(default)]
    pub default_ttl_secs: u64,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

impl EngineConfig {
    /// Load configuration from environment and optional config files
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .set_default("rating.rounding_decimals", 5)?
            .set_default("rating.max_recursion_depth", 3)?
            .set_default("rating.min_prefix_match", 1)?
            .set_default("rating.max_lock_retries", 3)?
            .set_default("store.redis_url", default_redis_url())?
            .set_default("store.default_ttl_secs", 0)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::with_prefix("OCS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        tracing::debug!("Loaded engine configuration for run mode {}", run_mode);
        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("OCS").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            rounding_decimals: default_rounding_decimals(),
            max_recursion_depth: default_max_recursion_depth(),
            min_prefix_match: default_min_prefix_match(),
            max_lock_retries: default_max_lock_retries(),
            rounding_decimals_opts: Vec::new(),
            max_recursion_depth_opts: Vec::new(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            default_ttl_secs: 0,
        }
    }
}
