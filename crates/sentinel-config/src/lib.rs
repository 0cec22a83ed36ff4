// crates/sentinel-config/src/lib.rs
// ============================================================================
// Module: Sentinel Configuration
// Description: Canonical configuration model, validation, and TOML loading.
// Purpose: Provide strict, fail-closed config parsing with sane defaults for
// every subsystem.
// Dependencies: serde, toml
// ============================================================================

//! ## Overview
//! Configuration loads from a TOML file (or embedded defaults when no file is
//! given) and is validated once, eagerly, at startup via
//! [`SentinelConfig::load`]. Validation failures are structured
//! [`ConfigError`]s rather than panics, per the ambient-stack requirement
//! that config never fails by surprise at first use.

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "sentinel.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "SENTINEL_CONFIG";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;

/// Root configuration for a Sentinel process.
#[derive(Debug, Clone, Deserialize)]
pub struct SentinelConfig {
    /// Job Manager admission settings.
    #[serde(default)]
    pub jobs: JobsConfig,
    /// Worker Runtime pool sizing.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Storage backend selection and connection settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// License Manager client settings.
    #[serde(default)]
    pub license: LicenseConfig,
    /// Event Batcher window settings.
    #[serde(default)]
    pub events: EventsConfig,
    /// Findings Shard Store sharding settings.
    #[serde(default)]
    pub shards: ShardsConfig,
    /// Metrics Pipeline fan-out settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Delivery Layer retry settings.
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

impl SentinelConfig {
    /// Loads configuration from disk using the default resolution rules: an
    /// explicit `path`, else `SENTINEL_CONFIG`, else `sentinel.toml` in the
    /// working directory, else built-in defaults if no file exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file exists but cannot be read,
    /// parsed, or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path);
        if !resolved.exists() {
            let mut config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any section is invalid.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.jobs.validate()?;
        self.worker.validate()?;
        self.store.validate()?;
        self.license.validate()?;
        self.events.validate()?;
        self.shards.validate()?;
        self.metrics.validate()?;
        self.delivery.validate()?;
        Ok(())
    }
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            jobs: JobsConfig::default(),
            worker: WorkerConfig::default(),
            store: StoreConfig::default(),
            license: LicenseConfig::default(),
            events: EventsConfig::default(),
            shards: ShardsConfig::default(),
            metrics: MetricsConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }
}

/// Job Manager admission settings.
#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// Maximum concurrent running jobs across the whole deployment.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: u32,
    /// Default job timeout, in seconds, when not overridden per ruleset.
    #[serde(default = "default_job_timeout_seconds")]
    pub default_timeout_seconds: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            default_timeout_seconds: default_job_timeout_seconds(),
        }
    }
}

impl JobsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid("jobs.max_concurrent_jobs must be greater than zero".to_string()));
        }
        if self.default_timeout_seconds == 0 {
            return Err(ConfigError::Invalid("jobs.default_timeout_seconds must be greater than zero".to_string()));
        }
        Ok(())
    }
}

const fn default_max_concurrent_jobs() -> u32 {
    64
}

const fn default_job_timeout_seconds() -> u64 {
    3_600
}

/// Worker Runtime pool sizing.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Maximum concurrent per-region worker tasks per job.
    #[serde(default = "default_regions_per_job")]
    pub max_regions_per_job: u32,
    /// Number of resources scanned between cooperative cancellation checks.
    #[serde(default = "default_cancellation_check_interval")]
    pub cancellation_check_interval: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_regions_per_job: default_regions_per_job(),
            cancellation_check_interval: default_cancellation_check_interval(),
        }
    }
}

impl WorkerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_regions_per_job == 0 {
            return Err(ConfigError::Invalid("worker.max_regions_per_job must be greater than zero".to_string()));
        }
        if self.cancellation_check_interval == 0 {
            return Err(ConfigError::Invalid(
                "worker.cancellation_check_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

const fn default_regions_per_job() -> u32 {
    16
}

const fn default_cancellation_check_interval() -> u32 {
    100
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Single-node SQLite document/object storage.
    Sqlite,
    /// Postgres document storage and S3 object storage.
    Enterprise,
}

/// Storage backend selection and connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Which backend implementation to construct.
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,
    /// Filesystem path to the SQLite database file.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,
    /// Postgres connection string, required when `backend` is `enterprise`.
    pub postgres_url: Option<String>,
    /// S3 bucket name, required when `backend` is `enterprise`.
    pub s3_bucket: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            sqlite_path: default_sqlite_path(),
            postgres_url: None,
            s3_bucket: None,
        }
    }
}

impl StoreConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.backend == StoreBackend::Enterprise && (self.postgres_url.is_none() || self.s3_bucket.is_none()) {
            return Err(ConfigError::Invalid(
                "store.postgres_url and store.s3_bucket are required when backend is enterprise".to_string(),
            ));
        }
        Ok(())
    }
}

const fn default_store_backend() -> StoreBackend {
    StoreBackend::Sqlite
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("sentinel.sqlite3")
}

/// License Manager client settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LicenseConfig {
    /// License Manager base URL.
    #[serde(default = "default_license_endpoint")]
    pub endpoint: String,
    /// Idempotency window for license requests, in seconds.
    #[serde(default = "default_license_nonce_window_seconds")]
    pub nonce_window_seconds: u64,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            endpoint: default_license_endpoint(),
            nonce_window_seconds: default_license_nonce_window_seconds(),
        }
    }
}

impl LicenseConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.is_empty() {
            return Err(ConfigError::Invalid("license.endpoint must not be empty".to_string()));
        }
        if self.nonce_window_seconds == 0 {
            return Err(ConfigError::Invalid("license.nonce_window_seconds must be greater than zero".to_string()));
        }
        Ok(())
    }
}

fn default_license_endpoint() -> String {
    "https://license.internal".to_string()
}

const fn default_license_nonce_window_seconds() -> u64 {
    300
}

/// Event Batcher window settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Batching window duration, in seconds.
    #[serde(default = "default_batch_window_seconds")]
    pub batch_window_seconds: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { batch_window_seconds: default_batch_window_seconds() }
    }
}

impl EventsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_window_seconds == 0 {
            return Err(ConfigError::Invalid("events.batch_window_seconds must be greater than zero".to_string()));
        }
        Ok(())
    }
}

const fn default_batch_window_seconds() -> u64 {
    60
}

/// Findings Shard Store sharding settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ShardsConfig {
    /// Number of shard buckets per `(tenant, cloud)` partition.
    #[serde(default = "default_shard_count")]
    pub shard_count: u32,
}

impl Default for ShardsConfig {
    fn default() -> Self {
        Self { shard_count: default_shard_count() }
    }
}

impl ShardsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.shard_count == 0 {
            return Err(ConfigError::Invalid("shards.shard_count must be greater than zero".to_string()));
        }
        Ok(())
    }
}

const fn default_shard_count() -> u32 {
    16
}

/// Metrics Pipeline fan-out settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Maximum concurrent partition tasks per pipeline stage.
    #[serde(default = "default_metrics_fanout")]
    pub max_concurrent_partitions: u32,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { max_concurrent_partitions: default_metrics_fanout() }
    }
}

impl MetricsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_partitions == 0 {
            return Err(ConfigError::Invalid(
                "metrics.max_concurrent_partitions must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

const fn default_metrics_fanout() -> u32 {
    32
}

/// Delivery Layer retry settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Maximum delivery attempts before giving up and recording the report
    /// for manual retry.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base backoff duration, in milliseconds, before jitter is applied.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self { max_attempts: default_max_attempts(), base_backoff_ms: default_base_backoff_ms() }
    }
}

impl DeliveryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("delivery.max_attempts must be greater than zero".to_string()));
        }
        if self.max_attempts > 5 {
            return Err(ConfigError::Invalid("delivery.max_attempts must not exceed 5".to_string()));
        }
        Ok(())
    }
}

const fn default_max_attempts() -> u32 {
    5
}

const fn default_base_backoff_ms() -> u64 {
    250
}

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Resolves the config path from an explicit argument, the environment, or
/// the default filename.
fn resolve_path(path: Option<&Path>) -> PathBuf {
    if let Some(path) = path {
        return path.to_path_buf();
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        return PathBuf::from(env_path);
    }
    PathBuf::from(DEFAULT_CONFIG_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_pass_validation() {
        let mut config = SentinelConfig::default();
        config.validate().expect("defaults must validate");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = SentinelConfig::load(Some(Path::new("/nonexistent/sentinel.toml"))).expect("load defaults");
        assert_eq!(config.jobs.max_concurrent_jobs, default_max_concurrent_jobs());
    }

    #[test]
    fn enterprise_backend_without_postgres_url_is_rejected() {
        let mut config = SentinelConfig {
            store: StoreConfig { backend: StoreBackend::Enterprise, ..StoreConfig::default() },
            ..SentinelConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_overrides_from_toml_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sentinel.toml");
        let mut file = fs::File::create(&path).expect("create file");
        writeln!(file, "[jobs]\nmax_concurrent_jobs = 12\n").expect("write file");
        let config = SentinelConfig::load(Some(&path)).expect("load config");
        assert_eq!(config.jobs.max_concurrent_jobs, 12);
    }
}
