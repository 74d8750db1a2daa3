use crate::constants::defaults;
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Engine-wide configuration.
///
/// Values come from three layers, later layers winning: compiled defaults,
/// an optional config file (TOML/YAML/JSON via [`EngineConfig::load`]), and
/// `MAESTRO_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Connection string for the durable state store (postgres feature).
    pub database_url: String,
    /// Global cap on concurrently executing steps across all executions.
    pub max_concurrent_steps: usize,
    /// Optional secondary cap on concurrently executing steps per tenant.
    pub per_tenant_slots: Option<usize>,
    /// Default retry budget for steps whose template declares none.
    pub default_max_retries: u32,
    pub backoff: BackoffConfig,
    /// Wall-clock budget for a single producer invocation.
    pub step_timeout_ms: u64,
    /// How long a cancelled producer gets to abort cooperatively before its
    /// slot is forcibly reclaimed.
    pub cancellation_grace_ms: u64,
    /// Reject/rework cycles allowed before an execution is forced to failed.
    pub max_rework_cycles: u32,
    /// Broadcast channel capacity for the event publisher.
    pub event_channel_capacity: usize,
    pub custom_settings: HashMap<String, String>,
}

/// Exponential backoff settings for step retry scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: defaults::BACKOFF_BASE_MS,
            max_ms: defaults::BACKOFF_MAX_MS,
            multiplier: defaults::BACKOFF_MULTIPLIER,
            jitter: false,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "postgresql://localhost/maestro_development".to_string(),
            max_concurrent_steps: defaults::MAX_CONCURRENT_STEPS,
            per_tenant_slots: None,
            default_max_retries: defaults::MAX_RETRIES,
            backoff: BackoffConfig::default(),
            step_timeout_ms: defaults::STEP_TIMEOUT_MS,
            cancellation_grace_ms: defaults::CANCELLATION_GRACE_MS,
            max_rework_cycles: defaults::MAX_REWORK_CYCLES,
            event_channel_capacity: defaults::EVENT_CHANNEL_CAPACITY,
            custom_settings: HashMap::new(),
        }
    }
}

impl EngineConfig {
    /// Build configuration from compiled defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            config.database_url = db_url;
        }

        if let Ok(max_concurrent) = std::env::var("MAESTRO_MAX_CONCURRENT_STEPS") {
            config.max_concurrent_steps = max_concurrent.parse().map_err(|e| {
                EngineError::ConfigurationError(format!("Invalid max_concurrent_steps: {e}"))
            })?;
        }

        if let Ok(retry_limit) = std::env::var("MAESTRO_DEFAULT_MAX_RETRIES") {
            config.default_max_retries = retry_limit.parse().map_err(|e| {
                EngineError::ConfigurationError(format!("Invalid default_max_retries: {e}"))
            })?;
        }

        if let Ok(rework) = std::env::var("MAESTRO_MAX_REWORK_CYCLES") {
            config.max_rework_cycles = rework.parse().map_err(|e| {
                EngineError::ConfigurationError(format!("Invalid max_rework_cycles: {e}"))
            })?;
        }

        if let Ok(timeout) = std::env::var("MAESTRO_STEP_TIMEOUT_MS") {
            config.step_timeout_ms = timeout.parse().map_err(|e| {
                EngineError::ConfigurationError(format!("Invalid step_timeout_ms: {e}"))
            })?;
        }

        Ok(config)
    }

    /// Layered load: defaults, then an optional config file, then
    /// `MAESTRO_*` environment variables (e.g. `MAESTRO_STEP_TIMEOUT_MS`).
    pub fn load(file: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix("MAESTRO"))
            .build()
            .map_err(|e| EngineError::ConfigurationError(e.to_string()))?;

        settings
            .try_deserialize()
            .map_err(|e| EngineError::ConfigurationError(e.to_string()))
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn cancellation_grace(&self) -> Duration {
        Duration::from_millis(self.cancellation_grace_ms)
    }
}
