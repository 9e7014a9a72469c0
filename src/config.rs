//! Typed configuration tree mirroring the external configuration schema.
//!
//! Configuration loading (file discovery, env var overlay) is provided as
//! a convenience for the host process that embeds this crate; it is not
//! part of the core scheduler engine, which only ever consumes the typed
//! structs below.

use crate::error::{SchedulerError, SchedulerResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable prefix used when overlaying configuration
/// (`SIDECRON_STORAGE_OPTS__NAMESPACE`, etc).
pub const ENV_PREFIX: &str = "SIDECRON";

/// Top-level settings tree, matching the configuration schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerSettings {
    #[serde(default)]
    pub storage_opts: StorageOpts,

    #[serde(default)]
    pub server_opts: ServerOpts,

    #[serde(default)]
    pub redis: RedisSpecWrapper,

    /// Schedules keyed by name.
    #[serde(default)]
    pub schedules: HashMap<String, ScheduleConfig>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            storage_opts: StorageOpts::default(),
            server_opts: ServerOpts::default(),
            redis: RedisSpecWrapper::default(),
            schedules: HashMap::new(),
        }
    }
}

impl SchedulerSettings {
    /// Load configuration from layered TOML files plus `SIDECRON_`-prefixed
    /// environment variable overrides, following this crate's existing
    /// layered-config convention: `{dir}/default.toml`, then
    /// `{dir}/{SIDECRON_ENVIRONMENT}.toml`, then `{dir}/local.toml`, then env.
    pub fn load(config_dir: impl AsRef<Path>) -> SchedulerResult<Self> {
        let config_dir = config_dir.as_ref();

        if let Err(e) = dotenvy::dotenv() {
            debug!("no .env file found or error loading it: {e}");
        }

        let environment = std::env::var("SIDECRON_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        info!(environment = %environment, "loading scheduler configuration");

        let mut builder = config::Config::builder();

        for candidate in [
            config_dir.join("default.toml"),
            config_dir.join(format!("{environment}.toml")),
            config_dir.join("local.toml"),
        ] {
            if candidate.exists() {
                debug!(path = %candidate.display(), "loading config layer");
                builder = builder.add_source(config::File::from(candidate).required(false));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let built = builder
            .build()
            .map_err(|e| SchedulerError::ConfigInvalid(e.to_string()))?;

        built
            .try_deserialize()
            .map_err(|e| SchedulerError::ConfigInvalid(e.to_string()))
    }
}

/// Scheduler-owned key prefixes ("scheduler namespace" vs "worker namespace").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageOpts {
    /// Scheduler state key prefix (schedules, states, times).
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Worker queue / lock key prefix, shared with the downstream workers.
    #[serde(default = "default_exq_namespace")]
    pub exq_namespace: String,
}

impl Default for StorageOpts {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            exq_namespace: default_exq_namespace(),
        }
    }
}

fn default_namespace() -> String {
    "sidecron".to_string()
}

fn default_exq_namespace() -> String {
    "exq".to_string()
}

/// Server-wide tick behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerOpts {
    /// Miss window, in milliseconds. Any positive duration is valid;
    /// defaults to 100_000ms (100s).
    #[serde(default = "default_missed_jobs_threshold_ms")]
    pub missed_jobs_threshold_duration: u64,

    /// Default timezone offset (e.g. `"+00:00"`) for schedules that don't
    /// specify their own.
    #[serde(default = "default_time_zone")]
    pub time_zone: String,

    /// Inter-tick sleep, in seconds.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
}

impl Default for ServerOpts {
    fn default() -> Self {
        Self {
            missed_jobs_threshold_duration: default_missed_jobs_threshold_ms(),
            time_zone: default_time_zone(),
            tick_interval_secs: default_tick_interval_secs(),
        }
    }
}

impl ServerOpts {
    pub fn missed_jobs_threshold(&self) -> Duration {
        Duration::from_millis(self.missed_jobs_threshold_duration)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

fn default_missed_jobs_threshold_ms() -> u64 {
    100_000
}

fn default_time_zone() -> String {
    "+00:00".to_string()
}

fn default_tick_interval_secs() -> u64 {
    1
}

/// Wraps the `redis.spec` configuration table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisSpecWrapper {
    #[serde(default)]
    pub spec: RedisSpec,
}

impl Default for RedisSpecWrapper {
    fn default() -> Self {
        Self {
            spec: RedisSpec::default(),
        }
    }
}

/// Redis connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisSpec {
    #[serde(default = "default_redis_url")]
    pub url: String,

    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Per-operation timeout.
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    /// Initial backoff interval for a failed Redis operation.
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    /// Capped maximum backoff interval (this crate caps it equal to
    /// the initial interval by default, i.e. no growth beyond one retry
    /// cadence).
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for RedisSpec {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_pool_size(),
            connect_timeout_ms: default_connect_timeout_ms(),
            operation_timeout_ms: default_operation_timeout_ms(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_pool_size() -> usize {
    10
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_operation_timeout_ms() -> u64 {
    5_000
}

fn default_backoff_initial_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    1_000
}

/// A single schedule entry as configured: `name → {description, cron,
/// class, queue?, args?, include_metadata?, enabled?, timezone?,
/// miss_window_secs?}`. Unknown keys are rejected rather than silently
/// ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub description: String,

    pub cron: String,

    pub class: String,

    #[serde(default)]
    pub queue: Option<String>,

    #[serde(default)]
    pub args: Vec<serde_json::Value>,

    #[serde(default)]
    pub include_metadata: bool,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub timezone: Option<String>,

    #[serde(default)]
    pub miss_window_secs: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = SchedulerSettings::default();
        assert_eq!(settings.storage_opts.namespace, "sidecron");
        assert_eq!(settings.storage_opts.exq_namespace, "exq");
        assert_eq!(settings.server_opts.missed_jobs_threshold_duration, 100_000);
        assert_eq!(settings.server_opts.time_zone, "+00:00");
        assert_eq!(settings.redis.spec.backoff_initial_ms, 1_000);
        assert_eq!(settings.redis.spec.backoff_max_ms, 1_000);
    }

    #[test]
    fn schedule_config_rejects_unknown_keys() {
        let raw = r#"{"cron": "* * * * *", "class": "Foo", "bogus": true}"#;
        let result: Result<ScheduleConfig, _> = serde_json::from_str(raw);
        assert!(result.is_err());
    }

    #[test]
    fn schedule_config_enabled_defaults_true() {
        let raw = r#"{"cron": "* * * * *", "class": "Foo"}"#;
        let parsed: ScheduleConfig = serde_json::from_str(raw).unwrap();
        assert!(parsed.enabled);
        assert!(!parsed.include_metadata);
    }
}
