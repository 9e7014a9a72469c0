//! Scheduler error types.

use thiserror::Error;

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-related errors.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Bootstrap-time configuration problem: missing field, malformed cron,
    /// unknown timezone, unknown option key. Fatal at bootstrap.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Any Redis I/O failure. Non-fatal: the tick logs and the next tick
    /// retries, relying on the miss window to absorb the lost firing.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Job serialization failed for a single schedule during a tick.
    #[error("encoding error: {0}")]
    EncodingError(String),

    /// Redis error, wrapped into `StorageUnavailable` at the gateway boundary.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Connection pool error, wrapped into `StorageUnavailable` at the gateway boundary.
    #[error("redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),
}

impl SchedulerError {
    /// True if this error represents a transient Redis failure that the
    /// caller should retry rather than treat as fatal.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SchedulerError::StorageUnavailable(_)
                | SchedulerError::Redis(_)
                | SchedulerError::Pool(_)
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::EncodingError(err.to_string())
    }
}
