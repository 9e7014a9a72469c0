//! Production Redis gateway: pooled connections, per-operation timeout,
//! and capped exponential backoff on transient failures.

use super::{PipelineOp, RedisGateway};
use crate::config::RedisSpec;
use crate::error::{SchedulerError, SchedulerResult};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;
use std::time::Duration;
use tracing::info;

/// Build a connection pool and verify connectivity with a `PING`,
/// matching the bootstrap check the rest of this codebase performs.
pub async fn create_pool(spec: &RedisSpec) -> SchedulerResult<Pool> {
    info!("creating redis connection pool for scheduler storage");

    let cfg = Config::from_url(&spec.url);
    let pool = cfg
        .builder()
        .map_err(|e| SchedulerError::ConfigInvalid(format!("invalid redis config: {e}")))?
        .max_size(spec.pool_size)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| SchedulerError::ConfigInvalid(format!("failed to build redis pool: {e}")))?;

    let mut conn = pool.get().await?;
    redis::cmd("PING").query_async::<String>(&mut *conn).await?;

    info!("redis connection pool created");
    Ok(pool)
}

/// Production [`RedisGateway`] backed by a pooled `deadpool-redis` client.
pub struct RedisGatewayImpl {
    pool: Pool,
    operation_timeout: Duration,
    retry_policy: RetryPolicy,
}

impl RedisGatewayImpl {
    pub fn new(pool: Pool, spec: &RedisSpec) -> Self {
        Self {
            pool,
            operation_timeout: Duration::from_millis(spec.operation_timeout_ms),
            retry_policy: RetryPolicy::new(
                3,
                Duration::from_millis(spec.backoff_initial_ms),
                Duration::from_millis(spec.backoff_max_ms),
            ),
        }
    }

    async fn conn(&self) -> SchedulerResult<deadpool_redis::Connection> {
        Ok(self.pool.get().await?)
    }

    /// Run a single Redis operation under the per-operation timeout,
    /// retrying transient failures with backoff.
    async fn with_retry<F, Fut, T>(&self, op: F) -> SchedulerResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = SchedulerResult<T>>,
    {
        self.retry_policy
            .execute(|| async {
                match tokio::time::timeout(self.operation_timeout, op()).await {
                    Ok(result) => result,
                    Err(_) => Err(SchedulerError::StorageUnavailable(
                        "redis operation timed out".to_string(),
                    )),
                }
            })
            .await
    }
}

#[async_trait]
impl RedisGateway for RedisGatewayImpl {
    async fn hset(&self, key: &str, field: &str, value: &str) -> SchedulerResult<()> {
        self.with_retry(|| async {
            let mut conn = self.conn().await?;
            let _: () = conn.hset(key, field, value).await?;
            Ok(())
        })
        .await
    }

    async fn hsetnx(&self, key: &str, field: &str, value: &str) -> SchedulerResult<bool> {
        self.with_retry(|| async {
            let mut conn = self.conn().await?;
            let set: bool = conn.hset_nx(key, field, value).await?;
            Ok(set)
        })
        .await
    }

    async fn hget(&self, key: &str, field: &str) -> SchedulerResult<Option<String>> {
        self.with_retry(|| async {
            let mut conn = self.conn().await?;
            let value: Option<String> = conn.hget(key, field).await?;
            Ok(value)
        })
        .await
    }

    async fn hkeys(&self, key: &str) -> SchedulerResult<Vec<String>> {
        self.with_retry(|| async {
            let mut conn = self.conn().await?;
            let keys: Vec<String> = conn.hkeys(key).await?;
            Ok(keys)
        })
        .await
    }

    async fn hgetall(&self, key: &str) -> SchedulerResult<Vec<(String, String)>> {
        self.with_retry(|| async {
            let mut conn = self.conn().await?;
            let entries: std::collections::HashMap<String, String> = conn.hgetall(key).await?;
            Ok(entries.into_iter().collect())
        })
        .await
    }

    async fn cas(&self, lock_key: &str, lock_value: &str, ops: Vec<PipelineOp>) -> SchedulerResult<bool> {
        self.with_retry(|| async {
            let mut conn = self.conn().await?;

            let acquired: bool = conn.set_nx(lock_key, lock_value).await?;
            if !acquired {
                return Ok(false);
            }

            if !ops.is_empty() {
                let mut pipe = redis::pipe();
                pipe.atomic();
                for op in &ops {
                    match op {
                        PipelineOp::Sadd { key, member } => {
                            pipe.sadd(key, member);
                        }
                        PipelineOp::Lpush { key, value } => {
                            pipe.lpush(key, value);
                        }
                    }
                }
                let _: () = pipe.query_async(&mut *conn).await?;
            }

            Ok(true)
        })
        .await
    }
}
