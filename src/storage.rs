//! Persistence layer: schedule definitions, enable state, firing
//! bookkeeping, and the guarded enqueue protocol.

use crate::config::ScheduleConfig;
use crate::error::SchedulerResult;
use crate::redis::{PipelineOp, RedisGateway, RedisKeys};
use crate::schedule::ScheduledJob;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

/// Storage facade over a [`RedisGateway`], implementing the storage schema and
/// the guarded enqueue protocol.
pub struct Storage {
    gateway: Arc<dyn RedisGateway>,
    keys: RedisKeys,
}

impl Storage {
    pub fn new(gateway: Arc<dyn RedisGateway>, keys: RedisKeys) -> Self {
        Self { gateway, keys }
    }

    /// Persist a schedule's configured definition. Called at bootstrap for
    /// every configured schedule.
    pub async fn persist_schedule(&self, name: &str, config: &ScheduleConfig) -> SchedulerResult<()> {
        let encoded = serde_json::to_string(config)?;
        self.gateway.hset(&self.keys.schedules(), name, &encoded).await
    }

    /// Load every persisted schedule definition, keyed by name. Entries
    /// that fail to deserialize are logged and skipped rather than
    /// aborting the whole load (a single bad entry shouldn't take
    /// down the rest of the fleet).
    pub async fn load_schedules(&self) -> SchedulerResult<Vec<(String, ScheduleConfig)>> {
        let entries = self.gateway.hgetall(&self.keys.schedules()).await?;
        let mut loaded = Vec::with_capacity(entries.len());
        for (name, raw) in entries {
            match serde_json::from_str::<ScheduleConfig>(&raw) {
                Ok(config) => loaded.push((name, config)),
                Err(e) => warn!(schedule = %name, error = %e, "skipping unparseable persisted schedule"),
            }
        }
        Ok(loaded)
    }

    /// Whether a schedule is enabled. A missing or malformed entry is
    /// treated as enabled, logged as a warning rather than failing the
    /// tick.
    pub async fn is_enabled(&self, name: &str) -> SchedulerResult<bool> {
        match self.gateway.hget(&self.keys.states(), name).await? {
            None => Ok(true),
            Some(raw) => match raw.parse::<bool>() {
                Ok(enabled) => Ok(enabled),
                Err(_) => {
                    warn!(schedule = %name, value = %raw, "malformed enable state, treating schedule as enabled");
                    Ok(true)
                }
            },
        }
    }

    pub async fn set_enabled(&self, name: &str, enabled: bool) -> SchedulerResult<()> {
        self.gateway.hset(&self.keys.states(), name, &enabled.to_string()).await
    }

    /// Record that a schedule ticked at `now`, regardless of whether
    /// anything fired: `first_runs` is written once and never
    /// overwritten, `last_runs` is overwritten on every tick.
    pub async fn record_times(&self, name: &str, now: DateTime<Utc>) -> SchedulerResult<()> {
        let iso = now.to_rfc3339();
        self.gateway.hsetnx(&self.keys.first_runs(), name, &iso).await?;
        self.gateway.hset(&self.keys.last_runs(), name, &iso).await?;
        Ok(())
    }

    /// Record the instant a schedule most recently fired and the instant
    /// it's next expected to, used for observability.
    pub async fn record_firing_times(
        &self,
        name: &str,
        last_fired: DateTime<Utc>,
        next_expected: Option<DateTime<Utc>>,
    ) -> SchedulerResult<()> {
        self.gateway
            .hset(&self.keys.last_times(), name, &last_fired.to_rfc3339())
            .await?;
        if let Some(next) = next_expected {
            self.gateway.hset(&self.keys.next_times(), name, &next.to_rfc3339()).await?;
        }
        Ok(())
    }

    /// Attempt to enqueue a single firing, guarded by the content-addressed
    /// dedup lock. Returns `Ok(true)` if this call won the
    /// race and enqueued the job, `Ok(false)` if another replica already
    /// had (never an error for lock contention).
    pub async fn enqueue(&self, scheduled_job: &ScheduledJob, enqueued_at: DateTime<Utc>) -> SchedulerResult<bool> {
        let digest = scheduled_job.job.digest()?;
        let firing_iso = scheduled_job.firing_time.to_rfc3339();
        let lock_key = self.keys.enqueued_lock(&digest, &firing_iso);

        let wire_job = scheduled_job.job.clone().into_wire_payload(scheduled_job.firing_time, enqueued_at);
        let payload = wire_job.to_json()?;

        let ops = vec![
            PipelineOp::Sadd {
                key: self.keys.queues(),
                member: wire_job.queue.clone(),
            },
            PipelineOp::Lpush {
                key: self.keys.queue(&wire_job.queue),
                value: payload,
            },
        ];

        self.gateway.cas(&lock_key, &enqueued_at.to_rfc3339(), ops).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::DeterministicJob;
    use crate::redis::mock::InMemoryRedisGateway;
    use chrono::TimeZone;
    use serde_json::json;

    fn keys() -> RedisKeys {
        RedisKeys::new("sidecron", "exq")
    }

    fn storage() -> (Storage, Arc<InMemoryRedisGateway>) {
        let gateway = Arc::new(InMemoryRedisGateway::new());
        (Storage::new(gateway.clone(), keys()), gateway)
    }

    fn sample_config() -> ScheduleConfig {
        ScheduleConfig {
            description: "test".to_string(),
            cron: "* * * * *".to_string(),
            class: "NoopWorker".to_string(),
            queue: None,
            args: vec![],
            include_metadata: false,
            enabled: true,
            timezone: None,
            miss_window_secs: None,
        }
    }

    #[tokio::test]
    async fn persisted_schedules_round_trip() {
        let (storage, _gateway) = storage();
        storage.persist_schedule("heartbeat", &sample_config()).await.unwrap();
        let loaded = storage.load_schedules().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].0, "heartbeat");
        assert_eq!(loaded[0].1.class, "NoopWorker");
    }

    #[tokio::test]
    async fn malformed_persisted_schedule_is_skipped_not_fatal() {
        let (storage, gateway) = storage();
        gateway.hset("sidecron:schedules", "broken", "not json").await.unwrap();
        storage.persist_schedule("heartbeat", &sample_config()).await.unwrap();
        let loaded = storage.load_schedules().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].0, "heartbeat");
    }

    #[tokio::test]
    async fn missing_enable_state_defaults_to_enabled() {
        let (storage, _gateway) = storage();
        assert!(storage.is_enabled("heartbeat").await.unwrap());
    }

    #[tokio::test]
    async fn malformed_enable_state_defaults_to_enabled() {
        let (storage, gateway) = storage();
        gateway.hset("sidecron:states", "heartbeat", "maybe").await.unwrap();
        assert!(storage.is_enabled("heartbeat").await.unwrap());
    }

    #[tokio::test]
    async fn explicit_disabled_state_is_respected() {
        let (storage, _gateway) = storage();
        storage.set_enabled("heartbeat", false).await.unwrap();
        assert!(!storage.is_enabled("heartbeat").await.unwrap());
    }

    #[tokio::test]
    async fn first_run_is_write_once_last_run_overwrites() {
        let (storage, gateway) = storage();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 0).unwrap();
        storage.record_times("heartbeat", t0).await.unwrap();
        storage.record_times("heartbeat", t1).await.unwrap();

        let first = gateway.hget("sidecron:first_runs", "heartbeat").await.unwrap();
        let last = gateway.hget("sidecron:last_runs", "heartbeat").await.unwrap();
        assert_eq!(first, Some(t0.to_rfc3339()));
        assert_eq!(last, Some(t1.to_rfc3339()));
    }

    #[tokio::test]
    async fn enqueue_locks_out_second_attempt_for_same_firing() {
        let (storage, gateway) = storage();
        let firing = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let job = ScheduledJob {
            job: DeterministicJob {
                class: "NoopWorker".to_string(),
                queue: "default".to_string(),
                args: vec![json!(1)],
            },
            firing_time: firing,
        };

        let first = storage.enqueue(&job, firing).await.unwrap();
        let second = storage.enqueue(&job, firing).await.unwrap();

        assert!(first);
        assert!(!second);
        assert_eq!(gateway.list_contents("exq:queue:default").len(), 1);
        assert!(gateway.set_contents("exq:queues").contains("default"));
    }

    #[tokio::test]
    async fn two_replicas_computing_same_firing_converge_on_one_lock() {
        // Independent `ScheduledJob` values built from identical
        // (schedule, firing) inputs must race on the same lock key, even
        // though each carries its own fresh `jid` once minted.
        let (storage, _gateway) = storage();
        let firing = Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap();
        let make_job = || ScheduledJob {
            job: DeterministicJob {
                class: "NoopWorker".to_string(),
                queue: "default".to_string(),
                args: vec![json!("shared")],
            },
            firing_time: firing,
        };

        let replica_a = storage.enqueue(&make_job(), firing).await.unwrap();
        let replica_b = storage.enqueue(&make_job(), firing).await.unwrap();

        assert!(replica_a);
        assert!(!replica_b);
    }
}
