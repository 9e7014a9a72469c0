//! Redis-backed storage primitives.
//!
//! Two implementations exist behind the [`RedisGateway`] trait: a
//! production gateway backed by a pooled connection
//! ([`gateway::RedisGatewayImpl`]), and an in-memory test double
//! ([`mock::InMemoryRedisGateway`]) that lets the storage and scheduler
//! layers be tested without a live Redis server.

pub mod gateway;
pub mod mock;

pub use gateway::RedisGatewayImpl;

use crate::error::SchedulerResult;
use async_trait::async_trait;

/// Key builder for both the scheduler's own namespace and the worker
/// (Sidekiq-compatible) namespace it enqueues into.
#[derive(Debug, Clone)]
pub struct RedisKeys {
    /// Namespace for scheduler bookkeeping: persisted schedules, enable
    /// state, last/next/first firing times.
    scheduler_ns: String,

    /// Namespace shared with the downstream worker fleet: queues and the
    /// per-firing dedup lock records.
    worker_ns: String,
}

impl RedisKeys {
    pub fn new(scheduler_ns: impl Into<String>, worker_ns: impl Into<String>) -> Self {
        Self {
            scheduler_ns: scheduler_ns.into(),
            worker_ns: worker_ns.into(),
        }
    }

    /// Hash of persisted schedule definitions, keyed by schedule name.
    pub fn schedules(&self) -> String {
        format!("{}:schedules", self.scheduler_ns)
    }

    /// Hash of per-schedule enable state.
    pub fn states(&self) -> String {
        format!("{}:states", self.scheduler_ns)
    }

    /// Hash of each schedule's most recent firing instant.
    pub fn last_times(&self) -> String {
        format!("{}:last_times", self.scheduler_ns)
    }

    /// Hash of each schedule's next expected firing instant.
    pub fn next_times(&self) -> String {
        format!("{}:next_times", self.scheduler_ns)
    }

    /// Hash recording the first time each schedule was ever observed,
    /// written once and never overwritten.
    pub fn first_runs(&self) -> String {
        format!("{}:first_runs", self.scheduler_ns)
    }

    /// Hash recording each schedule's most recent tick, overwritten every
    /// time regardless of whether anything fired.
    pub fn last_runs(&self) -> String {
        format!("{}:last_runs", self.scheduler_ns)
    }

    /// The set of known queue names, used by the worker fleet to discover
    /// which queues to poll.
    pub fn queues(&self) -> String {
        format!("{}:queues", self.worker_ns)
    }

    /// The list a given queue's jobs are pushed onto.
    pub fn queue(&self, queue_name: &str) -> String {
        format!("{}:queue:{}", self.worker_ns, queue_name)
    }

    /// The permanent, TTL-less dedup lock record for one (job, firing)
    /// pair. Content-addressed: identical across replicas computing the
    /// same deterministic job at the same firing instant.
    pub fn enqueued_lock(&self, job_digest: &str, firing_iso: &str) -> String {
        format!("{}:enqueued_jobs:{}:{}", self.worker_ns, job_digest, firing_iso)
    }
}

/// A single write folded into the atomic half of the guarded enqueue
/// protocol: queue registration and the job push.
#[derive(Debug, Clone)]
pub enum PipelineOp {
    Sadd { key: String, member: String },
    Lpush { key: String, value: String },
}

/// Storage-facing operations the scheduler needs from Redis. Kept narrow
/// and Sidekiq-shaped rather than exposing a generic Redis client, so the
/// in-memory test double can implement it exactly.
#[async_trait]
pub trait RedisGateway: Send + Sync {
    async fn hset(&self, key: &str, field: &str, value: &str) -> SchedulerResult<()>;

    async fn hsetnx(&self, key: &str, field: &str, value: &str) -> SchedulerResult<bool>;

    async fn hget(&self, key: &str, field: &str) -> SchedulerResult<Option<String>>;

    async fn hkeys(&self, key: &str) -> SchedulerResult<Vec<String>>;

    async fn hgetall(&self, key: &str) -> SchedulerResult<Vec<(String, String)>>;

    /// Attempt to acquire the dedup lock at `lock_key` (`SET NX`, no TTL —
    /// the record is permanent). If acquired, atomically apply
    /// `ops` in the same round trip. Returns `false` without side effects
    /// if the lock was already held; never returns an error for lock
    /// contention.
    async fn cas(&self, lock_key: &str, lock_value: &str, ops: Vec<PipelineOp>) -> SchedulerResult<bool>;
}
