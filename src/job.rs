//! Job wire format.
//!
//! Mirrors the Sidekiq-compatible job hash used across the worker
//! ecosystem this scheduler enqueues into: `{class, queue, args, jid,
//! created_at, enqueued_at, retry}`.

use crate::error::SchedulerResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest as _, Sha256};
use uuid::Uuid;

/// The job template as configured for a schedule: everything needed to
/// build a firing's job except the firing time itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTemplate {
    /// Worker class name, as understood by the downstream worker.
    pub class: String,

    /// Target queue. Defaults to `"default"` when absent.
    #[serde(default)]
    pub queue: Option<String>,

    /// Positional arguments passed to the worker.
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}

impl JobTemplate {
    /// The effective queue name, applying the `"default"` fallback.
    pub fn queue_name(&self) -> &str {
        self.queue.as_deref().unwrap_or("default")
    }
}

/// The deterministic portion of an enqueued job: everything that must be
/// identical across replicas computing the same (schedule, firing) pair.
/// Deliberately excludes `jid`/timestamps, which are minted fresh on every
/// attempt and would otherwise defeat content-addressed deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeterministicJob {
    pub class: String,
    pub queue: String,
    pub args: Vec<serde_json::Value>,
}

impl DeterministicJob {
    /// Canonical JSON encoding used both as the dedup lock-key component
    /// and as the basis for the final wire payload.
    pub fn encode(&self) -> SchedulerResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// SHA-256 hex digest of [`Self::encode`], used as the content-addressed
    /// component of the per-firing dedup lock key. Hashing keeps the
    /// key length constant regardless of argument payload size.
    pub fn digest(&self) -> SchedulerResult<String> {
        let encoded = self.encode()?;
        let mut hasher = Sha256::new();
        hasher.update(encoded.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Mint a fresh wire payload for this deterministic job, assigning a
    /// random `jid` and stamping `created_at`/`enqueued_at`. Called only
    /// once the lock is about to be attempted, never before.
    pub fn into_wire_payload(self, firing_time: DateTime<Utc>, enqueued_at: DateTime<Utc>) -> EnqueuedJob {
        EnqueuedJob {
            class: self.class,
            queue: self.queue,
            args: self.args,
            jid: Uuid::new_v4().simple().to_string(),
            retry: true,
            created_at: firing_time.timestamp_millis() as f64 / 1000.0,
            enqueued_at: enqueued_at.timestamp_millis() as f64 / 1000.0,
        }
    }
}

/// A fully-formed job as written to the Redis queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnqueuedJob {
    pub class: String,
    pub queue: String,
    pub args: Vec<serde_json::Value>,
    pub jid: String,
    pub retry: bool,
    pub created_at: f64,
    pub enqueued_at: f64,
}

impl EnqueuedJob {
    /// Serialize to the JSON form pushed onto the queue list.
    pub fn to_json(&self) -> SchedulerResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Appends `{"scheduled_at": <iso8601>}` to a job's args, as required when
/// `include_metadata` is set on a schedule.
pub fn with_scheduled_at_metadata(mut args: Vec<serde_json::Value>, scheduled_at_iso: &str) -> Vec<serde_json::Value> {
    args.push(json!({ "scheduled_at": scheduled_at_iso }));
    args
}
