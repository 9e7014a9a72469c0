//! sidecron - distributed cron-style job scheduler
//!
//! Ticks a set of cron schedules on every running replica and enqueues
//! due firings into a Sidekiq-compatible Redis queue. Safety against
//! duplicate enqueues comes from a per-firing, content-addressed dedup
//! lock in Redis rather than leader election: every replica ticks every
//! schedule, and at most one of them wins the lock for a given
//! (schedule, firing) pair.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         sidecron replica                       │
//! │                                                                 │
//! │   bootstrap ──▶ Scheduler ──▶ tick(now) per registered Schedule │
//! │                     │               │                           │
//! │                     │               ▼                           │
//! │                     │        cron_eval::firings_within           │
//! │                     │               │                           │
//! │                     │               ▼                           │
//! │                     │        Storage::enqueue (SET NX lock)      │
//! │                     ▼               │                           │
//! │                 RedisGateway ────────┴──▶ worker queue (LPUSH)   │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Multiple replicas of this same diagram run against the same Redis
//! instance; the lock in `Storage::enqueue` is what keeps them from
//! double-enqueuing a firing.

pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod cron_eval;
pub mod error;
pub mod job;
pub mod metrics;
pub mod redis;
pub mod retry;
pub mod schedule;
pub mod scheduler;
pub mod storage;

pub use bootstrap::{bootstrap, init_tracing};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::SchedulerSettings;
pub use error::{SchedulerError, SchedulerResult};
pub use job::{DeterministicJob, EnqueuedJob, JobTemplate};
pub use schedule::{Schedule, ScheduleOptions, ScheduledJob};
pub use scheduler::Scheduler;
pub use storage::Storage;

/// Commonly used types, re-exported for convenient `use sidecron::prelude::*`.
pub mod prelude {
    pub use crate::clock::Clock;
    pub use crate::config::SchedulerSettings;
    pub use crate::error::{SchedulerError, SchedulerResult};
    pub use crate::schedule::Schedule;
    pub use crate::scheduler::Scheduler;
}
