//! Bootstrap: turn configuration into a running [`Scheduler`].

use crate::clock::SystemClock;
use crate::config::SchedulerSettings;
use crate::error::SchedulerResult;
use crate::redis::gateway::{create_pool, RedisGatewayImpl};
use crate::redis::RedisKeys;
use crate::schedule::Schedule;
use crate::scheduler::Scheduler;
use crate::storage::Storage;
use crate::metrics::SchedulerMetrics;
use crate::schedule;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a process-global tracing subscriber: an `EnvFilter` read from
/// `RUST_LOG` (defaulting to `"info,sidecron=debug"`) and either a plain or
/// JSON-formatted fmt layer depending on `json_output`. Call once, before
/// [`bootstrap`]. Safe to call in tests via `try_init`, which ignores a
/// subscriber already installed by an earlier test in the same process.
pub fn init_tracing(json_output: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sidecron=debug"));

    let registry = tracing_subscriber::registry().with(filter);
    if json_output {
        let _ = registry.with(tracing_subscriber::fmt::layer().json()).try_init();
    } else {
        let _ = registry.with(tracing_subscriber::fmt::layer().with_target(true)).try_init();
    }
}

/// Build a fully-wired [`Scheduler`] from settings: connect to Redis,
/// persist every configured schedule, register it in memory, and return
/// the scheduler without starting its tick loop. A malformed schedule
/// aborts bootstrap entirely (`ConfigInvalid` is fatal at startup).
pub async fn bootstrap(settings: &SchedulerSettings) -> SchedulerResult<Scheduler> {
    info!(schedules = settings.schedules.len(), "bootstrapping scheduler");

    let pool = create_pool(&settings.redis.spec).await?;
    let gateway = Arc::new(RedisGatewayImpl::new(pool, &settings.redis.spec));
    let keys = RedisKeys::new(&settings.storage_opts.namespace, &settings.storage_opts.exq_namespace);
    let storage = Arc::new(Storage::new(gateway, keys));

    let default_tz_offset = schedule::parse_fixed_offset(&settings.server_opts.time_zone)?;

    let scheduler = Scheduler::new(
        Arc::new(SystemClock),
        storage.clone(),
        settings.server_opts.missed_jobs_threshold(),
        settings.server_opts.tick_interval(),
    );

    for (name, config) in &settings.schedules {
        let built = Schedule::from_config(name, config, default_tz_offset)?;
        storage.persist_schedule(name, config).await?;
        scheduler.register(built);
    }

    crate::metrics::register_metrics();
    SchedulerMetrics::schedules_registered(settings.schedules.len());

    info!(registered = settings.schedules.len(), "scheduler bootstrap complete");
    Ok(scheduler)
}
