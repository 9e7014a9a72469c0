//! The scheduler engine.
//!
//! Every replica runs the full tick loop independently — there is no
//! leader election. Safety against duplicate enqueues comes entirely from
//! the per-firing dedup lock in [`crate::storage::Storage::enqueue`].

use crate::clock::Clock;
use crate::cron_eval;
use crate::metrics::SchedulerMetrics;
use crate::schedule::Schedule;
use crate::storage::Storage;
use chrono::Duration as ChronoDuration;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, info, warn, Instrument};

/// Distributed cron scheduler. Safe to run many instances of concurrently
/// against the same Redis and the same configured schedules.
pub struct Scheduler {
    clock: Arc<dyn Clock>,
    storage: Arc<Storage>,
    schedules: Arc<parking_lot::RwLock<HashMap<String, Schedule>>>,
    default_miss_window: Duration,
    tick_interval: Duration,
    shutdown_tx: broadcast::Sender<()>,
    running: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>, storage: Arc<Storage>, default_miss_window: Duration, tick_interval: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            clock,
            storage,
            schedules: Arc::new(parking_lot::RwLock::new(HashMap::new())),
            default_miss_window,
            tick_interval,
            shutdown_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register a schedule, replacing any existing entry of the same name.
    pub fn register(&self, schedule: Schedule) {
        let name = schedule.name.clone();
        self.schedules.write().insert(name.clone(), schedule);
        debug!(schedule = %name, "registered schedule");
    }

    pub fn unregister(&self, name: &str) {
        self.schedules.write().remove(name);
    }

    pub fn schedule_names(&self) -> Vec<String> {
        self.schedules.read().keys().cloned().collect()
    }

    /// Run a single tick at `now`, expanding and enqueueing every due
    /// firing across every registered schedule. Per-schedule
    /// failures are logged and skipped rather than aborting the tick
    /// (a storage hiccup on one schedule must not starve the rest).
    #[tracing::instrument(skip(self), fields(now = %now, schedules = tracing::field::Empty))]
    pub async fn tick(&self, now: chrono::DateTime<chrono::Utc>) {
        let names: Vec<String> = self.schedules.read().keys().cloned().collect();
        tracing::Span::current().record("schedules", names.len());
        SchedulerMetrics::tick();

        for name in names {
            let schedule = {
                let schedules = self.schedules.read();
                match schedules.get(&name) {
                    Some(s) => s.clone(),
                    None => continue,
                }
            };

            let span = tracing::info_span!("tick_schedule", schedule = %name, firings = tracing::field::Empty, outcome = tracing::field::Empty);
            self.tick_schedule(&name, &schedule, now).instrument(span).await;
        }
    }

    /// Evaluate and enqueue one schedule's due firings for a single tick,
    /// recording bookkeeping for the schedule regardless of outcome.
    async fn tick_schedule(&self, name: &str, schedule: &Schedule, now: chrono::DateTime<chrono::Utc>) {
        let span = tracing::Span::current();

        match self.storage.is_enabled(name).await {
            Ok(false) => {
                span.record("outcome", "disabled");
                debug!(schedule = %name, "schedule disabled, skipping tick");
                return;
            }
            Err(e) => {
                span.record("outcome", "enable_check_failed");
                warn!(schedule = %name, error = %e, "failed to read enable state, skipping tick");
                SchedulerMetrics::storage_error();
                return;
            }
            Ok(true) => {}
        }

        if let Err(e) = self.storage.record_times(name, now).await {
            warn!(schedule = %name, error = %e, "failed to record tick bookkeeping");
            SchedulerMetrics::storage_error();
        }

        let miss_window = schedule.options.miss_window.unwrap_or(self.default_miss_window);
        let start = now - ChronoDuration::from_std(miss_window).unwrap_or_default();

        let jobs = schedule.expand(start, now);
        span.record("firings", jobs.len());
        SchedulerMetrics::firings_evaluated(jobs.len() as u64);

        for scheduled_job in &jobs {
            match self.storage.enqueue(scheduled_job, now).await {
                Ok(true) => {
                    SchedulerMetrics::job_enqueued(schedule.job_template.queue_name());
                    debug!(
                        schedule = %name,
                        firing = %scheduled_job.firing_time,
                        "enqueued job"
                    );
                }
                Ok(false) => {
                    SchedulerMetrics::lock_contention();
                    debug!(
                        schedule = %name,
                        firing = %scheduled_job.firing_time,
                        "firing already enqueued by another replica"
                    );
                }
                Err(e) => {
                    error!(schedule = %name, firing = %scheduled_job.firing_time, error = %e, "failed to enqueue firing");
                    SchedulerMetrics::storage_error();
                }
            }
        }

        let last = cron_eval::previous_firings(&schedule.cron_schedule, schedule.options.tz_offset, now, 1)
            .into_iter()
            .next();
        let next = cron_eval::next_firings(&schedule.cron_schedule, schedule.options.tz_offset, now, 1)
            .into_iter()
            .next();
        if let Some(last_fired) = last {
            if let Err(e) = self.storage.record_firing_times(name, last_fired, next).await {
                warn!(schedule = %name, error = %e, "failed to record firing times");
            }
        }

        span.record("outcome", "ticked");
    }

    /// Run the tick loop until [`Self::stop`] is called.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("scheduler already running, ignoring duplicate start");
            return;
        }

        info!(tick_interval = ?self.tick_interval, "starting scheduler tick loop");
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut ticker = interval(self.tick_interval);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("scheduler received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick(self.clock.now()).await;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("scheduler stopped");
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
