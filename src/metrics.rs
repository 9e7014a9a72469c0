//! Prometheus-style metrics for scheduler observability.

use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Metric names emitted by this crate.
pub mod names {
    pub const TICKS_TOTAL: &str = "sidecron_ticks_total";
    pub const FIRINGS_EVALUATED_TOTAL: &str = "sidecron_firings_evaluated_total";
    pub const JOBS_ENQUEUED_TOTAL: &str = "sidecron_jobs_enqueued_total";
    pub const LOCK_CONTENTION_TOTAL: &str = "sidecron_lock_contention_total";
    pub const STORAGE_ERRORS_TOTAL: &str = "sidecron_storage_errors_total";
    pub const SCHEDULES_REGISTERED: &str = "sidecron_schedules_registered";
}

/// Register metric descriptions with the global recorder. Call once at
/// process startup, after a recorder (e.g. `metrics-exporter-prometheus`)
/// has been installed.
pub fn register_metrics() {
    describe_counter!(names::TICKS_TOTAL, "Total number of scheduler ticks run");
    describe_counter!(
        names::FIRINGS_EVALUATED_TOTAL,
        "Total number of cron firings evaluated across all ticks"
    );
    describe_counter!(names::JOBS_ENQUEUED_TOTAL, "Total number of jobs successfully enqueued");
    describe_counter!(
        names::LOCK_CONTENTION_TOTAL,
        "Total number of firings skipped because another replica already enqueued them"
    );
    describe_counter!(names::STORAGE_ERRORS_TOTAL, "Total number of Redis storage errors encountered");
    describe_gauge!(names::SCHEDULES_REGISTERED, "Current number of registered schedules");
}

/// Scheduler metrics recorder.
#[derive(Clone)]
pub struct SchedulerMetrics;

impl SchedulerMetrics {
    /// Record a completed tick across every registered schedule.
    pub fn tick() {
        counter!(names::TICKS_TOTAL).increment(1);
    }

    /// Record how many firings a tick evaluated, across all schedules.
    pub fn firings_evaluated(count: u64) {
        if count > 0 {
            counter!(names::FIRINGS_EVALUATED_TOTAL).increment(count);
        }
    }

    /// Record a job successfully enqueued onto `queue`.
    pub fn job_enqueued(queue: &str) {
        counter!(names::JOBS_ENQUEUED_TOTAL, "queue" => queue.to_string()).increment(1);
    }

    /// Record a firing that another replica had already locked.
    pub fn lock_contention() {
        counter!(names::LOCK_CONTENTION_TOTAL).increment(1);
    }

    /// Record a Redis storage error encountered during a tick.
    pub fn storage_error() {
        counter!(names::STORAGE_ERRORS_TOTAL).increment(1);
    }

    /// Update the count of currently registered schedules.
    pub fn schedules_registered(count: usize) {
        gauge!(names::SCHEDULES_REGISTERED).set(count as f64);
    }
}
