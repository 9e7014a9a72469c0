//! Schedule model.
//!
//! A `Schedule` pairs a parsed cron expression with the job template it
//! fires and the per-schedule options that govern expansion.

use crate::config::ScheduleConfig;
use crate::cron_eval;
use crate::error::{SchedulerError, SchedulerResult};
use crate::job::{with_scheduled_at_metadata, DeterministicJob, JobTemplate};
use chrono::{DateTime, FixedOffset, Utc};
use cron::Schedule as CronSchedule;
use std::time::Duration;

/// Per-schedule behavior flags, layered on top of the server-wide defaults.
#[derive(Debug, Clone)]
pub struct ScheduleOptions {
    /// Disabled schedules are skipped entirely during a tick, including
    /// their `record_times` bookkeeping.
    pub enabled: bool,

    /// Append `{"scheduled_at": <iso8601>}` to the job args for each firing.
    pub include_metadata: bool,

    /// Timezone the cron expression is evaluated in.
    pub tz_offset: FixedOffset,

    /// Per-schedule override of the server-wide miss window.
    pub miss_window: Option<Duration>,
}

/// A schedule entry: name, parsed cron expression, job template, options.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub name: String,
    pub description: String,
    pub cron_expr: String,
    pub cron_schedule: CronSchedule,
    pub job_template: JobTemplate,
    pub options: ScheduleOptions,
}

/// A job ready to be enqueued, paired with the instant it fired at.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub job: DeterministicJob,
    pub firing_time: DateTime<Utc>,
}

impl Schedule {
    /// Build a schedule from its configured form, parsing the cron
    /// expression and timezone offset eagerly so bootstrap fails fast on
    /// malformed input (`ConfigInvalid`).
    pub fn from_config(name: &str, config: &ScheduleConfig, default_tz_offset: FixedOffset) -> SchedulerResult<Self> {
        let cron_schedule = cron_eval::parse(&config.cron)?;

        let tz_offset = match &config.timezone {
            Some(tz) => parse_fixed_offset(tz)?,
            None => default_tz_offset,
        };

        Ok(Self {
            name: name.to_string(),
            description: config.description.clone(),
            cron_expr: config.cron.clone(),
            cron_schedule,
            job_template: JobTemplate {
                class: config.class.clone(),
                queue: config.queue.clone(),
                args: config.args.clone(),
            },
            options: ScheduleOptions {
                enabled: config.enabled,
                include_metadata: config.include_metadata,
                tz_offset,
                miss_window: config.miss_window_secs.map(Duration::from_secs),
            },
        })
    }

    /// Every firing of this schedule within `[start, end)`, each paired
    /// with a ready-to-lock `DeterministicJob`.
    pub fn expand(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<ScheduledJob> {
        cron_eval::firings_within(&self.cron_schedule, self.options.tz_offset, start, end)
            .into_iter()
            .map(|firing_time| {
                let mut args = self.job_template.args.clone();
                if self.options.include_metadata {
                    args = with_scheduled_at_metadata(args, &firing_time.to_rfc3339());
                }
                ScheduledJob {
                    job: DeterministicJob {
                        class: self.job_template.class.clone(),
                        queue: self.job_template.queue_name().to_string(),
                        args,
                    },
                    firing_time,
                }
            })
            .collect()
    }
}

/// Parse a `"+05:30"`/`"-08:00"`/`"Z"`-style fixed offset string. Named IANA
/// zones (`"America/New_York"`) are intentionally out of scope.
pub(crate) fn parse_fixed_offset(raw: &str) -> SchedulerResult<FixedOffset> {
    if raw.eq_ignore_ascii_case("z") || raw == "+00:00" || raw == "UTC" {
        return Ok(FixedOffset::east_opt(0).unwrap());
    }

    let (sign, rest) = match raw.as_bytes().first() {
        Some(b'+') => (1, &raw[1..]),
        Some(b'-') => (-1, &raw[1..]),
        _ => return Err(SchedulerError::ConfigInvalid(format!("invalid timezone offset {raw:?}"))),
    };

    let mut parts = rest.splitn(2, ':');
    let hours: i32 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| SchedulerError::ConfigInvalid(format!("invalid timezone offset {raw:?}")))?;
    let minutes: i32 = parts
        .next()
        .unwrap_or("0")
        .parse()
        .map_err(|_| SchedulerError::ConfigInvalid(format!("invalid timezone offset {raw:?}")))?;

    let seconds = sign * (hours * 3600 + minutes * 60);
    FixedOffset::east_opt(seconds).ok_or_else(|| SchedulerError::ConfigInvalid(format!("timezone offset out of range: {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn base_config() -> ScheduleConfig {
        ScheduleConfig {
            description: "sends a heartbeat".to_string(),
            cron: "*/5 * * * *".to_string(),
            class: "HeartbeatWorker".to_string(),
            queue: None,
            args: vec![json!("ping")],
            include_metadata: false,
            enabled: true,
            timezone: None,
            miss_window_secs: None,
        }
    }

    #[test]
    fn builds_from_config_with_default_timezone() {
        let config = base_config();
        let schedule = Schedule::from_config("heartbeat", &config, FixedOffset::east_opt(0).unwrap()).unwrap();
        assert_eq!(schedule.name, "heartbeat");
        assert!(schedule.options.enabled);
        assert_eq!(schedule.options.tz_offset, FixedOffset::east_opt(0).unwrap());
    }

    #[test]
    fn rejects_malformed_cron() {
        let mut config = base_config();
        config.cron = "garbage".to_string();
        assert!(Schedule::from_config("heartbeat", &config, FixedOffset::east_opt(0).unwrap()).is_err());
    }

    #[test]
    fn rejects_malformed_timezone() {
        let mut config = base_config();
        config.timezone = Some("not-an-offset".to_string());
        assert!(Schedule::from_config("heartbeat", &config, FixedOffset::east_opt(0).unwrap()).is_err());
    }

    #[test]
    fn parses_explicit_offset() {
        let offset = parse_fixed_offset("+05:30").unwrap();
        assert_eq!(offset.local_minus_utc(), 5 * 3600 + 30 * 60);
        let offset = parse_fixed_offset("-08:00").unwrap();
        assert_eq!(offset.local_minus_utc(), -8 * 3600);
    }

    #[test]
    fn expand_produces_deterministic_jobs_for_each_firing() {
        let config = base_config();
        let schedule = Schedule::from_config("heartbeat", &config, FixedOffset::east_opt(0).unwrap()).unwrap();
        let start = utc(2024, 1, 1, 0, 0, 0);
        let end = utc(2024, 1, 1, 0, 11, 0);
        let jobs = schedule.expand(start, end);
        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs[0].firing_time, utc(2024, 1, 1, 0, 0, 0));
        assert_eq!(jobs[0].job.class, "HeartbeatWorker");
        assert_eq!(jobs[0].job.queue, "default");
        assert_eq!(jobs[0].job.args, vec![json!("ping")]);
    }

    #[test]
    fn expand_appends_metadata_when_enabled() {
        let mut config = base_config();
        config.include_metadata = true;
        let schedule = Schedule::from_config("heartbeat", &config, FixedOffset::east_opt(0).unwrap()).unwrap();
        let start = utc(2024, 1, 1, 0, 0, 0);
        let end = utc(2024, 1, 1, 0, 1, 0);
        let jobs = schedule.expand(start, end);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job.args.len(), 2);
        assert!(jobs[0].job.args[1].get("scheduled_at").is_some());
    }

    #[test]
    fn expand_is_empty_for_disabled_style_zero_width_window() {
        let config = base_config();
        let schedule = Schedule::from_config("heartbeat", &config, FixedOffset::east_opt(0).unwrap()).unwrap();
        let at = utc(2024, 1, 1, 0, 0, 0);
        assert!(schedule.expand(at, at).is_empty());
    }
}
