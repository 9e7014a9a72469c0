//! Cron evaluator.
//!
//! Wraps the `cron` crate, which only iterates forward from a point in
//! time, to provide the three operations the scheduler and its tests need:
//! forward iteration, backward iteration, and range expansion. Instants
//! are evaluated in a fixed UTC offset and normalized back to UTC.

use crate::error::{SchedulerError, SchedulerResult};
use chrono::{DateTime, Duration, FixedOffset, Utc};
use cron::Schedule;
use std::str::FromStr;

/// Maximum backward lookback `previous_firings` will search before giving
/// up and returning fewer than the requested count. Generous enough for
/// any realistic cron expression (including yearly schedules) without
/// risking an unbounded loop.
const MAX_LOOKBACK: Duration = Duration::days(366 * 5);

/// Parse a 5-field (minute hour day-of-month month day-of-week) cron
/// expression. The `cron` crate expects a leading seconds field, which
/// this scheduler always pins to `0` since sub-minute firing resolution
/// is not part of the wire format.
pub fn parse(expr: &str) -> SchedulerResult<Schedule> {
    let with_seconds = format!("0 {}", expr.trim());
    Schedule::from_str(&with_seconds)
        .map_err(|e| SchedulerError::ConfigInvalid(format!("invalid cron expression {expr:?}: {e}")))
}

/// The `n` most recent firings at or before `from`, descending. Returns
/// fewer than `n` if the lookback bound is exhausted first.
pub fn previous_firings(
    schedule: &Schedule,
    offset: FixedOffset,
    from: DateTime<Utc>,
    n: usize,
) -> Vec<DateTime<Utc>> {
    if n == 0 {
        return Vec::new();
    }

    let mut window = Duration::hours(1);
    loop {
        let window_start = from - window;
        let firings = firings_within(schedule, offset, window_start, from + Duration::nanoseconds(1));
        if firings.len() >= n || window >= MAX_LOOKBACK {
            return firings.into_iter().rev().take(n).collect();
        }
        window = window * 2;
    }
}

/// The `n` soonest firings strictly after `from`, ascending.
pub fn next_firings(
    schedule: &Schedule,
    offset: FixedOffset,
    from: DateTime<Utc>,
    n: usize,
) -> Vec<DateTime<Utc>> {
    let from_local = from.with_timezone(&offset);
    schedule
        .after(&from_local)
        .take(n)
        .map(|dt| dt.with_timezone(&Utc))
        .collect()
}

/// All firings in the half-open window `[start, end)`, ascending.
pub fn firings_within(
    schedule: &Schedule,
    offset: FixedOffset,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    if start >= end {
        return Vec::new();
    }

    let just_before_start = (start - Duration::nanoseconds(1)).with_timezone(&offset);
    let end_local = end.with_timezone(&offset);

    schedule
        .after(&just_before_start)
        .take_while(|dt| *dt < end_local)
        .map(|dt| dt.with_timezone(&Utc))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn rejects_malformed_expression() {
        assert!(parse("not a cron").is_err());
    }

    #[test]
    fn firings_within_every_minute() {
        let schedule = parse("* * * * *").unwrap();
        let start = utc(2024, 1, 1, 0, 0, 0);
        let end = utc(2024, 1, 1, 0, 3, 0);
        let firings = firings_within(&schedule, FixedOffset::east_opt(0).unwrap(), start, end);
        assert_eq!(
            firings,
            vec![
                utc(2024, 1, 1, 0, 0, 0),
                utc(2024, 1, 1, 0, 1, 0),
                utc(2024, 1, 1, 0, 2, 0),
            ]
        );
    }

    #[test]
    fn firings_within_is_half_open() {
        let schedule = parse("* * * * *").unwrap();
        let start = utc(2024, 1, 1, 0, 1, 0);
        let end = utc(2024, 1, 1, 0, 2, 0);
        let firings = firings_within(&schedule, FixedOffset::east_opt(0).unwrap(), start, end);
        assert_eq!(firings, vec![utc(2024, 1, 1, 0, 1, 0)]);
    }

    #[test]
    fn next_firings_every_5_minutes() {
        let schedule = parse("*/5 * * * *").unwrap();
        let from = utc(2024, 1, 1, 0, 2, 0);
        let firings = next_firings(&schedule, FixedOffset::east_opt(0).unwrap(), from, 2);
        assert_eq!(
            firings,
            vec![utc(2024, 1, 1, 0, 5, 0), utc(2024, 1, 1, 0, 10, 0)]
        );
    }

    #[test]
    fn previous_firings_every_minute() {
        let schedule = parse("* * * * *").unwrap();
        let from = utc(2024, 1, 1, 0, 0, 30);
        let firings = previous_firings(&schedule, FixedOffset::east_opt(0).unwrap(), from, 1);
        assert_eq!(firings, vec![utc(2024, 1, 1, 0, 0, 0)]);
    }

    #[test]
    fn previous_firings_across_widening_window() {
        // Once a year: 00:00 on Jan 1st. `from` is nearly a year later, so
        // the backward search has to widen its window multiple times.
        let schedule = parse("0 0 1 1 *").unwrap();
        let from = utc(2024, 12, 31, 0, 0, 0);
        let firings = previous_firings(&schedule, FixedOffset::east_opt(0).unwrap(), from, 1);
        assert_eq!(firings, vec![utc(2024, 1, 1, 0, 0, 0)]);
    }

    #[test]
    fn timezone_offset_shifts_firing_into_utc() {
        // 09:00 local in +05:30 is 03:30 UTC.
        let schedule = parse("0 9 * * *").unwrap();
        let offset = FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap();
        let start = utc(2024, 1, 1, 0, 0, 0);
        let end = utc(2024, 1, 2, 0, 0, 0);
        let firings = firings_within(&schedule, offset, start, end);
        assert_eq!(firings, vec![utc(2024, 1, 1, 3, 30, 0)]);
    }

    #[test]
    fn firings_within_matches_previous_and_next_union() {
        // firings_within(c, off, a, b) equals the intersection with
        // [a, b) of previous/next firings computed around an interior point.
        let schedule = parse("*/15 * * * *").unwrap();
        let offset = FixedOffset::east_opt(0).unwrap();
        let a = utc(2024, 3, 1, 0, 0, 0);
        let b = utc(2024, 3, 1, 2, 0, 0);
        let mid = utc(2024, 3, 1, 1, 0, 0);

        let within = firings_within(&schedule, offset, a, b);

        let mut around: Vec<DateTime<Utc>> = previous_firings(&schedule, offset, mid, 10)
            .into_iter()
            .chain(next_firings(&schedule, offset, mid, 10))
            .filter(|t| *t >= a && *t < b)
            .collect();
        around.sort();
        around.dedup();

        assert_eq!(within, around);
    }
}
