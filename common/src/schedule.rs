// Schedule parsing and calculation module
//
// Due-time parsing, next-due arithmetic for every cadence, and the cron /
// timezone helpers the digest jobs are built on.

use crate::errors::ScheduleError;
use crate::models::{Cadence, DueWindow};
use chrono::{
    DateTime, Duration, FixedOffset, Months, NaiveTime, SecondsFormat, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use std::str::FromStr;

/// ScheduleTrigger defines how a cadence advances a due time
pub trait ScheduleTrigger {
    /// Calculate the due time one interval after `base`.
    ///
    /// Returns `None` when the cadence has no next occurrence.
    fn next_due(&self, base: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>>;

    /// Maximum number of firings, `None` if unbounded
    fn max_runs(&self) -> Option<u32>;
}

impl ScheduleTrigger for Cadence {
    fn next_due(&self, base: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
        match self {
            Cadence::Never => None,
            Cadence::Daily => base.checked_add_signed(Duration::days(1)),
            Cadence::Weekly => base.checked_add_signed(Duration::days(7)),
            Cadence::BiWeekly => base.checked_add_signed(Duration::days(14)),
            Cadence::Monthly => base.checked_add_months(Months::new(1)),
            Cadence::Yearly => base.checked_add_months(Months::new(12)),
        }
    }

    fn max_runs(&self) -> Option<u32> {
        match self {
            Cadence::Never => Some(1),
            _ => None,
        }
    }
}

/// Parse an RFC 3339 due time, keeping its offset
pub fn parse_due_time(task_id: &str, value: &str) -> Result<DateTime<FixedOffset>, ScheduleError> {
    DateTime::parse_from_rfc3339(value)
        .map_err(|e| ScheduleError::invalid(task_id, format!("cannot parse '{}': {}", value, e)))
}

/// Render a due time the way task rows store it
pub fn format_due_time(value: DateTime<FixedOffset>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Fractional minutes from `now` until `due`; negative once due has passed
pub fn minutes_until(due: DateTime<FixedOffset>, now: DateTime<Utc>) -> f64 {
    (due.with_timezone(&Utc) - now).num_milliseconds() as f64 / 60_000.0
}

/// Parse and validate a cron expression (seconds precision)
pub fn parse_cron_expression(expression: &str) -> Result<CronSchedule, ScheduleError> {
    CronSchedule::from_str(expression).map_err(|e| ScheduleError::InvalidCronExpression {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

/// Build the cron expression for a once-a-day job at `HH:MM`
pub fn daily_cron_expression(time_of_day: &str) -> Result<String, ScheduleError> {
    let time = NaiveTime::parse_from_str(time_of_day, "%H:%M")
        .map_err(|_| ScheduleError::InvalidTimeOfDay(time_of_day.to_string()))?;
    Ok(format!("0 {} {} * * * *", time.minute(), time.hour()))
}

/// Next firing of a cron schedule strictly after `after`, evaluated in `timezone`
pub fn next_cron_fire(
    schedule: &CronSchedule,
    timezone: Tz,
    after: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    schedule
        .after(&after.with_timezone(&timezone))
        .next()
        .map(|next| next.with_timezone(&Utc))
}

/// Parse an IANA timezone name
pub fn parse_timezone(name: &str) -> Result<Tz, ScheduleError> {
    Tz::from_str(name).map_err(|_| ScheduleError::InvalidTimezone(name.to_string()))
}

/// Default timezone for digest schedules
pub fn default_timezone() -> Tz {
    chrono_tz::Africa::Lagos
}

/// Resolve a due window into `[from, until)` bounds
pub fn due_window_bounds(
    window: DueWindow,
    now: DateTime<Utc>,
    timezone: Tz,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let until = match window {
        DueWindow::Today => now
            .with_timezone(&timezone)
            .date_naive()
            .succ_opt()
            .and_then(|day| day.and_hms_opt(0, 0, 0))
            .and_then(|midnight| timezone.from_local_datetime(&midnight).earliest())
            .map(|midnight| midnight.with_timezone(&Utc))
            .unwrap_or_else(|| now + Duration::days(1)),
        DueWindow::NextHours(hours) => now + Duration::hours(i64::from(hours)),
    };
    (now, until)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(value: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(value).unwrap()
    }

    #[test]
    fn test_parse_valid_due_time() {
        let due = parse_due_time("t1", "2024-01-01T09:30:00+01:00").unwrap();
        assert_eq!(due.offset().local_minus_utc(), 3600);
    }

    #[test]
    fn test_parse_invalid_due_time() {
        let err = parse_due_time("t1", "tomorrow").unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidSchedule { ref task_id, .. } if task_id == "t1"));
    }

    #[test]
    fn test_format_due_time_uses_z_for_utc() {
        assert_eq!(
            format_due_time(at("2024-01-08T00:00:00+00:00")),
            "2024-01-08T00:00:00Z"
        );
        assert_eq!(
            format_due_time(at("2024-01-08T00:00:00+01:00")),
            "2024-01-08T00:00:00+01:00"
        );
    }

    #[test]
    fn test_next_due_offsets() {
        let base = at("2024-01-01T00:00:00Z");
        assert_eq!(Cadence::Never.next_due(base), None);
        assert_eq!(Cadence::Daily.next_due(base), Some(at("2024-01-02T00:00:00Z")));
        assert_eq!(Cadence::Weekly.next_due(base), Some(at("2024-01-08T00:00:00Z")));
        assert_eq!(Cadence::BiWeekly.next_due(base), Some(at("2024-01-15T00:00:00Z")));
        assert_eq!(Cadence::Monthly.next_due(base), Some(at("2024-02-01T00:00:00Z")));
        assert_eq!(Cadence::Yearly.next_due(base), Some(at("2025-01-01T00:00:00Z")));
    }

    #[test]
    fn test_monthly_clamps_to_month_end() {
        let base = at("2024-01-31T10:00:00Z");
        assert_eq!(Cadence::Monthly.next_due(base), Some(at("2024-02-29T10:00:00Z")));
    }

    #[test]
    fn test_yearly_from_leap_day() {
        let base = at("2024-02-29T10:00:00Z");
        assert_eq!(Cadence::Yearly.next_due(base), Some(at("2025-02-28T10:00:00Z")));
    }

    #[test]
    fn test_only_never_has_a_run_limit() {
        assert_eq!(Cadence::Never.max_runs(), Some(1));
        assert_eq!(Cadence::Weekly.max_runs(), None);
        assert_eq!(Cadence::Yearly.max_runs(), None);
    }

    #[test]
    fn test_minutes_until() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(minutes_until(at("2024-01-01T12:04:00Z"), now), 4.0);
        assert_eq!(minutes_until(at("2024-01-01T11:59:00Z"), now), -1.0);
        assert_eq!(minutes_until(at("2024-01-01T13:20:00+01:00"), now), 20.0);
    }

    #[test]
    fn test_daily_cron_expression() {
        assert_eq!(daily_cron_expression("00:00").unwrap(), "0 0 0 * * * *");
        assert_eq!(daily_cron_expression("07:45").unwrap(), "0 45 7 * * * *");
        assert!(daily_cron_expression("25:00").is_err());
        assert!(daily_cron_expression("noon").is_err());
    }

    #[test]
    fn test_parse_invalid_cron_expression() {
        assert!(parse_cron_expression("invalid").is_err());
        assert!(parse_cron_expression("0 0 0 * * * *").is_ok());
    }

    #[test]
    fn test_next_cron_fire_in_timezone() {
        let schedule = parse_cron_expression("0 0 0 * * * *").unwrap();
        let tz = parse_timezone("Africa/Lagos").unwrap();
        // 22:30 UTC is 23:30 in Lagos; local midnight is 23:00 UTC
        let after = Utc.with_ymd_and_hms(2024, 3, 10, 22, 30, 0).unwrap();
        let next = next_cron_fire(&schedule, tz, after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 10, 23, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_timezone() {
        assert!(parse_timezone("Europe/London").is_ok());
        assert!(matches!(
            parse_timezone("Mars/Olympus"),
            Err(ScheduleError::InvalidTimezone(_))
        ));
    }

    #[test]
    fn test_due_window_today_ends_at_local_midnight() {
        let tz = parse_timezone("UTC").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 18, 0, 0).unwrap();
        let (from, until) = due_window_bounds(DueWindow::Today, now, tz);
        assert_eq!(from, now);
        assert_eq!(until, Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_due_window_next_hours() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 18, 0, 0).unwrap();
        let (_, until) = due_window_bounds(DueWindow::NextHours(6), now, default_timezone());
        assert_eq!(until, Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap());
    }
}
