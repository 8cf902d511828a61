//! Cron expression parsing and cadence validation (§4.8).
//!
//! Schedules are authored as standard 5-field unix cron (minute hour
//! day-of-month month day-of-week); the `cron` crate parses 6/7-field
//! expressions with a leading seconds field, so a `"0 "` seconds field is
//! prepended before parsing.

use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;
use std::str::FromStr;

/// Minimum allowed cadence: successive firings must be at least an hour apart.
pub const MIN_CADENCE: chrono::Duration = chrono::Duration::hours(1);

#[derive(Debug, thiserror::Error)]
pub enum CronError {
    #[error("invalid cron expression: {0}")]
    Parse(String),
    #[error("cadence too frequent: firings must be at least 1 hour apart")]
    TooFrequent,
    #[error("cron expression never fires in the future")]
    NeverFires,
}

fn parse(expression: &str) -> Result<CronSchedule, CronError> {
    let with_seconds = format!("0 {expression}");
    CronSchedule::from_str(&with_seconds).map_err(|e| CronError::Parse(e.to_string()))
}

/// Validate a 5-field cron expression and return its first two future firings.
/// Rejects expressions whose first two upcoming firings are less than an hour
/// apart (§4.8 invariant).
pub fn validate(expression: &str, now: DateTime<Utc>) -> Result<(), CronError> {
    let schedule = parse(expression)?;
    let mut upcoming = schedule.after(&now);
    let first = upcoming.next().ok_or(CronError::NeverFires)?;
    let second = upcoming.next().ok_or(CronError::NeverFires)?;
    if second - first < MIN_CADENCE {
        return Err(CronError::TooFrequent);
    }
    Ok(())
}

/// Compute the next firing strictly after `after`.
pub fn next_run_after(expression: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, CronError> {
    let schedule = parse(expression)?;
    schedule.after(&after).next().ok_or(CronError::NeverFires)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn hourly_cron_is_valid() {
        assert!(validate("0 * * * *", now()).is_ok());
    }

    #[test]
    fn every_minute_is_rejected_as_too_frequent() {
        let err = validate("* * * * *", now()).unwrap_err();
        assert!(matches!(err, CronError::TooFrequent));
    }

    #[test]
    fn malformed_expression_is_rejected() {
        assert!(validate("not a cron expression", now()).is_err());
    }

    #[test]
    fn next_run_after_advances_strictly_forward() {
        let next = next_run_after("0 3 * * *", now()).unwrap();
        assert!(next > now());
    }
}
