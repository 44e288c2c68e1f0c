//! Cron expression evaluation for triggers (`spec.md` §4.6, §9).
//!
//! Uses the `cron` crate for expression parsing/iteration and `chrono-tz`
//! for IANA timezone lookups — neither appears in the teacher's dependency
//! stack, since it has no scheduling surface of its own; both are ordinary,
//! widely-used crates for this job rather than anything hand-rolled.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CronError {
    #[error("invalid cron expression {expression:?}: {message}")]
    #[diagnostic(code(durable_flow::cron::invalid_expression))]
    InvalidExpression { expression: String, message: String },

    #[error("unknown IANA timezone {0:?}")]
    #[diagnostic(code(durable_flow::cron::unknown_timezone))]
    UnknownTimezone(String),

    #[error("cron expression {0:?} has no upcoming firing")]
    #[diagnostic(code(durable_flow::cron::no_upcoming_firing))]
    NoUpcomingFiring(String),
}

/// Parses an IANA timezone name (`"UTC"`, `"America/New_York"`, ...).
pub fn parse_timezone(name: &str) -> Result<Tz, CronError> {
    Tz::from_str(name).map_err(|_| CronError::UnknownTimezone(name.to_string()))
}

/// Triggers speak the spec's five-field cron (`spec.md` §3, §4.6: minute,
/// hour, day-of-month, month, day-of-week — no seconds field), but the
/// `cron` crate only parses six-or-seven-field expressions with a leading
/// seconds field. This prepends `"0"` (fire on the zeroth second) so a
/// spec-conformant five-field expression parses; anything else is passed
/// through unchanged and left for `Schedule::from_str` to accept or reject.
fn to_schedule_expression(expression: &str) -> String {
    if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    }
}

/// Validates a cron expression without evaluating it, so trigger creation
/// can reject bad input up front.
pub fn validate_expression(expression: &str) -> Result<(), CronError> {
    Schedule::from_str(&to_schedule_expression(expression))
        .map(|_| ())
        .map_err(|err| CronError::InvalidExpression {
            expression: expression.to_string(),
            message: err.to_string(),
        })
}

/// The next firing of `expression` (evaluated in `timezone`) strictly after
/// `after`, converted back to UTC.
///
/// This is the "collapse missed firings" primitive from `spec.md` §4.6: a
/// trigger whose worker process was down for several scheduled firings is
/// never walked through each missed tick — the caller always asks for the
/// single next firing after "now" and fires that one once.
pub fn next_run_after(
    expression: &str,
    timezone: &Tz,
    after: DateTime<Utc>,
) -> Result<DateTime<Utc>, CronError> {
    let schedule =
        Schedule::from_str(&to_schedule_expression(expression)).map_err(|err| CronError::InvalidExpression {
            expression: expression.to_string(),
            message: err.to_string(),
        })?;
    let local_after = after.with_timezone(timezone);
    let next = schedule
        .after(&local_after)
        .next()
        .ok_or_else(|| CronError::NoUpcomingFiring(expression.to_string()))?;
    Ok(next.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_known_timezone() {
        assert!(parse_timezone("America/New_York").is_ok());
        assert!(parse_timezone("Not/AZone").is_err());
    }

    #[test]
    fn computes_next_minute_firing() {
        let tz = parse_timezone("UTC").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 30).unwrap();
        let next = next_run_after("* * * * *", &tz, after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 1, 12, 1, 0).unwrap());
    }

    #[test]
    fn collapses_multiple_missed_firings_into_one() {
        let tz = parse_timezone("UTC").unwrap();
        // Several minutes have passed with nothing watching; the next firing
        // after "now" is still just the next minute boundary, not a queue of
        // every minute that was missed.
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 12, 5, 0).unwrap();
        let next = next_run_after("* * * * *", &tz, after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 1, 12, 6, 0).unwrap());
    }

    #[test]
    fn accepts_the_spec_s_five_field_form() {
        let tz = parse_timezone("UTC").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 11, 30, 0).unwrap();
        let next = next_run_after("0 * * * *", &tz, after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap());
        assert!(validate_expression("0 9 * * *").is_ok());
    }

    #[test]
    fn rejects_invalid_expression() {
        assert!(validate_expression("not a cron").is_err());
    }
}
