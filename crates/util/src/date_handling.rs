//! # Date Handling Utilities
//!
//! Execution dates arrive from schedulers and humans in a handful of shapes.
//! The pipeline only ever works with a calendar date, so everything here
//! collapses input to a [`NaiveDate`].

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use thiserror::Error;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];
const NAIVE_DATE_TIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

/// Error returned when an execution date cannot be interpreted.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid execution date '{input}'; expected YYYY-MM-DD or an RFC 3339 timestamp")]
pub struct DateParseError {
    input: String,
}

/// Parses an execution date, dropping any time component.
///
/// Accepted shapes, in order:
/// - `YYYY-MM-DD` and `YYYY/MM/DD`
/// - RFC 3339 timestamps (`2024-01-15T06:00:00Z`); the date is taken as written,
///   without converting between offsets
/// - naive timestamps (`2024-01-15T06:00:00`, `2024-01-15 06:00:00`)
///
/// # Example
/// ```rust
/// use chrono::NaiveDate;
/// use salesflow_util::date_handling::parse_execution_date;
///
/// let expected = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
/// assert_eq!(parse_execution_date("2024-01-15").unwrap(), expected);
/// assert_eq!(parse_execution_date("2024-01-15T23:30:00-05:00").unwrap(), expected);
/// assert!(parse_execution_date("15/01/2024").is_err());
/// ```
pub fn parse_execution_date(input: &str) -> Result<NaiveDate, DateParseError> {
    let trimmed = input.trim();

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date);
        }
    }

    if let Ok(date_time) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(date_time.date_naive());
    }

    for format in NAIVE_DATE_TIME_FORMATS {
        if let Ok(date_time) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(date_time.date());
        }
    }

    Err(DateParseError { input: input.to_string() })
}

/// Seconds between two instants, clamped at zero.
pub fn elapsed_seconds(start: DateTime<chrono::Utc>, end: DateTime<chrono::Utc>) -> f64 {
    let millis = (end - start).num_milliseconds().max(0);
    millis as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn accepts_slash_separated_dates() {
        assert_eq!(
            parse_execution_date("2024/02/29").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
    }

    #[test]
    fn naive_timestamps_keep_their_date() {
        assert_eq!(
            parse_execution_date("2024-01-15 06:00:00").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
    }

    #[test]
    fn rejects_impossible_dates() {
        let error = parse_execution_date("2023-02-30").unwrap_err();
        assert!(error.to_string().contains("2023-02-30"));
    }

    #[test]
    fn elapsed_seconds_never_negative() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 6, 0, 0).unwrap();
        assert_eq!(elapsed_seconds(start, start + Duration::milliseconds(2500)), 2.5);
        assert_eq!(elapsed_seconds(start, start - Duration::seconds(10)), 0.0);
    }
}
