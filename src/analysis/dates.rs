//! Lenient calendar-date handling.
//!
//! Dates arrive as free text from the hosted store. Anything that does not
//! parse is treated as absent rather than as an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a stored date, accepting plain dates and timestamps.
///
/// Timestamps keep the calendar date as written; offsets are not applied.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(timestamp.date_naive());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(|timestamp| timestamp.date())
}

/// Whole days from `today` until `end` (midnight to midnight).
pub fn days_until(today: NaiveDate, end: NaiveDate) -> i64 {
    end.signed_duration_since(today).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_plain_date() {
        assert_eq!(parse_date("2025-03-01"), Some(ymd(2025, 3, 1)));
        assert_eq!(parse_date("  2025-03-01 "), Some(ymd(2025, 3, 1)));
    }

    #[test]
    fn test_parse_timestamps() {
        assert_eq!(parse_date("2025-03-01T23:30:00+07:00"), Some(ymd(2025, 3, 1)));
        assert_eq!(parse_date("2025-03-01T00:00:00Z"), Some(ymd(2025, 3, 1)));
        assert_eq!(parse_date("2025-03-01T08:15:00"), Some(ymd(2025, 3, 1)));
        assert_eq!(parse_date("2025-03-01 08:15:00.250"), Some(ymd(2025, 3, 1)));
    }

    #[test]
    fn test_unparseable_dates_are_absent() {
        assert_eq!(parse_date("not-a-date"), None);
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("2025-02-30"), None);
        assert_eq!(parse_date("31/01/2025"), None);
    }

    #[test]
    fn test_days_until() {
        let today = ymd(2025, 1, 1);
        assert_eq!(days_until(today, ymd(2025, 1, 11)), 10);
        assert_eq!(days_until(today, today), 0);
        assert_eq!(days_until(today, ymd(2024, 12, 30)), -2);
        assert_eq!(days_until(today, ymd(2026, 1, 1)), 365);
    }
}
