//! Time and date parsing utilities.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

use crate::error::{Result, SummaryError};

/// Sentinel "last summary update" for issues never summarized: 1900-01-01 UTC.
#[must_use]
pub fn epoch_floor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1900, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Render a timestamp for storage: RFC3339, UTC, fixed microseconds, `Z`.
///
/// Fixed width keeps lexical order equal to chronological order in SQL.
#[must_use]
pub fn to_stored(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
///
/// # Errors
///
/// Returns a validation error naming `field` if the text is not RFC3339.
pub fn from_stored(s: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SummaryError::validation(field, format!("bad timestamp {s:?}: {e}")))
}

/// Parse a flexible "since" expression into a `DateTime<Utc>`.
///
/// Supports:
/// - RFC3339: `2025-01-15T12:00:00Z`, `2025-01-15T12:00:00+02:00`
/// - Tracker style: `2025-01-15 12:00` (UTC)
/// - Simple date: `2025-01-15` (UTC midnight)
/// - Relative duration into the past: `-30m`, `-2h`, `-1d`, `-1w` (sign optional)
/// - Keywords: `now`, `today`, `yesterday`
///
/// # Errors
///
/// Returns a validation error naming `field_name` for anything else.
pub fn parse_flexible_timestamp(s: &str, field_name: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN)));
    }

    if let Some(ago) = parse_duration(s.strip_prefix('-').unwrap_or(s)) {
        return Utc::now()
            .checked_sub_signed(ago)
            .ok_or_else(|| SummaryError::validation(field_name, "relative time is too far back"));
    }

    let now = Utc::now();
    let midnight = |dt: DateTime<Utc>| Utc.from_utc_datetime(&dt.date_naive().and_time(chrono::NaiveTime::MIN));
    match s.to_lowercase().as_str() {
        "now" => Ok(now),
        "today" => Ok(midnight(now)),
        "yesterday" => Ok(midnight(now - Duration::days(1))),
        _ => Err(SummaryError::validation(
            field_name,
            "invalid time format (try: -2h, -1d, yesterday, 2025-01-15 or 2025-01-15 12:00)",
        )),
    }
}

/// Parse `30m`, `2h`, `1d`, `1w` or a bare number of seconds.
///
/// Negative amounts and amounts too large for a `Duration` give `None`.
#[must_use]
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<i64>() {
        return if secs >= 0 { Duration::try_seconds(secs) } else { None };
    }
    let unit = s.chars().last()?;
    let amount = s[..s.len() - unit.len_utf8()].parse::<i64>().ok()?;
    if amount < 0 {
        return None;
    }
    match unit {
        's' => Duration::try_seconds(amount),
        'm' => Duration::try_minutes(amount),
        'h' => Duration::try_hours(amount),
        'd' => Duration::try_days(amount),
        'w' => Duration::try_weeks(amount),
        _ => None,
    }
}

/// `now` moved back by `age`, clamped to the earliest representable time.
#[must_use]
pub fn saturating_before(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(age).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Cutoff for an inactivity window of `days` days ending at `now`.
///
/// A window too long to represent starts at the earliest representable time.
#[must_use]
pub fn days_before(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    Duration::try_days(days).map_or(DateTime::<Utc>::MIN_UTC, |d| saturating_before(now, d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_flexible_rfc3339() {
        let result = parse_flexible_timestamp("2025-01-15T12:00:00+02:00", "since").unwrap();
        assert_eq!(result.hour(), 10);
    }

    #[test]
    fn test_parse_flexible_tracker_style() {
        let result = parse_flexible_timestamp("2025-01-15 08:30", "since").unwrap();
        assert_eq!((result.hour(), result.minute()), (8, 30));
    }

    #[test]
    fn test_parse_flexible_simple_date() {
        let result = parse_flexible_timestamp("2025-06-20", "since").unwrap();
        assert_eq!((result.year(), result.month(), result.day()), (2025, 6, 20));
        assert_eq!(result.hour(), 0);
    }

    #[test]
    fn test_parse_flexible_relative() {
        let result = parse_flexible_timestamp("-2h", "since").unwrap();
        assert!(result < Utc::now() - Duration::minutes(119));
        let result = parse_flexible_timestamp("1d", "since").unwrap();
        assert!(result < Utc::now() - Duration::hours(23));
    }

    #[test]
    fn test_parse_flexible_invalid() {
        let err = parse_flexible_timestamp("next tuesday", "since").unwrap_err();
        assert!(matches!(err, SummaryError::Validation { .. }));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("300"), Some(Duration::seconds(300)));
        assert_eq!(parse_duration("5m"), Some(Duration::minutes(5)));
        assert_eq!(parse_duration("2w"), Some(Duration::weeks(2)));
        assert_eq!(parse_duration("2x"), None);
        assert_eq!(parse_duration("-5"), None);
    }

    #[test]
    fn test_parse_duration_out_of_range() {
        assert_eq!(parse_duration("99999999999999w"), None);
        assert_eq!(parse_duration("9223372036854775807d"), None);
        assert_eq!(parse_duration("9223372036854775807"), None);
        assert_eq!(parse_duration("9223372036854775807m"), None);
    }

    #[test]
    fn test_parse_flexible_huge_relative_is_an_error() {
        let err = parse_flexible_timestamp("-99999999999999w", "since").unwrap_err();
        assert!(matches!(err, SummaryError::Validation { .. }));
        // Fits in a Duration but not in the calendar
        let err = parse_flexible_timestamp("-999999999d", "since").unwrap_err();
        assert!(matches!(err, SummaryError::Validation { .. }));
    }

    #[test]
    fn test_days_before_saturates() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(days_before(now, 1), now - Duration::days(1));
        assert_eq!(days_before(now, i64::MAX), DateTime::<Utc>::MIN_UTC);
        assert_eq!(days_before(now, 999_999_999), DateTime::<Utc>::MIN_UTC);
        let far = Duration::try_days(999_999_999).unwrap();
        assert_eq!(saturating_before(now, far), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_stored_round_trip_is_fixed_width() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let b = a + Duration::microseconds(1);
        assert_eq!(to_stored(a), "2024-01-01T00:00:00.000000Z");
        assert!(to_stored(a) < to_stored(b));
        assert_eq!(from_stored(&to_stored(b), "ts").unwrap(), b);
    }

    #[test]
    fn test_epoch_floor() {
        assert_eq!(epoch_floor().year(), 1900);
    }
}
