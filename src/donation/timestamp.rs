//! Parsing of donation creation timestamps and the freshness window.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, Utc};

/// Donations older than this are never celebrated.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Timestamps carrying an offset. `%.f` makes fractional seconds optional.
const AWARE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// A parsed creation time. Naive values are compared against local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatedAt {
    Aware(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

/// Parse a provider timestamp. A trailing `Z` is read as UTC.
pub fn parse_created_at(raw: &str) -> Option<CreatedAt> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let normalized = match trimmed.strip_suffix('Z').or_else(|| trimmed.strip_suffix('z')) {
        Some(rest) => format!("{rest}+00:00"),
        None => trimmed.to_string(),
    };

    for fmt in AWARE_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, fmt) {
            return Some(CreatedAt::Aware(dt));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&normalized, fmt) {
            return Some(CreatedAt::Naive(dt));
        }
    }
    NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(CreatedAt::Naive)
}

/// True when `created` lies no more than `window` before `now`.
///
/// Missing timestamps are never fresh. Timestamps in the future are.
pub fn is_fresh(created: Option<&CreatedAt>, window: Duration, now: DateTime<Utc>) -> bool {
    let Some(created) = created else {
        return false;
    };
    let Ok(window) = chrono::Duration::from_std(window) else {
        return false;
    };

    let age = match created {
        CreatedAt::Aware(dt) => now.signed_duration_since(dt.with_timezone(&Utc)),
        CreatedAt::Naive(naive) => now
            .with_timezone(&Local)
            .naive_local()
            .signed_duration_since(*naive),
    };
    age <= window
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_parses_zulu_suffix() {
        let parsed = parse_created_at("2024-03-01T12:00:00Z").unwrap();
        match parsed {
            CreatedAt::Aware(dt) => assert_eq!(dt.with_timezone(&Utc), utc(2024, 3, 1, 12, 0, 0)),
            other => panic!("expected aware timestamp, got {other:?}"),
        }
    }

    #[test]
    fn test_parses_fractional_seconds_and_offsets() {
        assert!(matches!(
            parse_created_at("2024-03-01T12:00:00.123456+03:00"),
            Some(CreatedAt::Aware(_))
        ));
        assert!(matches!(
            parse_created_at("2024-03-01T12:00:00+0300"),
            Some(CreatedAt::Aware(_))
        ));
        assert!(matches!(
            parse_created_at("2024-03-01 12:00:00.5Z"),
            Some(CreatedAt::Aware(_))
        ));
    }

    #[test]
    fn test_parses_naive_patterns() {
        for raw in [
            "2019-09-29 09:00:00",
            "2019-09-29 09:00:00.250",
            "2019-09-29T09:00:00",
            "2019-09-29T09:00:00.250",
        ] {
            assert!(
                matches!(parse_created_at(raw), Some(CreatedAt::Naive(_))),
                "failed to parse {raw}"
            );
        }
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(parse_created_at(""), None);
        assert_eq!(parse_created_at("yesterday"), None);
        assert_eq!(parse_created_at("29/09/2019 09:00"), None);
    }

    #[test]
    fn test_aware_freshness_window() {
        let now = utc(2024, 3, 1, 12, 0, 0);
        let four_min = parse_created_at("2024-03-01T11:56:00Z");
        let exactly_five = parse_created_at("2024-03-01T11:55:00Z");
        let eleven_min = parse_created_at("2024-03-01T11:49:00Z");

        assert!(is_fresh(four_min.as_ref(), FRESHNESS_WINDOW, now));
        assert!(is_fresh(exactly_five.as_ref(), FRESHNESS_WINDOW, now));
        assert!(!is_fresh(eleven_min.as_ref(), FRESHNESS_WINDOW, now));
    }

    #[test]
    fn test_offset_is_respected() {
        // 14:58 at +03:00 is 11:58 UTC.
        let now = utc(2024, 3, 1, 12, 0, 0);
        let created = parse_created_at("2024-03-01T14:58:00+03:00");
        assert!(is_fresh(created.as_ref(), FRESHNESS_WINDOW, now));
    }

    #[test]
    fn test_naive_compares_against_local_time() {
        let now = Utc::now();
        let local = now.with_timezone(&Local).naive_local();
        let recent = CreatedAt::Naive(local - chrono::Duration::minutes(1));
        let old = CreatedAt::Naive(local - chrono::Duration::minutes(11));

        assert!(is_fresh(Some(&recent), FRESHNESS_WINDOW, now));
        assert!(!is_fresh(Some(&old), FRESHNESS_WINDOW, now));
    }

    #[test]
    fn test_missing_timestamp_is_stale() {
        assert!(!is_fresh(None, FRESHNESS_WINDOW, Utc::now()));
    }

    #[test]
    fn test_future_timestamp_is_fresh() {
        let now = utc(2024, 3, 1, 12, 0, 0);
        let created = parse_created_at("2024-03-01T12:30:00Z");
        assert!(is_fresh(created.as_ref(), FRESHNESS_WINDOW, now));
    }
}
