use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::common::error::{ConsolidateError, Result};

static COUNT_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s,.\u{a0}]").unwrap());

/// Parses a date string in an explicit source-specific format.
pub fn clean_date(raw: &str, fmt: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), fmt)
        .map_err(|e| ConsolidateError::Config(format!("invalid date '{raw}' for format '{fmt}': {e}")))
}

/// Parses an ISO-8601 date, tolerating a trailing time component
/// (e.g. `2021-07-01T00:00:00.000Z`).
pub fn parse_iso_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    let date_part = match raw.find('T') {
        Some(idx) => &raw[..idx],
        None => raw,
    };
    clean_date(date_part, "%Y-%m-%d")
}

/// Converts an epoch-millisecond timestamp (as some dashboards report their
/// refresh time) into a calendar date.
pub fn from_epoch_millis(millis: i64) -> Result<NaiveDate> {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.date_naive())
        .ok_or_else(|| ConsolidateError::Config(format!("epoch millis out of range: {millis}")))
}

/// Parses a count that may carry thousands separators or stray whitespace.
pub fn clean_count(raw: &str) -> Result<u64> {
    let cleaned = COUNT_SEPARATORS.replace_all(raw.trim(), "");
    cleaned
        .parse::<u64>()
        .map_err(|e| ConsolidateError::Config(format!("invalid count '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso_date_with_and_without_time() {
        let expected = NaiveDate::from_ymd_opt(2021, 7, 1).unwrap();
        assert_eq!(parse_iso_date("2021-07-01").unwrap(), expected);
        assert_eq!(parse_iso_date("2021-07-01T00:00:00.000Z").unwrap(), expected);
    }

    #[test]
    fn parses_source_specific_format() {
        let date = clean_date("05.03.2021", "%d.%m.%Y").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2021, 3, 5).unwrap());
    }

    #[test]
    fn rejects_garbage_dates() {
        assert!(parse_iso_date("not-a-date").is_err());
    }

    #[test]
    fn converts_epoch_millis() {
        // 2021-06-15T12:00:00Z
        let date = from_epoch_millis(1_623_758_400_000).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2021, 6, 15).unwrap());
    }

    #[test]
    fn cleans_separated_counts() {
        assert_eq!(clean_count("1 234 567").unwrap(), 1_234_567);
        assert_eq!(clean_count("1,234").unwrap(), 1_234);
        assert_eq!(clean_count("42").unwrap(), 42);
        assert!(clean_count("n/a").is_err());
    }
}
