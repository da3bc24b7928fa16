use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

/// Whole-second UTC ISO 8601, e.g. `2018-10-23T14:05:09Z`.
///
/// Used for exported tables and generated session names.
pub fn iso8601(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Fixed-width RFC 3339 with microseconds so stored values sort lexically.
pub fn storage_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field} {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn iso8601_drops_fractional_seconds() {
        let ts = Utc.with_ymd_and_hms(2018, 10, 23, 14, 5, 9).unwrap()
            + chrono::Duration::milliseconds(250);
        assert_eq!(iso8601(&ts), "2018-10-23T14:05:09Z");
    }

    #[test]
    fn storage_format_sorts_chronologically() {
        let early = Utc.with_ymd_and_hms(2018, 10, 23, 14, 5, 9).unwrap();
        let late = early + chrono::Duration::microseconds(1);
        let (a, b) = (storage_timestamp(&early), storage_timestamp(&late));
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(parse_timestamp(&b, "created_at").unwrap(), late);
    }

    #[test]
    fn parse_reports_field_name() {
        let err = parse_timestamp("yesterday", "started_at").unwrap_err();
        assert!(err.to_string().contains("started_at"));
    }
}
