use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::debug;

// ── TimestampProcessor ────────────────────────────────────────────────────────

/// Parses commit timestamps from the formats the analysis pipeline emits.
pub struct TimestampProcessor;

impl TimestampProcessor {
    /// Parse a JSON value into a timestamp that keeps the author's offset.
    ///
    /// Handles:
    /// * JSON string → RFC 3339 (including `Z`), `git log` style
    ///   `"%Y-%m-%d %H:%M:%S %z"`, or naive patterns (taken as UTC).
    /// * JSON number → Unix timestamp in seconds.
    /// * anything else → `None`.
    pub fn parse(value: &Value) -> Option<DateTime<FixedOffset>> {
        match value {
            Value::String(s) => Self::parse_str(s),
            Value::Number(n) => {
                let secs = n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64))?;
                DateTime::from_timestamp(secs, 0).map(|dt| dt.fixed_offset())
            }
            _ => None,
        }
    }

    /// Same as [`TimestampProcessor::parse`], converted to UTC.
    pub fn parse_utc(value: &Value) -> Option<DateTime<Utc>> {
        Self::parse(value).map(|dt| dt.with_timezone(&Utc))
    }

    pub fn parse_str(s: &str) -> Option<DateTime<FixedOffset>> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt);
        }

        const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S %z", "%Y-%m-%dT%H:%M:%S%.f%z"];
        for fmt in OFFSET_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
                return Some(dt);
            }
        }

        const NAIVE_FORMATS: &[&str] = &[
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%d %H:%M:%S",
        ];
        for fmt in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                return Some(Utc.from_utc_datetime(&naive).fixed_offset());
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            let naive = date.and_hms_opt(0, 0, 0)?;
            return Some(Utc.from_utc_datetime(&naive).fixed_offset());
        }

        debug!("could not parse timestamp string \"{}\"", s);
        None
    }

    /// Calendar month key (`"YYYY-MM"`) in the author's local time.
    pub fn month_key(dt: &DateTime<FixedOffset>) -> String {
        dt.format("%Y-%m").to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_rfc3339_keeps_offset() {
        let dt = TimestampProcessor::parse(&json!("2024-03-31T23:30:00-05:00")).unwrap();
        assert_eq!(dt.offset().local_minus_utc(), -5 * 3600);
        // Local month is March even though UTC is already April.
        assert_eq!(TimestampProcessor::month_key(&dt), "2024-03");
        let utc = TimestampProcessor::parse_utc(&json!("2024-03-31T23:30:00-05:00")).unwrap();
        assert_eq!(utc.format("%Y-%m").to_string(), "2024-04");
    }

    #[test]
    fn test_parse_git_log_format() {
        let dt = TimestampProcessor::parse_str("2023-11-02 09:15:00 +0530").unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 5 * 3600 + 1800);
    }

    #[test]
    fn test_parse_naive_is_utc() {
        let dt = TimestampProcessor::parse_str("2023-11-02 09:15:00").unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 0);
        let date_only = TimestampProcessor::parse_str("2023-11-02").unwrap();
        assert_eq!(TimestampProcessor::month_key(&date_only), "2023-11");
    }

    #[test]
    fn test_parse_unix_seconds() {
        let dt = TimestampProcessor::parse_utc(&json!(1_700_000_000)).unwrap();
        assert_eq!(dt.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(TimestampProcessor::parse(&json!("yesterday")).is_none());
        assert!(TimestampProcessor::parse(&json!("")).is_none());
        assert!(TimestampProcessor::parse(&json!(null)).is_none());
        assert!(TimestampProcessor::parse(&json!({"date": 1})).is_none());
    }
}
