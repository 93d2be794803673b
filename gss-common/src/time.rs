//! Timestamp utilities

use chrono::{DateTime, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Whole seconds between two instants, rounded to nearest
pub fn duration_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let millis = (end - start).num_milliseconds();
    (millis as f64 / 1000.0).round() as i64
}

/// Parse an RFC 3339 column value back into UTC
pub fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_duration_seconds_exact() {
        let start = now();
        let end = start + Duration::seconds(245);
        assert_eq!(duration_seconds(start, end), 245);
    }

    #[test]
    fn test_duration_seconds_rounds_half_up() {
        let start = now();
        assert_eq!(duration_seconds(start, start + Duration::milliseconds(1499)), 1);
        assert_eq!(duration_seconds(start, start + Duration::milliseconds(1500)), 2);
    }

    #[test]
    fn test_parse_timestamp_round_trip() {
        let ts = now();
        let parsed = parse_timestamp("start_timestamp", &ts.to_rfc3339()).unwrap();
        assert_eq!(parsed, ts);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        let err = parse_timestamp("end_timestamp", "yesterday").unwrap_err();
        assert!(err.to_string().contains("end_timestamp"));
    }
}
