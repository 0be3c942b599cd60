//! General utilities.

use chrono::{DateTime, Utc};

/// Get the current time.
///
/// When the `DEVSOLO_TEST_EPOCH` environment variable is set (by tests),
/// returns that Unix timestamp instead of the wall clock. This keeps
/// timestamps in test fixtures deterministic.
///
/// All code that stores or displays timestamps should use this function
/// rather than `Utc::now()` directly.
pub fn now() -> DateTime<Utc> {
    std::env::var("DEVSOLO_TEST_EPOCH")
        .ok()
        .and_then(|val| val.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now)
}

/// Format a timestamp as ISO 8601 with second precision (e.g. "2026-08-01T09:30:00Z").
pub fn format_iso8601(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Today's date in `YYYY-MM-DD` form, used in burned-branch suggestions.
pub fn today() -> String {
    now().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_returns_reasonable_timestamp() {
        let ts = now();
        // After 2020-01-01
        assert!(ts.timestamp() > 1_577_836_800);
    }

    #[test]
    fn test_format_iso8601() {
        let ts = DateTime::from_timestamp(1_600_000_000, 0).unwrap();
        assert_eq!(format_iso8601(ts), "2020-09-13T12:26:40Z");
    }
}
