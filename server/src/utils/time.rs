//! Time utility functions

use chrono::{DateTime, Utc};

/// Convert milliseconds since Unix epoch to DateTime<Utc>
///
/// Out-of-range timestamps fall back to the epoch rather than panicking;
/// agents occasionally send garbage clocks.
pub fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(|| {
        tracing::warn!(millis, "Invalid timestamp, using epoch");
        DateTime::UNIX_EPOCH
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_to_datetime() {
        let dt = millis_to_datetime(1_704_112_496_000);
        assert_eq!(dt.to_rfc3339(), "2024-01-01T12:34:56+00:00");
    }

    #[test]
    fn test_invalid_millis_falls_back_to_epoch() {
        assert_eq!(millis_to_datetime(i64::MAX), DateTime::UNIX_EPOCH);
    }
}
