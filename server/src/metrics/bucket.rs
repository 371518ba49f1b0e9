//! Integer time buckets for metric aggregation
//!
//! Buckets encode UTC wall-clock time as decimal integers so that rolling a
//! bucket up to a coarser granularity is plain integer division:
//! minute `YYYYMMDDHHmm`, hour `YYYYMMDDHH`, day `YYYYMMDD`, month `YYYYMM`.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Aggregation granularity, coarsest to finest: Month > Day > Hour > Minute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Minute,
    Hour,
    Day,
    Month,
}

impl Granularity {
    pub const ALL: [Granularity; 4] = [
        Granularity::Minute,
        Granularity::Hour,
        Granularity::Day,
        Granularity::Month,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Minute => "minute",
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Month => "month",
        }
    }

    /// Truncate a minute bucket (`YYYYMMDDHHmm`) down to this granularity.
    pub fn truncate_minute(&self, minute: i64) -> i64 {
        match self {
            Granularity::Minute => minute,
            Granularity::Hour => minute / 100,
            Granularity::Day => minute / 10_000,
            Granularity::Month => minute / 1_000_000,
        }
    }

    /// Recover the granularity of a bucket from its decimal width.
    pub fn of_bucket(bucket: i64) -> Granularity {
        if bucket >= 100_000_000_000 {
            Granularity::Minute
        } else if bucket >= 1_000_000_000 {
            Granularity::Hour
        } else if bucket >= 10_000_000 {
            Granularity::Day
        } else {
            Granularity::Month
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Minute bucket (`YYYYMMDDHHmm`, UTC) for an epoch-millisecond timestamp.
pub fn minute_bucket(epoch_ms: i64) -> i64 {
    datetime_to_minute(&crate::utils::time::millis_to_datetime(epoch_ms))
}

fn datetime_to_minute(dt: &DateTime<Utc>) -> i64 {
    dt.year() as i64 * 100_000_000
        + dt.month() as i64 * 1_000_000
        + dt.day() as i64 * 10_000
        + dt.hour() as i64 * 100
        + dt.minute() as i64
}
