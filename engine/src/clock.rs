//! Server-side time source.
//!
//! All audit and "last modified" stamps come from a [`Clock`] so that the
//! server, not the client, decides what time a write happened. Timestamps are
//! naive UTC, matching the `timestamp` columns of the store.

use crate::{error::Result, Error, Timestamp};
use chrono::{DateTime, NaiveDateTime, Utc};

/// Wire format for stamped timestamps (ISO-8601, microsecond precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Source of "now" for stamping writes.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now().naive_utc()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Timestamp);

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}

/// Render a timestamp the way stamped fields are written.
pub fn format_timestamp(ts: Timestamp) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp as produced by the store or sent by a client.
///
/// Accepts `T` or space separated ISO-8601 with optional fractional seconds,
/// and RFC 3339 strings with an offset (converted to UTC).
pub fn parse_timestamp(input: &str) -> Result<Timestamp> {
    let trimmed = input.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.with_timezone(&Utc).naive_utc());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(ts);
        }
    }

    Err(Error::InvalidTimestamp(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn fixed_clock_is_frozen() {
        let clock = FixedClock(at(10, 0, 0));
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now(), at(10, 0, 0));
    }

    #[test]
    fn parse_store_rendering() {
        assert_eq!(parse_timestamp("2024-03-01T10:00:00").unwrap(), at(10, 0, 0));
        let with_fraction = parse_timestamp("2024-03-01T10:00:00.250000").unwrap();
        assert!(with_fraction > at(10, 0, 0));
        assert!(with_fraction < at(10, 0, 1));
    }

    #[test]
    fn parse_space_separated_and_offsets() {
        assert_eq!(parse_timestamp("2024-03-01 10:00:00").unwrap(), at(10, 0, 0));
        assert_eq!(
            parse_timestamp("2024-03-01T12:00:00+02:00").unwrap(),
            at(10, 0, 0)
        );
        assert_eq!(parse_timestamp("2024-03-01T10:00:00Z").unwrap(), at(10, 0, 0));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(Error::InvalidTimestamp(s)) if s == "yesterday"
        ));
    }

    #[test]
    fn format_round_trips() {
        let ts = at(8, 30, 15);
        assert_eq!(format_timestamp(ts), "2024-03-01T08:30:15.000000");
        assert_eq!(parse_timestamp(&format_timestamp(ts)).unwrap(), ts);
    }
}
