use std::fmt;
use std::ops::{Add, Sub};

use chrono::{DateTime, Utc};
use fluxion_error::{DbError, OptionExt, Result, ResultExt};
use serde::{Deserialize, Serialize};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A point in time, nanoseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Time(pub i64);

impl Time {
    pub const MIN: Time = Time(i64::MIN);
    pub const MAX: Time = Time(i64::MAX);

    pub const fn from_nanos(nanos: i64) -> Self {
        Time(nanos)
    }

    pub const fn nanos(&self) -> i64 {
        self.0
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Result<Self> {
        let nanos = dt
            .timestamp_nanos_opt()
            .required("datetime out of range for nanosecond timestamps")?;
        Ok(Time(nanos))
    }

    /// Parse an RFC3339 timestamp, with or without fractional seconds.
    pub fn parse_rfc3339(s: &str) -> Result<Self> {
        let dt = DateTime::parse_from_rfc3339(s)
            .context_fn(|| format!("failed to parse '{s}' as an RFC3339 timestamp"))?;
        Self::from_datetime(dt.with_timezone(&Utc))
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let secs = self.0.div_euclid(NANOS_PER_SEC);
        let nanos = self.0.rem_euclid(NANOS_PER_SEC) as u32;
        DateTime::from_timestamp(secs, nanos)
    }

    pub fn checked_add(&self, d: Duration) -> Result<Time> {
        self.0
            .checked_add(d.0)
            .map(Time)
            .ok_or_else(|| DbError::new("time overflow").with_field("time", self.0))
    }
}

/// Formats with RFC3339 and as many fractional digits as needed.
impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => {
                write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S"))?;
                let nanos = self.0.rem_euclid(NANOS_PER_SEC);
                if nanos > 0 {
                    let frac = format!("{nanos:09}");
                    write!(f, ".{}", frac.trim_end_matches('0'))?;
                }
                write!(f, "Z")
            }
            None => write!(f, "{}", self.0),
        }
    }
}

impl Add<Duration> for Time {
    type Output = Time;

    fn add(self, rhs: Duration) -> Self::Output {
        Time(self.0.wrapping_add(rhs.0))
    }
}

impl Sub<Duration> for Time {
    type Output = Time;

    fn sub(self, rhs: Duration) -> Self::Output {
        Time(self.0.wrapping_sub(rhs.0))
    }
}

impl Sub<Time> for Time {
    type Output = Duration;

    fn sub(self, rhs: Time) -> Self::Output {
        Duration(self.0.wrapping_sub(rhs.0))
    }
}

/// A signed span of time in nanoseconds.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Duration(pub i64);

impl Duration {
    pub const fn from_nanos(nanos: i64) -> Self {
        Duration(nanos)
    }

    pub const fn from_secs(secs: i64) -> Self {
        Duration(secs * NANOS_PER_SEC)
    }

    pub const fn nanos(&self) -> i64 {
        self.0
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Self::Output {
        Duration(self.0.wrapping_add(rhs.0))
    }
}

impl Sub for Duration {
    type Output = Duration;

    fn sub(self, rhs: Duration) -> Self::Output {
        Duration(self.0.wrapping_sub(rhs.0))
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "0s");
        }
        if self.0 < 0 {
            write!(f, "-")?;
        }
        let mut rem = self.0.unsigned_abs();
        const UNITS: [(&str, u64); 6] = [
            ("h", 3_600_000_000_000),
            ("m", 60_000_000_000),
            ("s", 1_000_000_000),
            ("ms", 1_000_000),
            ("us", 1_000),
            ("ns", 1),
        ];
        for (unit, size) in UNITS {
            let n = rem / size;
            if n > 0 {
                write!(f, "{n}{unit}")?;
                rem -= n * size;
            }
        }
        Ok(())
    }
}

/// Half-open time range `[start, stop)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    pub start: Time,
    pub stop: Time,
}

impl Bounds {
    pub fn contains(&self, t: Time) -> bool {
        t >= self.start && t < self.stop
    }

    pub fn overlaps(&self, other: &Bounds) -> bool {
        self.contains(other.start)
            || self.contains(other.stop)
            || other.contains(self.start)
            || other.contains(self.stop)
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_display() {
        struct TestCase {
            nanos: i64,
            expected: &'static str,
        }

        let cases = [
            TestCase {
                nanos: 0,
                expected: "1970-01-01T00:00:00Z",
            },
            TestCase {
                nanos: 1_500_000_000,
                expected: "1970-01-01T00:00:01.5Z",
            },
            TestCase {
                nanos: 1_000_000_001,
                expected: "1970-01-01T00:00:01.000000001Z",
            },
            TestCase {
                nanos: -1,
                expected: "1969-12-31T23:59:59.999999999Z",
            },
        ];

        for case in cases {
            assert_eq!(case.expected, Time(case.nanos).to_string());
        }
    }

    #[test]
    fn time_parse_roundtrip() {
        let t = Time::parse_rfc3339("2018-05-22T19:53:26.123Z").unwrap();
        assert_eq!("2018-05-22T19:53:26.123Z", t.to_string());

        let t = Time::parse_rfc3339("2018-05-22T21:53:26+02:00").unwrap();
        assert_eq!("2018-05-22T19:53:26Z", t.to_string());
    }

    #[test]
    fn time_parse_invalid() {
        Time::parse_rfc3339("yesterday").unwrap_err();
    }

    #[test]
    fn duration_display() {
        assert_eq!("1m30s", Duration::from_secs(90).to_string());
        assert_eq!("-2s", Duration::from_secs(-2).to_string());
        assert_eq!("1s500ms", Duration(1_500_000_000).to_string());
        assert_eq!("0s", Duration(0).to_string());
    }

    #[test]
    fn bounds_contains() {
        let b = Bounds {
            start: Time(0),
            stop: Time(100),
        };
        assert!(b.contains(Time(0)));
        assert!(b.contains(Time(99)));
        assert!(!b.contains(Time(100)));
    }
}
