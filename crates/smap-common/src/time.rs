//! Time handling: date parsing and timestamp sequences.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

/// Units of the archive time axis.
pub const TIME_UNITS: &str = "seconds since 1970-01-01 00:00:00";

/// Parse a date from "YYYY-MM-DD", "YYYYMMDD", "YYYY.MM.DD" or an ISO 8601 datetime.
pub fn parse_date(s: &str) -> Result<NaiveDate, TimeParseError> {
    let s = s.trim();
    for fmt in ["%Y-%m-%d", "%Y%m%d", "%Y.%m.%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc).date_naive());
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(ndt.date());
    }

    Err(TimeParseError::InvalidFormat(s.to_string()))
}

/// Midnight UTC of a date.
pub fn day_start(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

pub fn to_epoch_seconds(dt: &DateTime<Utc>) -> i64 {
    dt.timestamp()
}

pub fn from_epoch_seconds(seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
}

/// Inclusive range of timestamps at a fixed step.
#[derive(Debug, Clone)]
pub struct DateRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    step: Duration,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate, step: Duration) -> Result<Self, TimeParseError> {
        if step <= Duration::zero() {
            return Err(TimeParseError::InvalidStep(step.to_string()));
        }
        if start > end {
            return Err(TimeParseError::InvalidRange { start, end });
        }

        Ok(Self {
            start: day_start(start),
            end: day_start(end) + Duration::days(1) - Duration::seconds(1),
            step,
        })
    }

    /// Daily range from `start` to `end`.
    pub fn daily(start: NaiveDate, end: NaiveDate) -> Result<Self, TimeParseError> {
        Self::new(start, end, Duration::days(1))
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    /// All timestamps from the start of `start` through the last one on `end`.
    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        let mut out = Vec::new();
        let mut current = self.start;
        while current <= self.end {
            out.push(current);
            current += self.step;
        }
        out
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    #[error("Invalid time format: {0}")]
    InvalidFormat(String),

    #[error("Invalid date range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Invalid time step: {0}")]
    InvalidStep(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("2015-04-01").unwrap(), date(2015, 4, 1));
        assert_eq!(parse_date("20150401").unwrap(), date(2015, 4, 1));
        assert_eq!(parse_date("2015.04.01").unwrap(), date(2015, 4, 1));
        assert_eq!(parse_date("2015-04-01T06:00:00Z").unwrap(), date(2015, 4, 1));
        assert!(parse_date("April 1st").is_err());
    }

    #[test]
    fn test_daily_range_inclusive() {
        let range = DateRange::daily(date(2015, 4, 1), date(2015, 4, 3)).unwrap();
        let ts = range.timestamps();
        assert_eq!(ts.len(), 3);
        assert_eq!(ts[0], day_start(date(2015, 4, 1)));
        assert_eq!(ts[2], day_start(date(2015, 4, 3)));
    }

    #[test]
    fn test_sub_daily_step() {
        let range = DateRange::new(date(2015, 4, 1), date(2015, 4, 1), Duration::hours(12)).unwrap();
        let ts = range.timestamps();
        assert_eq!(ts.len(), 2);
        assert_eq!(ts[1].hour(), 12);
    }

    #[test]
    fn test_invalid_range() {
        assert!(matches!(
            DateRange::daily(date(2015, 4, 2), date(2015, 4, 1)),
            Err(TimeParseError::InvalidRange { .. })
        ));
        assert!(DateRange::new(date(2015, 4, 1), date(2015, 4, 2), Duration::zero()).is_err());
    }

    #[test]
    fn test_epoch_roundtrip() {
        let dt = day_start(date(2015, 4, 1));
        assert_eq!(from_epoch_seconds(to_epoch_seconds(&dt)), Some(dt));
    }
}
