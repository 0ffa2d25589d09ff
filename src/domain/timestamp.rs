use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A point in time stored as RFC 3339 UTC in the document.
///
/// Parsing is lenient so older files keep loading: RFC 3339 with any offset,
/// naive `YYYY-MM-DDTHH:MM:SS[.f]` (read as local time), and bare
/// `YYYY-MM-DD` (read as local midnight).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Interpret a wall-clock time in the local timezone.
    /// Times falling into a DST gap are taken as UTC.
    pub fn from_local_naive(naive: NaiveDateTime) -> Self {
        let dt = Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&naive));
        Self(dt)
    }

    /// Local midnight of the given day
    pub fn from_local_date(date: NaiveDate) -> Self {
        Self::from_local_naive(date.and_time(NaiveTime::MIN))
    }

    pub fn local(&self) -> DateTime<Local> {
        self.0.with_timezone(&Local)
    }

    /// Calendar day in the local timezone
    pub fn local_date(&self) -> NaiveDate {
        self.local().date_naive()
    }

    /// Whole days from `today` to this timestamp's local day (negative = past)
    pub fn days_from(&self, today: NaiveDate) -> i64 {
        self.local_date().signed_duration_since(today).num_days()
    }

    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }
}

/// Error returned when a string is not a recognised date or datetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampParseError(pub String);

impl fmt::Display for TimestampParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid date '{}': expected ISO 8601 or YYYY-MM-DD",
            self.0
        )
    }
}

impl std::error::Error for TimestampParseError {}

impl FromStr for Timestamp {
    type Err = TimestampParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(Self(dt.with_timezone(&Utc)));
        }
        for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
                return Ok(Self::from_local_naive(naive));
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return Ok(Self::from_local_date(date));
        }
        Err(TimestampParseError(s.to_string()))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc3339_round_trip() {
        let ts: Timestamp = "2025-01-01T00:00:00Z".parse().unwrap();
        assert_eq!(ts.to_string(), "2025-01-01T00:00:00Z");

        let offset: Timestamp = "2025-01-01T09:00:00+09:00".parse().unwrap();
        assert_eq!(offset, ts);
    }

    #[test]
    fn test_fractional_seconds_preserved() {
        let ts: Timestamp = "2025-03-04T05:06:07.250Z".parse().unwrap();
        assert_eq!(ts.to_string(), "2025-03-04T05:06:07.250Z");
    }

    #[test]
    fn test_naive_and_date_only_are_local() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        let ts: Timestamp = "2025-06-15".parse().unwrap();
        assert_eq!(ts.local_date(), date);

        let naive: Timestamp = "2025-06-15T12:30:00.123456".parse().unwrap();
        assert_eq!(naive.local_date(), date);
    }

    #[test]
    fn test_invalid_strings_rejected() {
        assert!("tomorrow".parse::<Timestamp>().is_err());
        assert!("2025-13-01".parse::<Timestamp>().is_err());
        assert!("".parse::<Timestamp>().is_err());
    }

    #[test]
    fn test_days_from() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        let due = Timestamp::from_local_naive(
            NaiveDate::from_ymd_opt(2025, 1, 13).unwrap().and_hms_opt(12, 0, 0).unwrap(),
        );
        assert_eq!(due.days_from(today), 3);
        assert_eq!(Timestamp::from_local_date(today).days_from(today), 0);
    }

    #[test]
    fn test_serde_as_string() {
        let ts: Timestamp = "2025-01-01T00:00:00Z".parse().unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"2025-01-01T00:00:00Z\"");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
        assert!(serde_json::from_str::<Timestamp>("\"nope\"").is_err());
    }
}
