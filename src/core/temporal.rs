//! Time-tags: bounded timestamps used throughout the archive

use crate::error::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Unix seconds of 1995-01-01T00:00:00Z, the zero point of every time-tag.
pub const TIME_TAG_EPOCH_UNIX_SECS: i64 = 788_918_400;

/// Time-tag representing a point in time as seconds since 1995-01-01 UTC.
///
/// Only values in `[TimeTag::MIN, TimeTag::MAX]` can be constructed through the
/// checked API, so a `TimeTag` is never NaN and ordering is total.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct TimeTag {
    secs: f64,
}

impl TimeTag {
    /// 1995-01-01T00:00:00Z
    pub const MIN: TimeTag = TimeTag { secs: 0.0 };

    /// 2063-01-19T03:14:07Z
    pub const MAX: TimeTag = TimeTag {
        secs: 2_147_483_647.0,
    };

    /// Create a time-tag, failing with [`Error::Range`] outside the valid bounds
    pub fn new(secs: f64) -> Result<Self> {
        if Self::in_range(secs) {
            // fold -0.0 into 0.0 so equality agrees with total ordering
            Ok(Self { secs: secs + 0.0 })
        } else {
            Err(Error::Range(format!(
                "time-tag {} outside [{}, {}]",
                secs,
                Self::MIN.secs,
                Self::MAX.secs
            )))
        }
    }

    /// Create a time-tag from a persisted value, replacing anything invalid with `MIN`
    pub fn clamped(secs: f64) -> Self {
        if Self::in_range(secs) {
            Self { secs: secs + 0.0 }
        } else {
            Self::MIN
        }
    }

    /// Whether `secs` is a value a time-tag may hold
    pub fn in_range(secs: f64) -> bool {
        secs >= Self::MIN.secs && secs <= Self::MAX.secs
    }

    /// Create a time-tag from a UTC date-time
    pub fn from_datetime(dt: DateTime<Utc>) -> Result<Self> {
        let secs = (dt.timestamp() - TIME_TAG_EPOCH_UNIX_SECS) as f64
            + f64::from(dt.timestamp_subsec_nanos()) / 1e9;
        Self::new(secs)
    }

    /// Current wall-clock time as a time-tag
    pub fn now() -> Result<Self> {
        Self::from_datetime(Utc::now())
    }

    /// Seconds since 1995-01-01 UTC
    pub fn as_secs(&self) -> f64 {
        self.secs
    }

    /// Convert to chrono DateTime
    pub fn to_datetime(&self) -> DateTime<Utc> {
        let whole = self.secs.trunc();
        let nanos = ((self.secs - whole) * 1e9) as u32;
        Utc.timestamp_opt(TIME_TAG_EPOCH_UNIX_SECS + whole as i64, nanos)
            .single()
            .unwrap_or_default()
    }

    pub fn is_min(&self) -> bool {
        *self == Self::MIN
    }

    pub fn is_max(&self) -> bool {
        *self == Self::MAX
    }
}

impl Default for TimeTag {
    fn default() -> Self {
        Self::MIN
    }
}

impl PartialEq for TimeTag {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TimeTag {}

impl PartialOrd for TimeTag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeTag {
    fn cmp(&self, other: &Self) -> Ordering {
        self.secs.total_cmp(&other.secs)
    }
}

impl TryFrom<f64> for TimeTag {
    type Error = Error;

    fn try_from(secs: f64) -> Result<Self> {
        Self::new(secs)
    }
}

impl From<TimeTag> for f64 {
    fn from(tag: TimeTag) -> Self {
        tag.secs
    }
}

impl fmt::Display for TimeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_tag_bounds() {
        assert!(TimeTag::new(0.0).is_ok());
        assert!(TimeTag::new(2_147_483_647.0).is_ok());
        assert!(matches!(TimeTag::new(-0.5), Err(Error::Range(_))));
        assert!(matches!(TimeTag::new(2_147_483_648.0), Err(Error::Range(_))));
        assert!(matches!(TimeTag::new(f64::NAN), Err(Error::Range(_))));
    }

    #[test]
    fn test_clamped_replaces_invalid_values_with_min() {
        assert_eq!(TimeTag::clamped(-100.0), TimeTag::MIN);
        assert_eq!(TimeTag::clamped(f64::INFINITY), TimeTag::MIN);
        assert_eq!(TimeTag::clamped(f64::NAN), TimeTag::MIN);
        assert_eq!(TimeTag::clamped(42.5).as_secs(), 42.5);
    }

    #[test]
    fn test_datetime_conversion() {
        let dt = Utc.with_ymd_and_hms(1995, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(TimeTag::from_datetime(dt).unwrap(), TimeTag::MIN);

        let dt = Utc.with_ymd_and_hms(2010, 6, 15, 12, 30, 0).unwrap();
        let tag = TimeTag::from_datetime(dt).unwrap();
        assert_eq!(tag.to_datetime(), dt);

        let too_early = Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap();
        assert!(TimeTag::from_datetime(too_early).is_err());
    }

    #[test]
    fn test_ordering() {
        let a = TimeTag::new(100.0).unwrap();
        let b = TimeTag::new(200.0).unwrap();
        assert!(a < b);
        assert_eq!(a.max(b), b);
        assert!(TimeTag::MIN.is_min());
        assert!(TimeTag::MAX.is_max());
    }

    #[test]
    fn test_serde_rejects_out_of_range() {
        let tag: TimeTag = serde_json::from_str("150.25").unwrap();
        assert_eq!(tag.as_secs(), 150.25);
        assert!(serde_json::from_str::<TimeTag>("-1.0").is_err());
    }
}
