//! # Civil Time
//!
//! All schedule and statistics logic runs on wall-clock time in one named
//! civil timezone (`Asia/Shanghai` unless configured otherwise). Storage keeps
//! naive `TIMESTAMP` values; [`CivilClock::from_wall_clock`] re-attaches the
//! zone on read so that a driver never gets the chance to treat them as UTC.

use chrono::{
    DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use chrono_tz::Tz;
use thiserror::Error;

/// Clock-skew tolerance for client-supplied feeding times.
pub const FUTURE_GRACE_MINUTES: i64 = 2;

#[derive(Debug, Error, PartialEq)]
pub enum CivilTimeError {
    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),
    #[error("invalid RFC 3339 timestamp '{0}'")]
    InvalidTimestamp(String),
}

/// Age derived from a birth date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BabyAge {
    pub days: i64,
    /// `days / 30`.
    pub months: f64,
}

/// Wall-clock source and converter for a fixed civil timezone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CivilClock {
    tz: Tz,
}

impl Default for CivilClock {
    fn default() -> Self {
        Self::new(chrono_tz::Asia::Shanghai)
    }
}

impl CivilClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Builds a clock from an IANA zone name such as `Asia/Shanghai`.
    pub fn from_name(name: &str) -> Result<Self, CivilTimeError> {
        name.trim()
            .parse::<Tz>()
            .map(Self::new)
            .map_err(|_| CivilTimeError::UnknownTimezone(name.to_string()))
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }

    pub fn future_grace() -> Duration {
        Duration::minutes(FUTURE_GRACE_MINUTES)
    }

    /// Interprets a naive storage value by its calendar fields in the civil zone.
    ///
    /// Ambiguous values (a repeated hour) resolve to the earlier instant.
    /// Values inside a skipped hour move forward by one hour.
    pub fn from_wall_clock(&self, naive: NaiveDateTime) -> DateTime<Tz> {
        match self.tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => dt,
            LocalResult::Ambiguous(earliest, _) => earliest,
            LocalResult::None => {
                let shifted = naive + Duration::hours(1);
                self.tz
                    .from_local_datetime(&shifted)
                    .earliest()
                    .unwrap_or_else(|| self.tz.from_utc_datetime(&naive))
            }
        }
    }

    /// The naive civil wall-clock value for storage.
    pub fn to_wall_clock<Z: TimeZone>(&self, at: &DateTime<Z>) -> NaiveDateTime {
        at.with_timezone(&self.tz).naive_local()
    }

    /// Parses an RFC 3339 timestamp and moves it into the civil zone.
    pub fn parse_rfc3339(&self, raw: &str) -> Result<DateTime<Tz>, CivilTimeError> {
        DateTime::parse_from_rfc3339(raw.trim())
            .map(|dt| dt.with_timezone(&self.tz))
            .map_err(|_| CivilTimeError::InvalidTimestamp(raw.to_string()))
    }

    pub fn start_of_day(&self, at: &DateTime<Tz>) -> DateTime<Tz> {
        self.from_wall_clock(at.date_naive().and_time(NaiveTime::MIN))
    }

    /// Midnight that starts the following civil day.
    pub fn end_of_day(&self, at: &DateTime<Tz>) -> DateTime<Tz> {
        match at.date_naive().succ_opt() {
            Some(next) => self.from_wall_clock(next.and_time(NaiveTime::MIN)),
            None => self.start_of_day(at) + Duration::days(1),
        }
    }

    /// Clamps a requested feeding time to `now` when it lies further in the
    /// future than the skew tolerance.
    pub fn clamp_feeding_time(&self, requested: DateTime<Tz>, now: DateTime<Tz>) -> DateTime<Tz> {
        if requested > now + Self::future_grace() {
            now
        } else {
            requested
        }
    }

    pub fn age_of(&self, birth_date: NaiveDate, now: &DateTime<Tz>) -> BabyAge {
        let born = self.from_wall_clock(birth_date.and_time(NaiveTime::MIN));
        let days = (*now - born).num_hours().div_euclid(24).max(0);
        BabyAge {
            days,
            months: days as f64 / 30.0,
        }
    }
}
