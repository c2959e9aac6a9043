use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalendarError {
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
}

/// Calendar-day arithmetic in one IANA timezone.
///
/// Task dates and streak dates are stored as UTC instants, but a "day" is always the
/// wall-clock date of the owning user. Every comparison goes through the local date so
/// DST transitions (23h or 25h days) never shift a day boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    tz: Tz,
}

impl Calendar {
    /// Parse an IANA timezone name. Unknown names are an error, never UTC.
    pub fn new(timezone: &str) -> Result<Self, CalendarError> {
        timezone
            .parse::<Tz>()
            .map(|tz| Self { tz })
            .map_err(|_| CalendarError::InvalidTimezone(timezone.to_string()))
    }

    /// Wall-clock date of `instant` in this timezone
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.tz).date_naive()
    }

    /// The first instant of `date` in this timezone.
    ///
    /// Ambiguous midnights resolve to the earlier instant. Where midnight falls into a
    /// DST gap the day starts at its first existing wall-clock time.
    pub fn start_of_date(&self, date: NaiveDate) -> DateTime<Utc> {
        let midnight = NaiveDateTime::from(date);
        if let Some(start) = self.tz.from_local_datetime(&midnight).earliest() {
            return start.with_timezone(&Utc);
        }

        // Gaps are at most a few hours; step forward in quarter hours.
        let mut candidate = midnight;
        while candidate.date() == date {
            candidate += Duration::minutes(15);
            if let Some(start) = self.tz.from_local_datetime(&candidate).earliest() {
                return start.with_timezone(&Utc);
            }
        }
        midnight.and_utc()
    }

    /// Normalize `instant` to the start of its calendar day in this timezone
    pub fn start_of_day(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        self.start_of_date(self.local_date(instant))
    }

    /// Whole calendar days from `a` to `b`; positive when `b` is later
    pub fn days_between(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> i64 {
        (self.local_date(b) - self.local_date(a)).num_days()
    }

    pub fn is_next_calendar_day(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
        self.days_between(a, b) == 1
    }

    /// Full calendar days elapsed since `due`, never negative. A task due today is 0.
    pub fn days_pending(&self, due: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        self.days_between(due, now).max(0)
    }
}

impl FromStr for Calendar {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Calendar::new(s)
    }
}
