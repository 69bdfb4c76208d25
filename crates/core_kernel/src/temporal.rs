//! Temporal utilities
//!
//! Billing cycles are dated in the utility's local calendar. This module
//! provides date ranges, the working-day calendar (weekends plus a holiday
//! table), and the target-date adjustment used when scheduling submission
//! windows.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// The utility's local timezone
pub const LOCAL_TZ: Tz = chrono_tz::Africa::Dar_es_Salaam;

/// Errors related to temporal operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid period: start {start} must not be after end {end}")]
    InvalidPeriod { start: NaiveDate, end: NaiveDate },

    #[error("Periods overlap")]
    PeriodsOverlap,

    #[error("Gap in period sequence between {0} and {1}")]
    GapInSequence(NaiveDate, NaiveDate),
}

/// An inclusive date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, TemporalError> {
        if start > end {
            return Err(TemporalError::InvalidPeriod { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// True if `other` begins exactly one day after this range ends
    pub fn abuts(&self, other: &DateRange) -> bool {
        other.start == self.end + Duration::days(1)
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// Which direction to move a date that falls on a non-working day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkingDayPreference {
    /// Move backward to the nearest earlier working day (default)
    Previous,
    /// Move forward to the nearest later working day
    Next,
}

/// Working-day calendar: Monday through Friday, minus listed holidays
///
/// Holiday dates are supplied at construction; the calendar itself has no
/// notion of recurring rules, so variable holidays are listed per year.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HolidayCalendar {
    holidays: BTreeSet<NaiveDate>,
}

impl HolidayCalendar {
    pub fn new(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
        }
    }

    /// A calendar with no holidays (weekends only)
    pub fn weekends_only() -> Self {
        Self::default()
    }

    pub fn add_holiday(&mut self, date: NaiveDate) {
        self.holidays.insert(date);
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }

    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.is_holiday(date)
    }

    /// Adjusts a target date to the nearest working day
    ///
    /// Returns the date unchanged when it is already a working day.
    pub fn adjust(&self, target: NaiveDate, prefer: WorkingDayPreference) -> NaiveDate {
        let step = match prefer {
            WorkingDayPreference::Previous => Duration::days(-1),
            WorkingDayPreference::Next => Duration::days(1),
        };

        let mut current = target;
        // A year of consecutive non-working days would be a broken calendar.
        for _ in 0..366 {
            if self.is_working_day(current) {
                return current;
            }
            current += step;
        }
        current
    }
}

/// Converts a local calendar date to the UTC instant at which it ends
///
/// Used when a date-bounded window must be compared against an event
/// timestamp: the window stays open until the end of the local day.
pub fn local_end_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(23, 59, 59)
        .expect("23:59:59 is a valid time")
        .and_local_timezone(LOCAL_TZ)
        .earliest()
        .expect("Dar es Salaam has no DST gaps")
        .with_timezone(&Utc)
}

/// The local calendar date of a UTC instant
pub fn local_date(at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&LOCAL_TZ).date_naive()
}
