//! Timing model
//!
//! A recurrence rule selecting the calendar days and the time-of-day window in
//! which a rate interval applies.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Recurrence rule of a rate interval
///
/// Empty calendar lists match any value. `start_time` defaults to midnight and
/// `end_time` to the end of the day; an `end_time` of `00:00:00` also means
/// the end of the day.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RITiming {
    #[serde(default)]
    pub years: Vec<i32>,

    /// Months, 1 to 12
    #[serde(default)]
    pub months: Vec<u32>,

    /// Days of month, 1 to 31
    #[serde(default)]
    pub month_days: Vec<u32>,

    #[serde(default)]
    pub week_days: Vec<Weekday>,

    #[serde(default)]
    pub start_time: Option<NaiveTime>,

    #[serde(default)]
    pub end_time: Option<NaiveTime>,
}

impl RITiming {
    /// Timing active on weekdays from `start_time` on
    pub fn weekdays_from(start_time: NaiveTime) -> Self {
        Self {
            week_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            start_time: Some(start_time),
            ..Default::default()
        }
    }

    /// Check the calendar filters against the date of `at`
    pub fn day_matches(&self, at: DateTime<Utc>) -> bool {
        let date = at.date_naive();
        (self.years.is_empty() || self.years.contains(&date.year()))
            && (self.months.is_empty() || self.months.contains(&date.month()))
            && (self.month_days.is_empty() || self.month_days.contains(&date.day()))
            && (self.week_days.is_empty() || self.week_days.contains(&date.weekday()))
    }

    /// Whether the rule covers the instant `at`
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        if !self.day_matches(at) {
            return false;
        }
        let tod = at.time();
        let after_start = self.start_time.map_or(true, |start| tod >= start);
        let before_end = self.effective_end().map_or(true, |end| tod < end);
        after_start && before_end
    }

    /// Number of constrained calendar fields; higher is more specific
    pub fn specificity(&self) -> usize {
        [
            !self.years.is_empty(),
            !self.months.is_empty(),
            !self.month_days.is_empty(),
            !self.week_days.is_empty(),
        ]
        .iter()
        .filter(|constrained| **constrained)
        .count()
    }

    /// Offsets from midnight at which the rule switches on or off
    pub fn day_boundaries(&self) -> Vec<Duration> {
        self.start_time
            .into_iter()
            .chain(self.effective_end())
            .map(since_midnight)
            .collect()
    }

    fn effective_end(&self) -> Option<NaiveTime> {
        self.end_time
            .filter(|end| end.num_seconds_from_midnight() != 0 || end.nanosecond() != 0)
    }
}

/// Time elapsed since midnight
pub fn since_midnight(tod: NaiveTime) -> Duration {
    Duration::seconds(i64::from(tod.num_seconds_from_midnight()))
        + Duration::nanoseconds(i64::from(tod.nanosecond()))
}

/// Midnight starting the UTC day of `at`
pub fn start_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    at - since_midnight(at.time())
}
