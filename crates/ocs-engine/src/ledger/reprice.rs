//! Re-pricing of unit consumption
//!
//! A unit balance with a rating subject charges the monetary cost of the
//! increment as priced by that subject's rates.

use chrono::{DateTime, Duration, Utc};
use ocs_core::consts::ZERO_RATING_SUBJECT_PREFIX;
use ocs_core::models::duration::nanos;
use ocs_core::models::{Increment, RatingInfo};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Rating infos of every rating subject met on the call's unit balances
#[derive(Debug, Clone, Default)]
pub struct Repricer {
    plans: HashMap<String, Vec<RatingInfo>>,
    call_start: Option<DateTime<Utc>>,
    offset: Duration,
}

impl Repricer {
    /// `offset` is the session usage consumed before `call_start`
    pub fn new(call_start: DateTime<Utc>, offset: Duration) -> Self {
        Self {
            plans: HashMap::new(),
            call_start: Some(call_start),
            offset,
        }
    }

    pub fn insert(&mut self, subject: impl Into<String>, infos: Vec<RatingInfo>) {
        self.plans.insert(subject.into(), infos);
    }

    pub fn knows(&self, subject: &str) -> bool {
        subject.starts_with(ZERO_RATING_SUBJECT_PREFIX) || self.plans.contains_key(subject)
    }

    /// Monetary cost of `increment` starting at `at` under `subject`
    ///
    /// Zero for `*zero` subjects, `None` when the subject cannot price it.
    pub fn price(&self, subject: &str, increment: &Increment, at: DateTime<Utc>) -> Option<Decimal> {
        if subject.starts_with(ZERO_RATING_SUBJECT_PREFIX) {
            return Some(Decimal::ZERO);
        }
        let infos = self.plans.get(subject)?;
        let info = infos.iter().find(|info| info.covers(at))?;
        let interval = info.interval_at(at)?;

        let usage = self.offset + self.call_start.map_or(Duration::zero(), |start| at - start);
        let tier = interval.rating.tier_at(usage)?;
        let unit = nanos(tier.rate_unit);
        if unit <= 0 {
            return None;
        }
        let exact = tier.value * Decimal::from(nanos(increment.duration)) / Decimal::from(unit);
        Some(interval.rating.round(exact))
    }
}
