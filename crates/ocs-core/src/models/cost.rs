//! Cost breakdown model
//!
//! A `CallCost` holds the ordered time spans of a call; each span carries the
//! increments that were (or would be) debited and the balances that paid them.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::account::AccountSummary;
use super::descriptor::{CallDescriptor, ToR};
use super::duration::{self, nanos};
use super::plan::RateInterval;

/// Monetary balance that paid an increment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonetaryInfo {
    pub uuid: String,
    pub id: String,
    /// Balance value after the debit
    pub value: Decimal,
}

/// Unit balance that paid an increment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitInfo {
    pub uuid: String,
    pub id: String,
    /// Balance value after the debit
    pub value: Decimal,
    /// Units taken per increment
    pub consumed: Decimal,
    pub tor: ToR,
    pub factor: Decimal,
}

/// Balances charged for one increment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebitInfo {
    pub account_id: String,
    #[serde(default)]
    pub monetary: Option<MonetaryInfo>,
    #[serde(default)]
    pub unit: Option<UnitInfo>,
}

fn one() -> u64 {
    1
}

/// Run of `compress_factor` equal billable units of a span
///
/// `duration` and `cost` are per unit; every unit of the run was paid by the
/// same balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Increment {
    #[serde(with = "duration")]
    pub duration: Duration,
    pub cost: Decimal,
    #[serde(default)]
    pub balance_info: Option<DebitInfo>,
    #[serde(default = "one")]
    pub compress_factor: u64,
}

impl Increment {
    pub fn new(duration: Duration, cost: Decimal) -> Self {
        Self {
            duration,
            cost,
            balance_info: None,
            compress_factor: 1,
        }
    }

    /// Same increment repeated `factor` times
    pub fn times(mut self, factor: u64) -> Self {
        self.compress_factor = factor;
        self
    }

    pub fn total_cost(&self) -> Decimal {
        self.cost * Decimal::from(self.compress_factor)
    }

    pub fn total_duration(&self) -> Duration {
        let factor = i64::try_from(self.compress_factor).unwrap_or(i64::MAX);
        Duration::nanoseconds(nanos(self.duration).saturating_mul(factor))
    }
}

/// A maximal sub-interval of a call priced uniformly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,

    /// Charged cost, connect fee included; `-1` marks an unrated span
    pub cost: Decimal,

    /// Cost before rounding, connect fee included
    pub exact_cost: Decimal,

    /// Connect fee charged in this span
    #[serde(default)]
    pub connect_fee: Decimal,

    /// Usage billed after rounding up to the rate increment
    #[serde(with = "duration")]
    pub billed_duration: Duration,

    pub rate_interval: Option<RateInterval>,

    /// Session usage at `time_end`
    #[serde(with = "duration")]
    pub duration_index: Duration,

    #[serde(default)]
    pub increments: Vec<Increment>,

    pub matched_subject: String,
    pub matched_prefix: String,
    pub matched_dest_id: String,
    pub rating_plan_id: String,
}

impl TimeSpan {
    pub fn duration(&self) -> Duration {
        self.time_end - self.time_start
    }

    pub fn is_rated(&self) -> bool {
        self.rate_interval.is_some()
    }

    /// Recompute the span cost from its increments
    pub fn sum_increments(&mut self) {
        if !self.increments.is_empty() {
            self.cost = self.increments.iter().map(Increment::total_cost).sum();
        }
    }
}

/// Itemized result of a rating operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallCost {
    pub category: String,
    pub tenant: String,
    pub subject: String,
    pub account: String,
    pub destination: String,
    pub tor: ToR,

    /// Sum of the rated span costs
    pub cost: Decimal,

    /// Connect fee actually charged
    pub connect_fee: Decimal,

    pub timespans: Vec<TimeSpan>,

    #[serde(default)]
    pub account_summary: Option<AccountSummary>,
}

impl CallCost {
    /// Empty cost for a descriptor
    pub fn for_call(cd: &CallDescriptor) -> Self {
        Self {
            category: cd.category.clone(),
            tenant: cd.tenant.clone(),
            subject: cd.subject.clone(),
            account: cd.account_key(),
            destination: cd.destination.clone(),
            tor: cd.tor,
            cost: Decimal::ZERO,
            connect_fee: Decimal::ZERO,
            timespans: Vec::new(),
            account_summary: None,
        }
    }

    /// Sentinel for a call whose subject has no rating profile
    pub fn unrated(cd: &CallDescriptor) -> Self {
        Self {
            cost: Decimal::NEGATIVE_ONE,
            ..Self::for_call(cd)
        }
    }

    pub fn is_unrated(&self) -> bool {
        self.cost == Decimal::NEGATIVE_ONE && self.timespans.is_empty()
    }

    pub fn duration(&self) -> Duration {
        self.timespans
            .iter()
            .fold(Duration::zero(), |acc, ts| acc + ts.duration())
    }

    /// Recompute span costs from increments and the total from rated spans
    pub fn update_cost(&mut self) {
        for span in &mut self.timespans {
            span.sum_increments();
        }
        self.cost = self
            .timespans
            .iter()
            .filter(|ts| ts.is_rated())
            .map(|ts| ts.cost)
            .sum();
        self.connect_fee = self.timespans.iter().map(|ts| ts.connect_fee).sum();
    }

    /// Number of billable units across all spans
    pub fn increment_count(&self) -> u64 {
        self.timespans
            .iter()
            .flat_map(|ts| &ts.increments)
            .map(|i| i.compress_factor)
            .sum()
    }

    /// All increment runs in chronological order
    pub fn increments(&self) -> Vec<Increment> {
        self.timespans
            .iter()
            .flat_map(|ts| ts.increments.iter().cloned())
            .collect()
    }

    pub fn strip_increments(&mut self) {
        for span in &mut self.timespans {
            span.increments.clear();
        }
    }
}
