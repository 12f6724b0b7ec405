//! Rating plan and rating profile models
//!
//! A rating plan binds destinations to weighted (timing, rate) pairs. A rating
//! profile assigns plans to a subject over time.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use super::rate::Rate;
use super::timing::RITiming;
use crate::consts::{KEY_SEPARATOR, OUTBOUND};
use crate::error::RatingError;
use crate::RatingResult;

/// Weighted (timing, rate) reference for one destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationRate {
    pub timing: String,
    pub rating: String,
    #[serde(default)]
    pub weight: Decimal,
}

/// Rating plan entity
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RatingPlan {
    pub id: String,

    #[serde(default)]
    pub timings: HashMap<String, RITiming>,

    #[serde(default)]
    pub ratings: HashMap<String, Rate>,

    /// Destination ID to candidate rates; `*any` is the wildcard entry
    #[serde(default)]
    pub destination_rates: HashMap<String, Vec<DestinationRate>>,
}

impl RatingPlan {
    pub fn has_destination(&self, destination_id: &str) -> bool {
        self.destination_rates.contains_key(destination_id)
    }

    /// Resolve the rate intervals of a destination, best first
    ///
    /// # Errors
    ///
    /// Returns `RatingError::InvalidRatingPlan` when an entry references an
    /// unknown timing or rating, or a referenced rate is malformed.
    pub fn rate_intervals(&self, destination_id: &str) -> RatingResult<Vec<RateInterval>> {
        let Some(entries) = self.destination_rates.get(destination_id) else {
            return Ok(Vec::new());
        };

        let mut intervals = entries
            .iter()
            .map(|entry| {
                let timing = self.timings.get(&entry.timing).ok_or_else(|| {
                    RatingError::InvalidRatingPlan(format!(
                        "plan {} references unknown timing {}",
                        self.id, entry.timing
                    ))
                })?;
                let rating = self.ratings.get(&entry.rating).ok_or_else(|| {
                    RatingError::InvalidRatingPlan(format!(
                        "plan {} references unknown rating {}",
                        self.id, entry.rating
                    ))
                })?;
                rating.validate(&entry.rating)?;
                Ok(RateInterval {
                    timing: timing.clone(),
                    rating: rating.clone(),
                    weight: entry.weight,
                })
            })
            .collect::<RatingResult<Vec<_>>>()?;

        intervals.sort_by(RateInterval::priority_cmp);
        Ok(intervals)
    }
}

/// A resolved (timing, rate, weight) triple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateInterval {
    pub timing: RITiming,
    pub rating: Rate,
    pub weight: Decimal,
}

impl RateInterval {
    /// Ordering with the preferred interval first: higher weight, then more
    /// specific timing, then the later daily start
    pub fn priority_cmp(a: &RateInterval, b: &RateInterval) -> Ordering {
        b.weight
            .cmp(&a.weight)
            .then_with(|| b.timing.specificity().cmp(&a.timing.specificity()))
            .then_with(|| b.timing.start_time.cmp(&a.timing.start_time))
    }
}

/// One time-scoped assignment of a plan inside a profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingActivation {
    pub activation_time: DateTime<Utc>,
    pub rating_plan_id: String,

    /// Profile keys tried when the plan does not cover the destination
    #[serde(default)]
    pub fallback_keys: Vec<String>,
}

/// Rating profile entity, keyed `*out:tenant:category:subject`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingProfile {
    pub id: String,

    /// Activations ordered by `activation_time` ascending
    pub activations: Vec<RatingActivation>,
}

impl RatingProfile {
    /// Build the storage key of a profile
    pub fn key(tenant: &str, category: &str, subject: &str) -> String {
        format!(
            "{}{sep}{}{sep}{}{sep}{}",
            OUTBOUND,
            tenant,
            category,
            subject,
            sep = KEY_SEPARATOR
        )
    }

    /// Build a fallback key for a subject of the same tenant and category
    pub fn fallback_key(&self, subject: &str) -> String {
        match self.id.rsplit_once(KEY_SEPARATOR) {
            Some((head, _)) => format!("{}{}{}", head, KEY_SEPARATOR, subject),
            None => subject.to_string(),
        }
    }

    /// Sort activations chronologically
    pub fn sort(&mut self) {
        self.activations.sort_by_key(|a| a.activation_time);
    }

    /// The latest activation at or before `at`
    pub fn activation_at(&self, at: DateTime<Utc>) -> Option<&RatingActivation> {
        self.activations
            .iter()
            .take_while(|a| a.activation_time <= at)
            .last()
    }

    /// Split `[start, end)` into the windows governed by each activation
    ///
    /// Time before the first activation is left uncovered. A zero-length call
    /// yields one empty window for the activation in force at `start`.
    pub fn windows(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<(&RatingActivation, DateTime<Utc>, DateTime<Utc>)> {
        if start == end {
            return self
                .activation_at(start)
                .map(|activation| vec![(activation, start, start)])
                .unwrap_or_default();
        }

        let mut windows = Vec::new();
        for (i, activation) in self.activations.iter().enumerate() {
            let next = self.activations.get(i + 1).map(|a| a.activation_time);
            let window_start = activation.activation_time.max(start);
            let window_end = next.map_or(end, |n| n.min(end));
            if window_start < window_end {
                windows.push((activation, window_start, window_end));
            }
        }
        windows
    }
}

/// Resolution result for one activation window of a call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingInfo {
    /// Key of the profile that priced the window
    pub matched_subject: String,
    pub matched_prefix: String,
    pub matched_dest_id: String,
    pub rating_plan_id: String,
    pub activation_time: DateTime<Utc>,

    /// Candidate intervals, best first
    pub rate_intervals: Vec<RateInterval>,

    pub fallback_keys: Vec<String>,

    /// Part of the call governed by this activation
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

impl RatingInfo {
    /// Best interval whose timing covers `at`
    pub fn interval_at(&self, at: DateTime<Utc>) -> Option<&RateInterval> {
        self.rate_intervals
            .iter()
            .find(|interval| interval.timing.is_active_at(at))
    }

    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.window_start <= at && (at < self.window_end || self.window_start == self.window_end)
    }
}
