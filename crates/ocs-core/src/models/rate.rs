//! Rate model
//!
//! A rate holds the connect fee, the rounding policy, the cost cap and the
//! ordered price tiers applied along the session's usage.

use chrono::Duration;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::duration;
use crate::error::RatingError;
use crate::RatingResult;

/// Rounding applied to a span cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RoundingMethod {
    #[serde(rename = "*up")]
    Up,
    #[serde(rename = "*down")]
    Down,
    #[default]
    #[serde(rename = "*middle")]
    Middle,
}

impl RoundingMethod {
    /// Round `value` to `decimals` places
    pub fn round(self, value: Decimal, decimals: u32) -> Decimal {
        let strategy = match self {
            RoundingMethod::Up => RoundingStrategy::ToPositiveInfinity,
            RoundingMethod::Down => RoundingStrategy::ToNegativeInfinity,
            RoundingMethod::Middle => RoundingStrategy::MidpointAwayFromZero,
        };
        value.round_dp_with_strategy(decimals, strategy).normalize()
    }
}

/// What happens once a call reaches `max_cost`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxCostStrategy {
    /// Usage continues without further charge
    #[serde(rename = "*free")]
    Free,
    /// Usage is cut at the cap
    #[serde(rename = "*disconnect")]
    Disconnect,
}

/// One price tier, applying from `group_interval_start` of session usage on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTier {
    #[serde(with = "duration")]
    pub group_interval_start: Duration,

    /// Price per `rate_unit`
    pub value: Decimal,

    /// Billing granularity
    #[serde(with = "duration")]
    pub rate_increment: Duration,

    #[serde(with = "duration")]
    pub rate_unit: Duration,
}

impl RateTier {
    pub fn new(
        group_interval_start: Duration,
        value: Decimal,
        rate_increment: Duration,
        rate_unit: Duration,
    ) -> Self {
        Self {
            group_interval_start,
            value,
            rate_increment,
            rate_unit,
        }
    }

    /// Price per nanosecond of usage
    pub fn price_per_nanosecond(&self) -> Decimal {
        let unit = duration::nanos(self.rate_unit);
        if unit <= 0 {
            return Decimal::ZERO;
        }
        self.value / Decimal::from(unit)
    }
}

/// Rate entity
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rate {
    #[serde(default)]
    pub connect_fee: Decimal,

    #[serde(default)]
    pub rounding_method: RoundingMethod,

    #[serde(default)]
    pub rounding_decimals: u32,

    /// Cap on the cumulative call cost; zero disables it
    #[serde(default)]
    pub max_cost: Decimal,

    #[serde(default)]
    pub max_cost_strategy: Option<MaxCostStrategy>,

    /// Tiers ordered by `group_interval_start`
    pub tiers: Vec<RateTier>,
}

impl Rate {
    /// Tier governing usage at `offset`
    pub fn tier_at(&self, offset: Duration) -> Option<&RateTier> {
        self.tiers
            .iter()
            .take_while(|tier| tier.group_interval_start <= offset)
            .last()
            .or_else(|| self.tiers.first())
    }

    /// First tier boundary strictly after `offset`
    pub fn next_tier_start(&self, offset: Duration) -> Option<Duration> {
        self.tiers
            .iter()
            .map(|tier| tier.group_interval_start)
            .find(|start| *start > offset)
    }

    /// Round a cost with this rate's policy
    pub fn round(&self, value: Decimal) -> Decimal {
        self.rounding_method.round(value, self.rounding_decimals)
    }

    /// Active cap and the strategy applied when reaching it
    pub fn cost_cap(&self) -> Option<(Decimal, MaxCostStrategy)> {
        match self.max_cost_strategy {
            Some(strategy) if self.max_cost > Decimal::ZERO => Some((self.max_cost, strategy)),
            _ => None,
        }
    }

    /// Check the structural rules the calculator relies on
    ///
    /// # Errors
    ///
    /// Returns `RatingError::InvalidRatingPlan` when there are no tiers, a tier
    /// has a non-positive increment or unit, or tiers are out of order.
    pub fn validate(&self, rating_id: &str) -> RatingResult<()> {
        if self.tiers.is_empty() {
            return Err(RatingError::InvalidRatingPlan(format!(
                "rating {} has no rate tiers",
                rating_id
            )));
        }
        for tier in &self.tiers {
            if tier.rate_increment <= Duration::zero() || tier.rate_unit <= Duration::zero() {
                return Err(RatingError::InvalidRatingPlan(format!(
                    "rating {} has a tier with non-positive increment or unit",
                    rating_id
                )));
            }
        }
        let ordered = self
            .tiers
            .windows(2)
            .all(|pair| pair[0].group_interval_start < pair[1].group_interval_start);
        if !ordered {
            return Err(RatingError::InvalidRatingPlan(format!(
                "rating {} tiers are not ordered by group interval start",
                rating_id
            )));
        }
        Ok(())
    }
}
