//! Domain models for the rating engine
//!
//! Catalog data (destinations, timings, rates, plans, profiles), ledger data
//! (accounts, balances, shared groups) and the per-call descriptor and
//! cost breakdown.

pub mod account;
pub mod cost;
pub mod descriptor;
pub mod destination;
pub mod duration;
pub mod plan;
pub mod rate;
pub mod timing;

pub use account::{
    Account, AccountSummary, Balance, BalanceSummary, BalanceType, SharedGroup,
    SharingParameters, SharingStrategy,
};
pub use cost::{CallCost, DebitInfo, Increment, MonetaryInfo, TimeSpan, UnitInfo};
pub use descriptor::{CallDescriptor, ToR};
pub use destination::Destination;
pub use plan::{
    DestinationRate, RateInterval, RatingActivation, RatingInfo, RatingPlan, RatingProfile,
};
pub use rate::{MaxCostStrategy, Rate, RateTier, RoundingMethod};
pub use timing::RITiming;
