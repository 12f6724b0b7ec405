//! OCS rating engine
//!
//! Prices telecom usage (voice, data, SMS) against time-of-day rating plans
//! and debits it from prioritized, optionally shared account balances.
//!
//! The pipeline for one call descriptor is:
//!
//! 1. `resolver` - rating profile, activation windows and destination match
//! 2. `splitter` - contiguous time spans priced by a single interval and tier
//! 3. `calculator` - span costs and the increments to debit
//! 4. `ledger` - balance selection and debit inside a locked `session`
//!
//! `RatingEngine` ties the steps together behind `get_cost`, `debit`,
//! `max_debit`, `get_max_session_duration` and `refund_increments`.

pub mod calculator;
pub mod dynopts;
pub mod engine;
pub mod ledger;
pub mod locks;
pub mod resolver;
pub mod session;
pub mod splitter;
pub mod telemetry;

pub use engine::RatingEngine;
pub use resolver::{RatingResolver, Resolution};

/// Keys of per-request and dynamic options
pub mod constants {
    /// Decimals used when rounding the call total
    pub const OPT_ROUNDING_DECIMALS: &str = "*roundingDecimals";

    /// Depth limit when following fallback rating subjects
    pub const OPT_MAX_RECURSION_DEPTH: &str = "*maxRecursionDepth";
}
