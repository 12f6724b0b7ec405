//! OCS Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the OCS rating engine. It includes:
//!
//! - Domain models (Destination, RatingPlan, Account, CallDescriptor, CallCost)
//! - Collaborator traits for the catalog store and the filter evaluator
//! - Unified error handling with stable error codes
//! - Engine configuration

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::{DynamicOpt, EngineConfig, RatingConfig};
pub use error::RatingError;

/// Result type alias using RatingError
pub type RatingResult<T> = Result<T, RatingError>;

/// Meta identifiers shared by the catalog and the engine
pub mod consts {
    /// Wildcard subject, destination or tenant
    pub const ANY: &str = "*any";

    /// Direction prefix of every rating profile key
    pub const OUTBOUND: &str = "*out";

    /// ID of the monetary balance that receives debt
    pub const DEFAULT_BALANCE_ID: &str = "*default";

    /// Rating subjects with this prefix price unit consumption at zero
    pub const ZERO_RATING_SUBJECT_PREFIX: &str = "*zero";

    /// Separator used in account and profile keys
    pub const KEY_SEPARATOR: char = ':';
}
