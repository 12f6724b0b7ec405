//! Unified error handling for the rating engine
//!
//! Every failure surfaced by the catalog, the resolver, the calculator or the
//! ledger is expressed as a `RatingError`. Callers translate the stable
//! `error_code()` into protocol-specific denial or disconnect codes.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::CallCost;

/// Main rating error type
#[derive(Error, Debug)]
pub enum RatingError {
    // ==================== Not Found Errors ====================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Part of the call could not be matched to any rate interval. The
    /// resolved portion is priced and returned in `partial`.
    #[error("Rating plan not found for time {at}")]
    RatingPlanNotFound {
        at: DateTime<Utc>,
        partial: Option<Box<CallCost>>,
    },

    // ==================== Business Errors ====================
    #[error("Insufficient credit on account {0}")]
    InsufficientCredit(String),

    #[error("Unauthorized destination: {0}")]
    UnauthorizedDestination(String),

    #[error("Account disabled: {0}")]
    AccountDisabled(String),

    // ==================== Integrity Errors ====================
    #[error("Max fallback recursion depth reached for {0}")]
    MaxRecursionDepth(String),

    #[error("Invalid rating plan: {0}")]
    InvalidRatingPlan(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    // ==================== Storage Errors ====================
    #[error("Store error: {0}")]
    Store(String),

    #[error("Store connection failed: {0}")]
    StoreConnection(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // ==================== Internal Errors ====================
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RatingError {
    /// Returns the stable error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            RatingError::NotFound(_) => "not_found",
            RatingError::AccountNotFound(_) => "account_not_found",
            RatingError::RatingPlanNotFound { .. } => "rating_plan_not_found",
            RatingError::InsufficientCredit(_) => "insufficient_credit",
            RatingError::UnauthorizedDestination(_) => "unauthorized_destination",
            RatingError::AccountDisabled(_) => "account_disabled",
            RatingError::MaxRecursionDepth(_) => "max_recursion_depth",
            RatingError::InvalidRatingPlan(_) => "invalid_rating_plan",
            RatingError::Validation(_) => "validation_error",
            RatingError::InvalidInput(_) => "invalid_input",
            RatingError::ConcurrentModification(_) => "concurrent_modification",
            RatingError::Store(_) => "store_error",
            RatingError::StoreConnection(_) => "store_connection_error",
            RatingError::Serialization(_) => "serialization_error",
            RatingError::Config(_) => "config_error",
        }
    }

    /// Unknown subject, destination, rating plan or account
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RatingError::NotFound(_)
                | RatingError::AccountNotFound(_)
                | RatingError::RatingPlanNotFound { .. }
        )
    }

    /// Expected business outcomes that callers turn into a user-visible denial
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            RatingError::InsufficientCredit(_)
                | RatingError::UnauthorizedDestination(_)
                | RatingError::AccountDisabled(_)
        )
    }

    /// Failures raised by the storage collaborator
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            RatingError::Store(_) | RatingError::StoreConnection(_) | RatingError::Serialization(_)
        )
    }

    /// Priced portion of a call that hit an unrated gap
    pub fn partial_cost(&self) -> Option<&CallCost> {
        match self {
            RatingError::RatingPlanNotFound { partial, .. } => partial.as_deref(),
            _ => None,
        }
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for RatingError {
    fn from(err: serde_json::Error) -> Self {
        RatingError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for RatingError {
    fn from(err: config::ConfigError) -> Self {
        RatingError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for RatingError {
    fn from(err: validator::ValidationErrors) -> Self {
        RatingError::Validation(err.to_string())
    }
}
