//! Collaborator traits
//!
//! The engine reads catalog data and reads and writes accounts through
//! `CatalogStore`, and evaluates dynamic-option filters through
//! `FilterEvaluator`. Not-found is `Ok(None)`; I/O failures are errors.

use async_trait::async_trait;

use crate::models::{Account, Destination, RatingPlan, RatingProfile, SharedGroup};
use crate::RatingResult;

/// Catalog and account storage
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Find destination by ID
    async fn get_destination(&self, id: &str) -> RatingResult<Option<Destination>>;

    /// Destination IDs containing `prefix`; empty when none
    async fn get_reverse_destination(&self, prefix: &str) -> RatingResult<Vec<String>>;

    /// Find rating plan by ID
    async fn get_rating_plan(&self, id: &str) -> RatingResult<Option<RatingPlan>>;

    /// Find rating profile by `*out:tenant:category:subject` key
    async fn get_rating_profile(&self, key: &str) -> RatingResult<Option<RatingProfile>>;

    /// Find shared group by ID
    async fn get_shared_group(&self, id: &str) -> RatingResult<Option<SharedGroup>>;

    /// Find account by `tenant:account` ID
    async fn get_account(&self, id: &str) -> RatingResult<Option<Account>>;

    /// Persist an account
    async fn set_account(&self, account: &Account) -> RatingResult<()>;
}

/// Opaque filter predicate
#[async_trait]
pub trait FilterEvaluator: Send + Sync {
    /// Check whether `event` passes every filter in `filter_ids`
    async fn pass(
        &self,
        tenant: &str,
        filter_ids: &[String],
        event: &serde_json::Value,
    ) -> RatingResult<bool>;
}

/// Evaluator for deployments without filters: only empty filter lists pass
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFilters;

#[async_trait]
impl FilterEvaluator for NoFilters {
    async fn pass(
        &self,
        _tenant: &str,
        filter_ids: &[String],
        _event: &serde_json::Value,
    ) -> RatingResult<bool> {
        Ok(filter_ids.is_empty())
    }
}
