//! In-memory catalog store
//!
//! Keeps every entity in `parking_lot::RwLock`-guarded maps. Used when the
//! engine is embedded without an external store and as the test fixture store.

use async_trait::async_trait;
use ocs_core::models::{Account, Destination, RatingPlan, RatingProfile, SharedGroup};
use ocs_core::traits::CatalogStore;
use ocs_core::RatingResult;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// In-memory store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    destinations: RwLock<HashMap<String, Destination>>,
    reverse_destinations: RwLock<HashMap<String, Vec<String>>>,
    rating_plans: RwLock<HashMap<String, RatingPlan>>,
    rating_profiles: RwLock<HashMap<String, RatingProfile>>,
    shared_groups: RwLock<HashMap<String, SharedGroup>>,
    accounts: RwLock<HashMap<String, Account>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a destination and reindex its prefixes
    pub fn set_destination(&self, destination: Destination) {
        let mut reverse = self.reverse_destinations.write();
        if let Some(previous) = self.destinations.read().get(&destination.id) {
            for prefix in &previous.prefixes {
                if let Some(ids) = reverse.get_mut(prefix) {
                    ids.retain(|id| id != &destination.id);
                }
            }
        }
        for prefix in &destination.prefixes {
            let ids = reverse.entry(prefix.clone()).or_default();
            if !ids.contains(&destination.id) {
                ids.push(destination.id.clone());
                ids.sort();
            }
        }
        drop(reverse);
        self.destinations
            .write()
            .insert(destination.id.clone(), destination);
    }

    pub fn set_rating_plan(&self, plan: RatingPlan) {
        self.rating_plans.write().insert(plan.id.clone(), plan);
    }

    /// Store a profile with its activations sorted
    pub fn set_rating_profile(&self, mut profile: RatingProfile) {
        profile.sort();
        self.rating_profiles
            .write()
            .insert(profile.id.clone(), profile);
    }

    pub fn set_shared_group(&self, group: SharedGroup) {
        self.shared_groups.write().insert(group.id.clone(), group);
    }

    pub fn put_account(&self, account: Account) {
        self.accounts.write().insert(account.id.clone(), account);
    }

    /// Current copy of an account
    pub fn account(&self, id: &str) -> Option<Account> {
        self.accounts.read().get(id).cloned()
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn get_destination(&self, id: &str) -> RatingResult<Option<Destination>> {
        Ok(self.destinations.read().get(id).cloned())
    }

    async fn get_reverse_destination(&self, prefix: &str) -> RatingResult<Vec<String>> {
        Ok(self
            .reverse_destinations
            .read()
            .get(prefix)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_rating_plan(&self, id: &str) -> RatingResult<Option<RatingPlan>> {
        Ok(self.rating_plans.read().get(id).cloned())
    }

    async fn get_rating_profile(&self, key: &str) -> RatingResult<Option<RatingProfile>> {
        Ok(self.rating_profiles.read().get(key).cloned())
    }

    async fn get_shared_group(&self, id: &str) -> RatingResult<Option<SharedGroup>> {
        Ok(self.shared_groups.read().get(id).cloned())
    }

    async fn get_account(&self, id: &str) -> RatingResult<Option<Account>> {
        Ok(self.accounts.read().get(id).cloned())
    }

    async fn set_account(&self, account: &Account) -> RatingResult<()> {
        debug!("Storing account {}", account.id);
        self.accounts
            .write()
            .insert(account.id.clone(), account.clone());
        Ok(())
    }
}
