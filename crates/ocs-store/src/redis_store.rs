//! Redis-backed catalog store
//!
//! Entities are stored as JSON strings under the keys built in `keys`.
//! Reverse destinations are JSON arrays of destination IDs.

use async_trait::async_trait;
use ocs_core::error::RatingError;
use ocs_core::models::{Account, Destination, RatingPlan, RatingProfile, SharedGroup};
use ocs_core::traits::CatalogStore;
use ocs_core::RatingResult;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisError};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, warn};

use crate::keys;

/// Redis store with a multiplexed connection manager
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    /// TTL for written accounts in seconds, 0 keeps them forever
    account_ttl_secs: u64,
}

impl RedisStore {
    /// Connect to Redis
    ///
    /// # Errors
    ///
    /// Returns `RatingError::StoreConnection` if the URL is invalid or the
    /// connection fails
    pub async fn new(url: &str, account_ttl_secs: u64) -> RatingResult<Self> {
        debug!("Connecting to Redis at {}", url);

        let client = Client::open(url).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            RatingError::StoreConnection(format!("Invalid Redis URL: {}", e))
        })?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to establish Redis connection: {}", e);
            RatingError::StoreConnection(format!("Connection failed: {}", e))
        })?;

        Ok(Self {
            manager,
            account_ttl_secs,
        })
    }

    /// Store a destination and reindex its prefixes
    ///
    /// Prefixes the previous version of the destination had and this one
    /// lacks stop pointing at it.
    pub async fn set_destination(&self, destination: &Destination) -> RatingResult<()> {
        let key = keys::destination_key(&destination.id);
        let previous: Option<Destination> = self.fetch(&key).await?;
        self.put(&key, destination, 0).await?;

        let stale = previous
            .iter()
            .flat_map(|previous| &previous.prefixes)
            .filter(|prefix| !destination.prefixes.contains(prefix));
        for prefix in stale {
            let key = keys::reverse_destination_key(prefix);
            let mut ids: Vec<String> = self.fetch(&key).await?.unwrap_or_default();
            let before = ids.len();
            ids.retain(|id| id != &destination.id);
            if ids.len() != before {
                debug!("Dropping {} from reverse destination {}", destination.id, prefix);
                self.put(&key, &ids, 0).await?;
            }
        }

        for prefix in &destination.prefixes {
            let key = keys::reverse_destination_key(prefix);
            let mut ids: Vec<String> = self.fetch(&key).await?.unwrap_or_default();
            if !ids.contains(&destination.id) {
                ids.push(destination.id.clone());
                ids.sort();
                self.put(&key, &ids, 0).await?;
            }
        }
        Ok(())
    }

    pub async fn set_rating_plan(&self, plan: &RatingPlan) -> RatingResult<()> {
        self.put(&keys::rating_plan_key(&plan.id), plan, 0).await
    }

    pub async fn set_rating_profile(&self, profile: &RatingProfile) -> RatingResult<()> {
        let mut sorted = profile.clone();
        sorted.sort();
        self.put(&keys::rating_profile_key(&sorted.id), &sorted, 0)
            .await
    }

    pub async fn set_shared_group(&self, group: &SharedGroup) -> RatingResult<()> {
        self.put(&keys::shared_group_key(&group.id), group, 0).await
    }

    async fn fetch<T: DeserializeOwned>(&self, key: &str) -> RatingResult<Option<T>> {
        debug!("GET {}", key);
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(key).await.map_err(Self::map_redis_error)?;

        raw.map(|json| {
            serde_json::from_str::<T>(&json).map_err(|e| {
                error!("Failed to deserialize value for key {}: {}", key, e);
                RatingError::Serialization(format!("Deserialization failed: {}", e))
            })
        })
        .transpose()
    }

    async fn put<T: Serialize + Sync>(&self, key: &str, value: &T, ttl_secs: u64) -> RatingResult<()> {
        debug!("SET {} (TTL: {}s)", key, ttl_secs);
        let mut conn = self.manager.clone();
        let json = serde_json::to_string(value).map_err(|e| {
            error!("Failed to serialize value for key {}: {}", key, e);
            RatingError::Serialization(format!("Serialization failed: {}", e))
        })?;

        let result: Result<(), RedisError> = if ttl_secs > 0 {
            conn.set_ex(key, json, ttl_secs).await
        } else {
            conn.set(key, json).await
        };
        result.map_err(Self::map_redis_error)
    }

    /// Convert RedisError to RatingError
    fn map_redis_error(err: RedisError) -> RatingError {
        match err.kind() {
            redis::ErrorKind::IoError => {
                error!("Redis I/O error: {}", err);
                RatingError::StoreConnection(format!("I/O error: {}", err))
            }
            redis::ErrorKind::TypeError => {
                warn!("Redis type error: {}", err);
                RatingError::Store(format!("Type mismatch: {}", err))
            }
            _ => {
                error!("Redis error: {}", err);
                RatingError::Store(err.to_string())
            }
        }
    }
}

#[async_trait]
impl CatalogStore for RedisStore {
    async fn get_destination(&self, id: &str) -> RatingResult<Option<Destination>> {
        self.fetch(&keys::destination_key(id)).await
    }

    async fn get_reverse_destination(&self, prefix: &str) -> RatingResult<Vec<String>> {
        Ok(self
            .fetch(&keys::reverse_destination_key(prefix))
            .await?
            .unwrap_or_default())
    }

    async fn get_rating_plan(&self, id: &str) -> RatingResult<Option<RatingPlan>> {
        self.fetch(&keys::rating_plan_key(id)).await
    }

    async fn get_rating_profile(&self, key: &str) -> RatingResult<Option<RatingProfile>> {
        self.fetch(&keys::rating_profile_key(key)).await
    }

    async fn get_shared_group(&self, id: &str) -> RatingResult<Option<SharedGroup>> {
        self.fetch(&keys::shared_group_key(id)).await
    }

    async fn get_account(&self, id: &str) -> RatingResult<Option<Account>> {
        self.fetch(&keys::account_key(id)).await
    }

    async fn set_account(&self, account: &Account) -> RatingResult<()> {
        self.put(&keys::account_key(&account.id), account, self.account_ttl_secs)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocs_core::models::{Balance, BalanceType};
    use rust_decimal_macros::dec;

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_account_roundtrip() {
        let store = RedisStore::new("redis://127.0.0.1:6379", 60).await.unwrap();
        let account = Account::new("test", "redis_roundtrip")
            .with_balance(BalanceType::Monetary, Balance::new("m1", dec!(10)));

        store.set_account(&account).await.unwrap();
        assert_eq!(store.get_account(&account.id).await.unwrap(), Some(account));
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_reverse_destination_index() {
        let store = RedisStore::new("redis://127.0.0.1:6379", 0).await.unwrap();
        store
            .set_destination(&Destination::new("TEST_DST", &["99901"]))
            .await
            .unwrap();

        let ids = store.get_reverse_destination("99901").await.unwrap();
        assert!(ids.contains(&"TEST_DST".to_string()));
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_reverse_destination_follows_updates() {
        let store = RedisStore::new("redis://127.0.0.1:6379", 0).await.unwrap();
        store
            .set_destination(&Destination::new("TEST_MOVE", &["99911", "99912"]))
            .await
            .unwrap();
        store
            .set_destination(&Destination::new("TEST_MOVE", &["99912", "99913"]))
            .await
            .unwrap();

        let moved = "TEST_MOVE".to_string();
        assert!(!store.get_reverse_destination("99911").await.unwrap().contains(&moved));
        assert!(store.get_reverse_destination("99912").await.unwrap().contains(&moved));
        assert!(store.get_reverse_destination("99913").await.unwrap().contains(&moved));
    }

    #[tokio::test]
    async fn test_invalid_url_is_connection_error() {
        let err = RedisStore::new("not-a-url", 0).await.err().unwrap();
        assert_eq!(err.error_code(), "store_connection_error");
    }
}
