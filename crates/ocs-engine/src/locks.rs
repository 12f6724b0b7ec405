//! Keyed account locks
//!
//! One async mutex per account ID, created on first use and kept for the
//! lifetime of the registry. Multi-account operations lock in ascending ID
//! order.

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Registry of per-account locks
#[derive(Debug, Default)]
pub struct AccountLocks {
    registry: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held locks of a set of accounts, released on drop
#[derive(Debug)]
pub struct AccountGuards {
    ids: Vec<String>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl AccountGuards {
    /// Locked account IDs in acquisition order
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn covers(&self, id: &str) -> bool {
        self.ids.binary_search_by(|held| held.as_str().cmp(id)).is_ok()
    }
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, id: &str) -> Arc<AsyncMutex<()>> {
        let mut registry = self.registry.lock();
        registry
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Lock every account in `ids`, sorted and deduplicated
    pub async fn lock_all<I, S>(&self, ids: I) -> AccountGuards
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ordered: BTreeSet<String> = ids.into_iter().map(Into::into).collect();
        let mut guards = Vec::with_capacity(ordered.len());
        for id in &ordered {
            guards.push(self.lock_for(id).lock_owned().await);
        }
        debug!("Locked accounts {:?}", ordered);
        AccountGuards {
            ids: ordered.into_iter().collect(),
            _guards: guards,
        }
    }

    /// Number of accounts ever locked
    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_lock_all_sorts_and_dedups() {
        let locks = AccountLocks::new();
        let guards = locks.lock_all(["vdf:rif", "vdf:dan", "vdf:rif"]).await;
        assert_eq!(guards.ids(), ["vdf:dan".to_string(), "vdf:rif".to_string()]);
        assert!(guards.covers("vdf:rif"));
        assert!(!guards.covers("vdf:minu"));
        drop(guards);

        assert_eq!(locks.len(), 2);
        let _again = locks.lock_all(["vdf:rif"]).await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_same_account_is_serialized() {
        let locks = Arc::new(AccountLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let inside = Arc::clone(&inside);
            handles.push(tokio::spawn(async move {
                let _guards = locks.lock_all(["vdf:rif"]).await;
                let now = inside.fetch_add(1, Ordering::SeqCst);
                assert_eq!(now, 0);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_overlapping_sets_do_not_deadlock() {
        let locks = Arc::new(AccountLocks::new());
        let a = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                for _ in 0..20 {
                    let _g = locks.lock_all(["vdf:a", "vdf:b"]).await;
                    tokio::task::yield_now().await;
                }
            })
        };
        let b = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                for _ in 0..20 {
                    let _g = locks.lock_all(["vdf:b", "vdf:a"]).await;
                    tokio::task::yield_now().await;
                }
            })
        };
        tokio::time::timeout(Duration::from_secs(5), async {
            a.await.unwrap();
            b.await.unwrap();
        })
        .await
        .unwrap();
    }
}
