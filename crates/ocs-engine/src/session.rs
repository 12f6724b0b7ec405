//! Debit session
//!
//! Owns the locked snapshots of the accounts touched by one debit: the
//! debited account and the members of its shared groups. Mutations happen on
//! the snapshots and reach the store only on `commit`.

use chrono::Utc;
use ocs_core::error::RatingError;
use ocs_core::models::{Account, SharedGroup};
use ocs_core::traits::CatalogStore;
use ocs_core::RatingResult;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, error, warn};

use crate::locks::{AccountGuards, AccountLocks};

/// Locked account snapshots of one debit
#[derive(Debug)]
pub struct DebitSession {
    owner: String,
    accounts: BTreeMap<String, Account>,
    originals: BTreeMap<String, Account>,
    groups: HashMap<String, SharedGroup>,
    _guards: AccountGuards,
}

/// Shared groups of an account and the union of their members
async fn membership<S: CatalogStore + ?Sized>(
    store: &S,
    account: &Account,
) -> RatingResult<(BTreeSet<String>, HashMap<String, SharedGroup>)> {
    let mut members = BTreeSet::new();
    let mut groups = HashMap::new();
    members.insert(account.id.clone());

    for group_id in account.shared_group_ids() {
        match store.get_shared_group(&group_id).await? {
            Some(group) => {
                members.extend(group.member_ids.iter().cloned());
                groups.insert(group_id, group);
            }
            None => warn!(
                "Shared group {} of account {} not found",
                group_id, account.id
            ),
        }
    }
    Ok((members, groups))
}

impl DebitSession {
    /// Load and lock `owner` with every member of its shared groups
    ///
    /// The member set is read, locked, then read again under the lock; a
    /// changed set releases the locks and starts over, at most `max_retries`
    /// more times.
    ///
    /// # Errors
    ///
    /// - `AccountNotFound` when `owner` does not exist
    /// - `ConcurrentModification` when the member set keeps changing
    /// - storage errors verbatim
    pub async fn open<S: CatalogStore + ?Sized>(
        store: &S,
        locks: &AccountLocks,
        owner: &str,
        max_retries: u32,
    ) -> RatingResult<Self> {
        for attempt in 0..=max_retries {
            let account = store
                .get_account(owner)
                .await?
                .ok_or_else(|| RatingError::AccountNotFound(owner.to_string()))?;
            let (members, _) = membership(store, &account).await?;

            let guards = locks.lock_all(members.iter().cloned()).await;

            let account = store
                .get_account(owner)
                .await?
                .ok_or_else(|| RatingError::AccountNotFound(owner.to_string()))?;
            let (locked_members, groups) = membership(store, &account).await?;
            if locked_members != members {
                warn!(
                    "Shared group members of {} changed while locking (attempt {})",
                    owner,
                    attempt + 1
                );
                drop(guards);
                continue;
            }

            let mut accounts = BTreeMap::new();
            for member in &members {
                if member == owner {
                    continue;
                }
                match store.get_account(member).await? {
                    Some(peer) => {
                        accounts.insert(member.clone(), peer);
                    }
                    None => warn!("Shared group member {} of {} not found", member, owner),
                }
            }
            accounts.insert(owner.to_string(), account);

            debug!(
                "Opened debit session for {} with {} accounts",
                owner,
                accounts.len()
            );
            return Ok(Self {
                owner: owner.to_string(),
                originals: accounts.clone(),
                accounts,
                groups,
                _guards: guards,
            });
        }

        error!("Could not lock a stable member set for {}", owner);
        Err(RatingError::ConcurrentModification(owner.to_string()))
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn owner_account(&self) -> Option<&Account> {
        self.accounts.get(&self.owner)
    }

    pub fn accounts(&self) -> &BTreeMap<String, Account> {
        &self.accounts
    }

    pub fn groups(&self) -> &HashMap<String, SharedGroup> {
        &self.groups
    }

    /// Mutable accounts alongside the groups, for the ledger
    pub fn parts_mut(&mut self) -> (&mut BTreeMap<String, Account>, &HashMap<String, SharedGroup>) {
        (&mut self.accounts, &self.groups)
    }

    /// Write the changed accounts and release the locks
    pub async fn commit<S: CatalogStore + ?Sized>(self, store: &S) -> RatingResult<usize> {
        commit_accounts(store, &self.accounts, &self.originals).await
    }
}

/// Write every account that differs from its original
///
/// A failed write restores the accounts already written, best effort, and
/// returns the write error. Returns the number of accounts written.
pub async fn commit_accounts<S: CatalogStore + ?Sized>(
    store: &S,
    accounts: &BTreeMap<String, Account>,
    originals: &BTreeMap<String, Account>,
) -> RatingResult<usize> {
    let now = Utc::now();
    let mut written: Vec<&str> = Vec::new();

    for (id, account) in accounts {
        if originals.get(id) == Some(account) {
            continue;
        }
        let mut updated = account.clone();
        updated.updated_at = Some(now);

        if let Err(err) = store.set_account(&updated).await {
            error!("Failed to store account {}: {}", id, err);
            for restored in &written {
                if let Some(original) = originals.get(*restored) {
                    if let Err(restore_err) = store.set_account(original).await {
                        warn!("Failed to restore account {}: {}", restored, restore_err);
                    }
                }
            }
            return Err(err);
        }
        written.push(id.as_str());
    }

    debug!("Committed {} accounts", written.len());
    Ok(written.len())
}
