//! Rating engine
//!
//! Entry points of the engine. Each operation takes a `CallDescriptor`,
//! resolves and prices the call against the catalog, and for the debit
//! paths pays it from the locked accounts of a `DebitSession`.

use chrono::Duration;
use ocs_core::consts::ZERO_RATING_SUBJECT_PREFIX;
use ocs_core::error::RatingError;
use ocs_core::models::{Account, AccountSummary, BalanceType, CallCost, CallDescriptor};
use ocs_core::traits::{CatalogStore, FilterEvaluator, NoFilters};
use ocs_core::{RatingConfig, RatingResult};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::calculator;
use crate::constants::{OPT_MAX_RECURSION_DEPTH, OPT_ROUNDING_DECIMALS};
use crate::dynopts::resolve_opt;
use crate::ledger::{self, Ledger, LedgerContext, Repricer};
use crate::locks::AccountLocks;
use crate::resolver::{RatingResolver, Resolution};
use crate::session::{commit_accounts, DebitSession};
use crate::splitter;

/// Per-call values of the dynamic settings
#[derive(Debug, Clone, Copy)]
struct CallSettings {
    rounding_decimals: u32,
    max_recursion_depth: u32,
}

/// Rating and debit engine
pub struct RatingEngine<S, F = NoFilters>
where
    S: CatalogStore + ?Sized,
    F: FilterEvaluator + ?Sized,
{
    store: Arc<S>,
    filters: Arc<F>,
    config: RatingConfig,
    locks: AccountLocks,
}

impl<S> RatingEngine<S, NoFilters>
where
    S: CatalogStore + ?Sized,
{
    /// Engine without dynamic-option filters
    pub fn with_store(store: Arc<S>, config: RatingConfig) -> Self {
        Self::new(store, Arc::new(NoFilters), config)
    }
}

impl<S, F> RatingEngine<S, F>
where
    S: CatalogStore + ?Sized,
    F: FilterEvaluator + ?Sized,
{
    pub fn new(store: Arc<S>, filters: Arc<F>, config: RatingConfig) -> Self {
        Self {
            store,
            filters,
            config,
            locks: AccountLocks::new(),
        }
    }

    pub fn store(&self) -> &S {
        self.store.as_ref()
    }

    pub fn config(&self) -> &RatingConfig {
        &self.config
    }

    async fn settings(&self, cd: &CallDescriptor) -> RatingResult<CallSettings> {
        let event = serde_json::to_value(cd)?;
        let rounding_decimals = resolve_opt(
            self.filters.as_ref(),
            &cd.opts,
            OPT_ROUNDING_DECIMALS,
            &cd.tenant,
            &self.config.rounding_decimals_opts,
            &event,
            self.config.rounding_decimals,
        )
        .await?;
        let max_recursion_depth = resolve_opt(
            self.filters.as_ref(),
            &cd.opts,
            OPT_MAX_RECURSION_DEPTH,
            &cd.tenant,
            &self.config.max_recursion_depth_opts,
            &event,
            self.config.max_recursion_depth,
        )
        .await?;
        Ok(CallSettings {
            rounding_decimals,
            max_recursion_depth,
        })
    }

    fn resolver(&self, settings: &CallSettings) -> RatingResolver<'_, S> {
        RatingResolver::new(
            self.store.as_ref(),
            self.config.min_prefix_match,
            settings.max_recursion_depth,
        )
    }

    /// Resolve, split and price a call with increments
    ///
    /// `Ok(None)` when no rating profile applies. A gap in the rate coverage
    /// is `RatingPlanNotFound` carrying the priced part of the call.
    async fn rate(
        &self,
        cd: &CallDescriptor,
        settings: &CallSettings,
    ) -> RatingResult<Option<CallCost>> {
        let infos = match self.resolver(settings).resolve(cd).await? {
            Resolution::Unrated => return Ok(None),
            Resolution::Rated(infos) => infos,
        };
        let split = splitter::split(cd, &infos);
        let cc = calculator::price(cd, split.spans, true)?;
        match split.gap {
            Some(at) => {
                warn!(
                    "No rating plan covers {} for {} to {}",
                    at, cd.subject, cd.destination
                );
                Err(RatingError::RatingPlanNotFound {
                    at,
                    partial: Some(Box::new(cc)),
                })
            }
            None => Ok(Some(cc)),
        }
    }

    /// Rate for a usage estimate, keeping the priced part before a coverage gap
    ///
    /// A gap at the very start of the call stays `RatingPlanNotFound`.
    async fn rate_for_estimate(
        &self,
        cd: &CallDescriptor,
        settings: &CallSettings,
    ) -> RatingResult<CallCost> {
        match self.rate(cd, settings).await {
            Ok(Some(cc)) => Ok(cc),
            Ok(None) => Err(unrated_subject(cd)),
            Err(RatingError::RatingPlanNotFound {
                at,
                partial: Some(mut cc),
            }) => {
                if cc.timespans.first().map_or(true, |span| !span.is_rated()) {
                    cc.strip_increments();
                    return Err(RatingError::RatingPlanNotFound {
                        at,
                        partial: Some(cc),
                    });
                }
                Ok(*cc)
            }
            Err(err) => Err(err),
        }
    }

    async fn rate_for_debit(
        &self,
        cd: &CallDescriptor,
        settings: &CallSettings,
    ) -> RatingResult<CallCost> {
        self.rate(cd, settings)
            .await?
            .ok_or_else(|| unrated_subject(cd))
    }

    async fn open_session(&self, cd: &CallDescriptor) -> RatingResult<DebitSession> {
        let session = DebitSession::open(
            self.store.as_ref(),
            &self.locks,
            &cd.account_key(),
            self.config.max_lock_retries,
        )
        .await?;
        if session.owner_account().map_or(false, |account| account.disabled) {
            warn!("Account {} is disabled", session.owner());
            return Err(RatingError::AccountDisabled(session.owner().to_string()));
        }
        Ok(session)
    }

    /// Ledger inputs: destination IDs and the rates of unit rating subjects
    async fn ledger_context(
        &self,
        cd: &CallDescriptor,
        session: &DebitSession,
        settings: &CallSettings,
    ) -> RatingResult<LedgerContext> {
        let resolver = self.resolver(settings);
        let destination_ids = resolver.destination_ids(&cd.destination).await?;

        let subjects: BTreeSet<String> = session
            .accounts()
            .values()
            .flat_map(|account| account.balances(BalanceType::from(cd.tor)))
            .filter_map(|balance| balance.rating_subject.clone())
            .filter(|subject| !subject.starts_with(ZERO_RATING_SUBJECT_PREFIX))
            .collect();

        let mut repricer = Repricer::new(cd.time_start, cd.usage_offset());
        for subject in subjects {
            match resolver.resolve(&cd.with_subject(&subject)).await {
                Ok(Resolution::Rated(infos)) => repricer.insert(subject, infos),
                Ok(Resolution::Unrated) => debug!("Rating subject {} has no rates", subject),
                Err(err) if err.is_business() || err.is_not_found() => {
                    debug!("Rating subject {} cannot price the call: {}", subject, err)
                }
                Err(err) => return Err(err),
            }
        }

        Ok(LedgerContext {
            owner: session.owner().to_string(),
            tor: cd.tor,
            at: cd.time_start,
            destination_ids,
            repricer,
        })
    }

    /// Usage the session accounts can pay, tried on copies
    fn affordable_usage(
        session: &DebitSession,
        ctx: &LedgerContext,
        cc: &CallCost,
        cd: &CallDescriptor,
    ) -> RatingResult<Duration> {
        let allow_negative = session
            .owner_account()
            .map_or(false, |account| account.allow_negative);
        let mut scratch = session.accounts().clone();
        let mut trial = cc.clone();
        let mut ledger = Ledger::new(&mut scratch, session.groups(), ctx);
        ledger.max_usage(&mut trial, cd, allow_negative)
    }

    async fn debit_in_session(
        &self,
        cd: &CallDescriptor,
        mut cc: CallCost,
        mut session: DebitSession,
        ctx: &LedgerContext,
        settings: &CallSettings,
    ) -> RatingResult<CallCost> {
        {
            let (accounts, groups) = session.parts_mut();
            let mut ledger = Ledger::new(accounts, groups, ctx);
            ledger.debit_call(&mut cc, cd.deny_negative_account)?;
            if cd.perform_rounding {
                ledger.refund_rounding(&mut cc, settings.rounding_decimals);
            }
        }
        cc.account_summary = session.owner_account().map(Account::summary);

        if cd.dry_run {
            debug!("Dry run for {}, accounts not stored", session.owner());
        } else {
            session.commit(self.store.as_ref()).await?;
        }
        info!(
            "Debited {} from {} for {}",
            cc.cost,
            cd.account_key(),
            cd.destination
        );
        Ok(cc)
    }

    /// Price a call without touching any account
    ///
    /// A subject without any rating profile yields a cost of `-1` and no
    /// spans. An uncovered destination is `NotFound`.
    #[instrument(skip(self, cd), fields(tenant = %cd.tenant, subject = %cd.subject, destination = %cd.destination))]
    pub async fn get_cost(&self, cd: &CallDescriptor) -> RatingResult<CallCost> {
        cd.check()?;
        let settings = self.settings(cd).await?;

        let mut cc = match self.rate(cd, &settings).await {
            Ok(Some(cc)) => cc,
            Ok(None) => {
                debug!("No rating profile for subject {}", cd.subject);
                return Ok(CallCost::unrated(cd));
            }
            Err(RatingError::UnauthorizedDestination(destination)) => {
                return Err(RatingError::NotFound(format!("destination {}", destination)));
            }
            Err(RatingError::RatingPlanNotFound { at, partial }) => {
                let partial = partial.map(|mut cc| {
                    cc.strip_increments();
                    cc
                });
                return Err(RatingError::RatingPlanNotFound { at, partial });
            }
            Err(err) => return Err(err),
        };

        if cd.perform_rounding {
            calculator::round_total(&mut cc, settings.rounding_decimals, |_, _| {});
        }
        cc.strip_increments();
        debug!("Call cost {} over {} spans", cc.cost, cc.timespans.len());
        Ok(cc)
    }

    /// Price a call and debit it in full, creating debt when allowed
    #[instrument(skip(self, cd), fields(account = %cd.account_key(), destination = %cd.destination))]
    pub async fn debit(&self, cd: &CallDescriptor) -> RatingResult<CallCost> {
        cd.check()?;
        let settings = self.settings(cd).await?;
        let cc = self.rate_for_debit(cd, &settings).await?;

        let session = self.open_session(cd).await?;
        let ctx = self.ledger_context(cd, &session, &settings).await?;
        self.debit_in_session(cd, cc, session, &ctx, &settings).await
    }

    /// Debit as much of the call as the balances can pay
    ///
    /// Fails with `InsufficientCredit` when nothing is affordable, or when
    /// the call is cut short and `force_duration` is set.
    #[instrument(skip(self, cd), fields(account = %cd.account_key(), destination = %cd.destination))]
    pub async fn max_debit(&self, cd: &CallDescriptor) -> RatingResult<CallCost> {
        cd.check()?;
        let settings = self.settings(cd).await?;
        let cc = self.rate_for_estimate(cd, &settings).await?;

        let session = self.open_session(cd).await?;
        let ctx = self.ledger_context(cd, &session, &settings).await?;
        let allowed = Self::affordable_usage(&session, &ctx, &cc, cd)?;
        let requested = cd.duration();

        if allowed >= requested && cc.timespans.iter().all(|span| span.is_rated()) {
            return self.debit_in_session(cd, cc, session, &ctx, &settings).await;
        }
        if allowed.is_zero() && !requested.is_zero() {
            warn!("No usage affordable for {}", session.owner());
            return Err(RatingError::InsufficientCredit(session.owner().to_string()));
        }
        if cd.force_duration {
            warn!(
                "Only {}s of {}s affordable for {} with forced duration",
                allowed.num_seconds(),
                requested.num_seconds(),
                session.owner()
            );
            return Err(RatingError::InsufficientCredit(session.owner().to_string()));
        }

        let truncated = cd.truncated(allowed);
        debug!(
            "Truncating debit of {} to {}s",
            session.owner(),
            allowed.num_seconds()
        );
        let cc = self.rate_for_debit(&truncated, &settings).await?;
        self.debit_in_session(&truncated, cc, session, &ctx, &settings)
            .await
    }

    /// Longest usage of the requested call the account can pay
    #[instrument(skip(self, cd), fields(account = %cd.account_key(), destination = %cd.destination))]
    pub async fn get_max_session_duration(&self, cd: &CallDescriptor) -> RatingResult<Duration> {
        cd.check()?;
        let settings = self.settings(cd).await?;
        let cc = self.rate_for_estimate(cd, &settings).await?;

        let session = self.open_session(cd).await?;
        let ctx = self.ledger_context(cd, &session, &settings).await?;
        let allowed = Self::affordable_usage(&session, &ctx, &cc, cd)?;
        debug!(
            "Max session duration for {}: {}s",
            session.owner(),
            allowed.num_seconds()
        );
        Ok(allowed.min(cd.duration()))
    }

    /// Credit the increments of `cd` back to the balances that paid them
    ///
    /// Returns the summary of the descriptor's account when it was refunded.
    #[instrument(skip(self, cd), fields(account = %cd.account_key(), increments = cd.increments.len()))]
    pub async fn refund_increments(
        &self,
        cd: &CallDescriptor,
    ) -> RatingResult<Option<AccountSummary>> {
        cd.check()?;
        let ids: BTreeSet<String> = cd
            .increments
            .iter()
            .filter_map(|increment| increment.balance_info.as_ref())
            .map(|info| info.account_id.clone())
            .collect();
        if ids.is_empty() {
            debug!("No increments with balance info to refund");
            return Ok(None);
        }

        let _guards = self.locks.lock_all(ids.iter().cloned()).await;
        let mut accounts = BTreeMap::new();
        for id in &ids {
            match self.store.get_account(id).await? {
                Some(account) => {
                    accounts.insert(id.clone(), account);
                }
                None => warn!("Could not get account {} to be refunded", id),
            }
        }
        let originals = accounts.clone();

        let credited = ledger::refund(&mut accounts, &cd.increments);
        commit_accounts(self.store.as_ref(), &accounts, &originals).await?;
        info!("Refunded {} balances for {}", credited, cd.account_key());

        Ok(accounts.get(&cd.account_key()).map(Account::summary))
    }
}

fn unrated_subject(cd: &CallDescriptor) -> RatingError {
    RatingError::NotFound(format!("rating profile for subject {}", cd.subject))
}
