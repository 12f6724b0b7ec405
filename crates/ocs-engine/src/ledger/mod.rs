//! Balance ledger
//!
//! Pays the increments of a priced call from the balances of a set of loaded
//! accounts. Unit balances of the record type are tried first, then monetary
//! ones. Within a kind the owner's plain balances go first (heaviest first),
//! then the pools of the owner's shared groups in the order set by each
//! group's sharing strategy. A balance pays whole increments or nothing.
//! Money that no balance can pay becomes debt on the owner's `*default`
//! balance unless negative balances are denied.

pub mod reprice;
pub mod rules;

use chrono::{DateTime, Duration, Utc};
use ocs_core::error::RatingError;
use ocs_core::models::{
    Account, Balance, BalanceType, CallCost, CallDescriptor, DebitInfo, Increment, SharedGroup,
    SharingStrategy, ToR,
};
use ocs_core::RatingResult;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

use crate::calculator;
pub use reprice::Repricer;
pub use rules::{DebitRule, MonetaryRule, UnitRule};

/// Outcome of paying a run of increments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payment {
    Paid,
    /// No balance could pay
    Unpaid,
    /// A blocker balance could not pay and ended the search
    Blocked,
}

/// Pieces of a run paid by the ledger and how the run ended
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    /// Paid pieces in order, each carrying the balances that paid it
    pub paid: Vec<Increment>,
    pub outcome: Payment,
}

impl Settlement {
    /// Increments of the run that were paid
    pub fn paid_count(&self) -> u64 {
        self.paid.iter().map(|piece| piece.compress_factor).sum()
    }
}

/// Call-level inputs of balance selection
#[derive(Debug, Clone)]
pub struct LedgerContext {
    /// `tenant:account` ID of the debited account
    pub owner: String,
    pub tor: ToR,
    /// Reference time for balance expiry
    pub at: DateTime<Utc>,
    /// Destination IDs of the dialed number, longest prefix first
    pub destination_ids: Vec<String>,
    pub repricer: Repricer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    account_id: String,
    uuid: String,
}

struct PoolEntry<'b> {
    mine: bool,
    account_id: &'b str,
    balance: &'b Balance,
}

fn strategy_cmp(strategy: SharingStrategy, a: &PoolEntry<'_>, b: &PoolEntry<'_>) -> Ordering {
    match strategy {
        SharingStrategy::Weight => b.balance.weight.cmp(&a.balance.weight),
        SharingStrategy::Lowest => a.balance.value.cmp(&b.balance.value),
        SharingStrategy::Highest => b.balance.value.cmp(&a.balance.value),
        SharingStrategy::MineLowest => b
            .mine
            .cmp(&a.mine)
            .then_with(|| a.balance.value.cmp(&b.balance.value)),
        SharingStrategy::MineHighest => b
            .mine
            .cmp(&a.mine)
            .then_with(|| b.balance.value.cmp(&a.balance.value)),
    }
}

/// Ledger over the accounts of one debit session
pub struct Ledger<'a> {
    accounts: &'a mut BTreeMap<String, Account>,
    groups: &'a HashMap<String, SharedGroup>,
    ctx: &'a LedgerContext,
}

impl<'a> Ledger<'a> {
    pub fn new(
        accounts: &'a mut BTreeMap<String, Account>,
        groups: &'a HashMap<String, SharedGroup>,
        ctx: &'a LedgerContext,
    ) -> Self {
        Self {
            accounts,
            groups,
            ctx,
        }
    }

    /// Balances of `kind` able to pay for the call, best first
    fn candidates(&self, kind: BalanceType) -> Vec<Candidate> {
        let owner_id = self.ctx.owner.as_str();
        let Some(owner) = self.accounts.get(owner_id) else {
            return Vec::new();
        };
        let eligible =
            |balance: &Balance| balance.is_eligible(&self.ctx.destination_ids, self.ctx.at);

        let mut own: Vec<&Balance> = owner
            .balances(kind)
            .iter()
            .filter(|balance| eligible(*balance))
            .collect();
        own.sort_by(|a, b| b.weight.cmp(&a.weight));

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        let mut push = |account_id: &str, balance: &Balance| {
            if seen.insert(balance.uuid.clone()) {
                candidates.push(Candidate {
                    account_id: account_id.to_string(),
                    uuid: balance.uuid.clone(),
                });
            }
        };

        for balance in own.iter().filter(|b| b.shared_group.is_none()) {
            push(owner_id, *balance);
        }

        let mut group_ids: Vec<&str> = Vec::new();
        for group_id in own.iter().filter_map(|b| b.shared_group.as_deref()) {
            if !group_ids.contains(&group_id) {
                group_ids.push(group_id);
            }
        }

        for group_id in group_ids {
            let Some(group) = self.groups.get(group_id) else {
                debug!("Shared group {} not loaded, using own balances only", group_id);
                for balance in own
                    .iter()
                    .filter(|b| b.shared_group.as_deref() == Some(group_id))
                {
                    push(owner_id, *balance);
                }
                continue;
            };

            let members: BTreeSet<&str> = group
                .member_ids
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(owner_id))
                .collect();
            let mut pool = Vec::new();
            for member in members {
                let Some(account) = self.accounts.get(member) else {
                    continue;
                };
                let mine = member == owner_id;
                if account.disabled && !mine {
                    continue;
                }
                for balance in account.balances(kind) {
                    if balance.shared_group.as_deref() == Some(group_id) && eligible(balance) {
                        pool.push(PoolEntry {
                            mine,
                            account_id: member,
                            balance,
                        });
                    }
                }
            }

            let strategy = group.parameters_for(owner_id).strategy;
            pool.sort_by(|a, b| strategy_cmp(strategy, a, b));
            for entry in pool {
                push(entry.account_id, entry.balance);
            }
        }

        candidates
    }

    fn balance(&self, candidate: &Candidate) -> Option<&Balance> {
        self.accounts
            .get(&candidate.account_id)
            .and_then(|account| account.balance_by_uuid(&candidate.uuid))
    }

    fn balance_mut(&mut self, candidate: &Candidate) -> Option<&mut Balance> {
        self.accounts
            .get_mut(&candidate.account_id)
            .and_then(|account| account.balance_by_uuid_mut(&candidate.uuid))
    }

    /// Pay a run of increments starting at `at`
    ///
    /// Each balance pays as many whole increments of the run as it holds
    /// value for; the run splits into one paid piece per balance.
    pub fn pay(&mut self, run: &Increment, at: DateTime<Utc>) -> Settlement {
        let mut paid = Vec::new();
        let mut left = run.compress_factor;
        let mut at = at;

        if run.duration > Duration::zero() {
            while left > 0 {
                let rest = Increment::new(run.duration, run.cost).times(left);
                let Some(piece) = self.pay_with_units(&rest, at) else {
                    break;
                };
                left -= piece.compress_factor;
                at = at + piece.total_duration();
                paid.push(piece);
            }
        }
        if left == 0 {
            return Settlement {
                paid,
                outcome: Payment::Paid,
            };
        }

        let rest = Increment::new(run.duration, run.cost).times(left);
        let outcome = self.pay_with_money(&rest, &mut paid);
        Settlement { paid, outcome }
    }

    fn monetary_payer(&self, account_id: &str, amount: Decimal) -> Option<Candidate> {
        self.candidates(BalanceType::Monetary)
            .into_iter()
            .filter(|candidate| candidate.account_id == account_id)
            .find(|candidate| {
                self.balance(candidate)
                    .map_or(false, |balance| MonetaryRule.can_pay(balance, amount))
            })
    }

    /// Pay a leading piece of `run` with one unit balance
    fn pay_with_units(&mut self, run: &Increment, at: DateTime<Utc>) -> Option<Increment> {
        let rule = UnitRule { tor: self.ctx.tor };

        for candidate in self.candidates(rule.balance_type()) {
            let Some(balance) = self.balance(&candidate) else {
                continue;
            };
            let amount = rule.amount(run, balance);
            let mut count = affordable(balance.value, amount, run.compress_factor);
            if count == 0 {
                if balance.blocker {
                    debug!("Blocker unit balance {} stops the search", balance.id);
                    break;
                }
                continue;
            }

            let monetary_part = match balance.rating_subject.as_deref() {
                Some(subject) => match self.ctx.repricer.price(subject, run, at) {
                    Some(cost) => cost,
                    None => {
                        debug!("Rating subject {} cannot price the increment", subject);
                        continue;
                    }
                },
                None => Decimal::ZERO,
            };
            let payer = if monetary_part > Decimal::ZERO {
                let Some(payer) = self.monetary_payer(&candidate.account_id, monetary_part) else {
                    continue;
                };
                let funds = self.balance(&payer).map_or(Decimal::ZERO, |b| b.value);
                count = count.min(affordable(funds, monetary_part, count));
                Some(payer)
            } else {
                None
            };

            let mut info = DebitInfo {
                account_id: candidate.account_id.clone(),
                monetary: None,
                unit: None,
            };
            if let Some(balance) = self.balance_mut(&candidate) {
                balance.value -= amount * Decimal::from(count);
                rule.attach(&mut info, balance, amount);
            }
            if let Some(payer) = payer {
                if let Some(balance) = self.balance_mut(&payer) {
                    balance.value -= monetary_part * Decimal::from(count);
                    MonetaryRule.attach(&mut info, balance, monetary_part);
                }
            }
            let mut piece = Increment::new(run.duration, monetary_part).times(count);
            piece.balance_info = Some(info);
            return Some(piece);
        }
        None
    }

    fn pay_with_money(&mut self, run: &Increment, paid: &mut Vec<Increment>) -> Payment {
        let rule = MonetaryRule;
        let candidates = self.candidates(rule.balance_type());

        if run.cost <= Decimal::ZERO {
            let mut piece = run.clone();
            if let Some(first) = candidates.first() {
                let mut info = DebitInfo {
                    account_id: first.account_id.clone(),
                    monetary: None,
                    unit: None,
                };
                if let Some(balance) = self.balance(first) {
                    rule.attach(&mut info, balance, Decimal::ZERO);
                }
                piece.balance_info = Some(info);
            }
            paid.push(piece);
            return Payment::Paid;
        }

        let mut left = run.compress_factor;
        for candidate in candidates {
            let Some(balance) = self.balance_mut(&candidate) else {
                continue;
            };
            let amount = rule.amount(run, balance);
            let count = affordable(balance.value, amount, left);
            if count > 0 {
                balance.value -= amount * Decimal::from(count);
                let mut info = DebitInfo {
                    account_id: candidate.account_id.clone(),
                    monetary: None,
                    unit: None,
                };
                rule.attach(&mut info, balance, amount);
                let mut piece = Increment::new(run.duration, run.cost).times(count);
                piece.balance_info = Some(info);
                paid.push(piece);
                left -= count;
            }
            if left == 0 {
                return Payment::Paid;
            }
            if balance.blocker {
                debug!("Blocker balance {} cannot pay {}", balance.id, amount);
                return Payment::Blocked;
            }
        }
        Payment::Unpaid
    }

    fn charge_debt(&mut self, run: &mut Increment) -> RatingResult<()> {
        let owner = self.ctx.owner.clone();
        let account = self
            .accounts
            .get_mut(&owner)
            .ok_or_else(|| RatingError::AccountNotFound(owner.clone()))?;
        let balance = account.default_monetary_mut();
        balance.value -= run.total_cost();

        let mut info = DebitInfo {
            account_id: owner,
            monetary: None,
            unit: None,
        };
        MonetaryRule.attach(&mut info, balance, run.cost);
        run.balance_info = Some(info);
        Ok(())
    }

    /// Pay every increment of a priced call
    ///
    /// Each span's runs are replaced by the paid pieces.
    ///
    /// # Errors
    ///
    /// Returns `RatingError::InsufficientCredit` when a blocker stops the
    /// search, or when nothing can pay and `deny_negative` is set. The
    /// accounts are left partially debited; callers discard them.
    pub fn debit_call(&mut self, cc: &mut CallCost, deny_negative: bool) -> RatingResult<()> {
        for span in cc.timespans.iter_mut().filter(|span| span.is_rated()) {
            let mut at = span.time_start;
            let mut settled = Vec::with_capacity(span.increments.len());
            for run in std::mem::take(&mut span.increments) {
                let settlement = self.pay(&run, at);
                let unpaid = run.compress_factor - settlement.paid_count();
                settled.extend(settlement.paid);
                match settlement.outcome {
                    Payment::Paid => {}
                    Payment::Blocked => {
                        warn!("Blocker balance denies debit of {}", self.ctx.owner);
                        return Err(RatingError::InsufficientCredit(self.ctx.owner.clone()));
                    }
                    Payment::Unpaid if deny_negative => {
                        warn!(
                            "Insufficient credit on {} for {} increments of {}",
                            self.ctx.owner, unpaid, run.cost
                        );
                        return Err(RatingError::InsufficientCredit(self.ctx.owner.clone()));
                    }
                    Payment::Unpaid => {
                        let mut debt = Increment::new(run.duration, run.cost).times(unpaid);
                        self.charge_debt(&mut debt)?;
                        settled.push(debt);
                    }
                }
                at = at + run.total_duration();
            }
            span.increments = settled;
        }
        cc.update_cost();
        Ok(())
    }

    /// Usage the balances can pay, paying it on these accounts
    ///
    /// Run on scratch copies of the session accounts.
    pub fn max_usage(
        &mut self,
        cc: &mut CallCost,
        cd: &CallDescriptor,
        allow_negative: bool,
    ) -> RatingResult<Duration> {
        calculator::estimate_max_usage(cc, cd, |run, at| {
            if allow_negative {
                return Ok(run.compress_factor);
            }
            Ok(self.pay(run, at).paid_count())
        })
    }

    /// Credit back the difference between the per-span rounded charge and the
    /// once-rounded exact cost
    ///
    /// Calls with unit-paid increments are left untouched. Returns the amount
    /// credited.
    pub fn refund_rounding(&mut self, cc: &mut CallCost, decimals: u32) -> Decimal {
        let unit_paid = cc.timespans.iter().flat_map(|span| &span.increments).any(|i| {
            i.balance_info
                .as_ref()
                .map_or(false, |info| info.unit.is_some())
        });
        if unit_paid {
            return Decimal::ZERO;
        }

        let accounts = &mut *self.accounts;
        let refunded = calculator::round_total(cc, decimals, |run, take| {
            let Some(info) = run.balance_info.as_mut() else {
                return;
            };
            let Some(money) = info.monetary.as_mut() else {
                return;
            };
            if let Some(balance) = accounts
                .get_mut(&info.account_id)
                .and_then(|account| account.balance_by_uuid_mut(&money.uuid))
            {
                balance.value += take;
                money.value = balance.value;
            }
        });
        if !refunded.is_zero() {
            debug!("Refunded {} of rounding to {}", refunded, self.ctx.owner);
        }
        refunded
    }
}

/// Whole increments of `amount` that `value` covers, at most `limit`
fn affordable(value: Decimal, amount: Decimal, limit: u64) -> u64 {
    if amount <= Decimal::ZERO {
        return limit;
    }
    if value < amount {
        return 0;
    }
    (value / amount).floor().to_u64().unwrap_or(limit).min(limit)
}

/// Credit increments back to the balances that paid them
///
/// Returns the number of balances credited. Increments without balance info
/// are skipped; missing accounts and balances are logged and skipped.
pub fn refund(accounts: &mut BTreeMap<String, Account>, increments: &[Increment]) -> usize {
    let mut credited = 0;
    for increment in increments {
        let Some(info) = &increment.balance_info else {
            continue;
        };
        let Some(account) = accounts.get_mut(&info.account_id) else {
            warn!("Could not get account {} to be refunded", info.account_id);
            continue;
        };
        let factor = Decimal::from(increment.compress_factor);

        if let Some(unit) = &info.unit {
            match account.balance_by_uuid_mut(&unit.uuid) {
                Some(balance) => {
                    balance.value += unit.tor.units(increment.duration) * unit.factor * factor;
                    credited += 1;
                }
                None => warn!(
                    "Balance {} of account {} not found for refund",
                    unit.id, info.account_id
                ),
            }
        }
        if let Some(money) = &info.monetary {
            match account.balance_by_uuid_mut(&money.uuid) {
                Some(balance) => {
                    balance.value += increment.total_cost();
                    credited += 1;
                }
                None => warn!(
                    "Balance {} of account {} not found for refund",
                    money.id, info.account_id
                ),
            }
        }
    }
    credited
}
