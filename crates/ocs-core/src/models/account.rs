//! Account model
//!
//! An account owns prioritized balance pools of several kinds. Balances may
//! be restricted to destinations, expire, block lower-priority balances or be
//! shared with other accounts through a shared group.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use uuid::Uuid;

use super::descriptor::ToR;
use crate::consts::{ANY, DEFAULT_BALANCE_ID, KEY_SEPARATOR};

/// Kind of value a balance holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BalanceType {
    #[serde(rename = "*monetary")]
    Monetary,
    #[serde(rename = "*voice")]
    Voice,
    #[serde(rename = "*data")]
    Data,
    #[serde(rename = "*sms")]
    Sms,
    #[serde(rename = "*mms")]
    Mms,
    #[serde(rename = "*generic")]
    Generic,
}

impl From<ToR> for BalanceType {
    fn from(tor: ToR) -> Self {
        match tor {
            ToR::Voice => BalanceType::Voice,
            ToR::Data => BalanceType::Data,
            ToR::Sms => BalanceType::Sms,
            ToR::Mms => BalanceType::Mms,
            ToR::Generic => BalanceType::Generic,
        }
    }
}

impl fmt::Display for BalanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalanceType::Monetary => write!(f, "*monetary"),
            BalanceType::Voice => write!(f, "*voice"),
            BalanceType::Data => write!(f, "*data"),
            BalanceType::Sms => write!(f, "*sms"),
            BalanceType::Mms => write!(f, "*mms"),
            BalanceType::Generic => write!(f, "*generic"),
        }
    }
}

fn default_factor() -> Decimal {
    Decimal::ONE
}

/// Balance entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Unique identifier recorded on every increment this balance pays
    pub uuid: String,

    /// Business identifier, unique per account
    pub id: String,

    pub value: Decimal,

    /// Selection priority, higher first
    #[serde(default)]
    pub weight: Decimal,

    /// Destination filter; `true` includes, `false` excludes
    #[serde(default)]
    pub destination_ids: BTreeMap<String, bool>,

    /// Subject whose rates price consumption of this unit balance
    #[serde(default)]
    pub rating_subject: Option<String>,

    #[serde(default)]
    pub expiration_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub disabled: bool,

    /// Stops the search for lower-priority balances when it cannot pay
    #[serde(default)]
    pub blocker: bool,

    #[serde(default)]
    pub shared_group: Option<String>,

    /// Units consumed per unit of usage
    #[serde(default = "default_factor")]
    pub factor: Decimal,
}

impl Balance {
    /// Create a plain balance with a fresh UUID
    pub fn new(id: impl Into<String>, value: Decimal) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            id: id.into(),
            value,
            weight: Decimal::ZERO,
            destination_ids: BTreeMap::new(),
            rating_subject: None,
            expiration_date: None,
            disabled: false,
            blocker: false,
            shared_group: None,
            factor: Decimal::ONE,
        }
    }

    pub fn with_weight(mut self, weight: Decimal) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_shared_group(mut self, group: impl Into<String>) -> Self {
        self.shared_group = Some(group.into());
        self
    }

    pub fn with_destinations(mut self, filter: &[(&str, bool)]) -> Self {
        self.destination_ids = filter
            .iter()
            .map(|(id, include)| (id.to_string(), *include))
            .collect();
        self
    }

    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        self.expiration_date.map_or(false, |exp| exp <= at)
    }

    /// Match the destination filter against the call's destination IDs
    ///
    /// An exclusion wins over an inclusion. A filter holding only exclusions
    /// admits every other destination.
    pub fn matches_destination(&self, destination_ids: &[String]) -> bool {
        if self.destination_ids.is_empty() {
            return true;
        }
        let mut included = false;
        for id in destination_ids {
            match self.destination_ids.get(id) {
                Some(false) => return false,
                Some(true) => included = true,
                None => {}
            }
        }
        included || self.destination_ids.values().all(|include| !include)
    }

    /// Whether the balance may pay for a call to `destination_ids` at `at`
    pub fn is_eligible(&self, destination_ids: &[String], at: DateTime<Utc>) -> bool {
        !self.disabled && !self.is_expired_at(at) && self.matches_destination(destination_ids)
    }

    /// Conversion factor, never zero
    pub fn effective_factor(&self) -> Decimal {
        if self.factor.is_zero() {
            Decimal::ONE
        } else {
            self.factor
        }
    }
}

/// Account entity, keyed `tenant:account`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,

    #[serde(default)]
    pub balance_map: BTreeMap<BalanceType, Vec<Balance>>,

    #[serde(default)]
    pub disabled: bool,

    /// Debits are never limited by available balance
    #[serde(default)]
    pub allow_negative: bool,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Account {
    pub fn new(tenant: &str, account: &str) -> Self {
        Self {
            id: format!("{}{}{}", tenant, KEY_SEPARATOR, account),
            balance_map: BTreeMap::new(),
            disabled: false,
            allow_negative: false,
            updated_at: None,
        }
    }

    pub fn with_balance(mut self, kind: BalanceType, balance: Balance) -> Self {
        self.balance_map.entry(kind).or_default().push(balance);
        self
    }

    pub fn tenant(&self) -> &str {
        self.id
            .split_once(KEY_SEPARATOR)
            .map_or(self.id.as_str(), |(tenant, _)| tenant)
    }

    pub fn balances(&self, kind: BalanceType) -> &[Balance] {
        self.balance_map
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn balance_by_uuid(&self, uuid: &str) -> Option<&Balance> {
        self.balance_map
            .values()
            .flatten()
            .find(|balance| balance.uuid == uuid)
    }

    pub fn balance_by_uuid_mut(&mut self, uuid: &str) -> Option<&mut Balance> {
        self.balance_map
            .values_mut()
            .flatten()
            .find(|balance| balance.uuid == uuid)
    }

    /// Sum of the enabled balances of a kind
    pub fn total(&self, kind: BalanceType) -> Decimal {
        self.balances(kind)
            .iter()
            .filter(|b| !b.disabled)
            .map(|b| b.value)
            .sum()
    }

    /// Shared groups referenced by any balance
    pub fn shared_group_ids(&self) -> BTreeSet<String> {
        self.balance_map
            .values()
            .flatten()
            .filter_map(|balance| balance.shared_group.clone())
            .collect()
    }

    /// The monetary balance receiving debt, created on first use
    pub fn default_monetary_mut(&mut self) -> &mut Balance {
        let balances = self.balance_map.entry(BalanceType::Monetary).or_default();
        let position = match balances.iter().position(|b| b.id == DEFAULT_BALANCE_ID) {
            Some(position) => position,
            None => {
                balances.push(Balance::new(DEFAULT_BALANCE_ID, Decimal::ZERO));
                balances.len() - 1
            }
        };
        &mut balances[position]
    }

    pub fn summary(&self) -> AccountSummary {
        AccountSummary {
            tenant: self.tenant().to_string(),
            id: self.id.clone(),
            balances: self
                .balance_map
                .iter()
                .flat_map(|(kind, balances)| {
                    balances.iter().map(move |b| BalanceSummary {
                        uuid: b.uuid.clone(),
                        id: b.id.clone(),
                        balance_type: *kind,
                        value: b.value,
                        disabled: b.disabled,
                    })
                })
                .collect(),
            allow_negative: self.allow_negative,
            disabled: self.disabled,
        }
    }
}

/// Snapshot of one balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub uuid: String,
    pub id: String,
    pub balance_type: BalanceType,
    pub value: Decimal,
    pub disabled: bool,
}

/// Snapshot of an account after rating
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub tenant: String,
    pub id: String,
    pub balances: Vec<BalanceSummary>,
    pub allow_negative: bool,
    pub disabled: bool,
}

impl AccountSummary {
    pub fn balance(&self, id: &str) -> Option<&BalanceSummary> {
        self.balances.iter().find(|b| b.id == id)
    }
}

/// Order in which a shared group offers its pooled balances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SharingStrategy {
    /// Heaviest balance first
    #[default]
    #[serde(rename = "*weight")]
    Weight,
    #[serde(rename = "*lowest")]
    Lowest,
    #[serde(rename = "*highest")]
    Highest,
    /// Own balances first, then lowest value
    #[serde(rename = "*mine_lowest")]
    MineLowest,
    /// Own balances first, then highest value
    #[serde(rename = "*mine_highest")]
    MineHighest,
}

/// Per-account sharing settings of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SharingParameters {
    #[serde(default)]
    pub strategy: SharingStrategy,
}

/// Shared group entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedGroup {
    pub id: String,

    /// Account ID (or `*any`) to its sharing settings
    #[serde(default)]
    pub account_parameters: HashMap<String, SharingParameters>,

    /// Accounts pooling balances in this group
    #[serde(default)]
    pub member_ids: BTreeSet<String>,
}

impl SharedGroup {
    pub fn new(id: impl Into<String>, members: &[&str]) -> Self {
        Self {
            id: id.into(),
            account_parameters: HashMap::new(),
            member_ids: members.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// Sharing settings for `account_id`, falling back to `*any`
    pub fn parameters_for(&self, account_id: &str) -> SharingParameters {
        self.account_parameters
            .get(account_id)
            .or_else(|| self.account_parameters.get(ANY))
            .copied()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_destination_filter() {
        let ids = vec!["GERMANY".to_string(), "GERMANY_MOBILE".to_string()];

        assert!(Balance::new("b", dec!(1)).matches_destination(&ids));
        assert!(Balance::new("b", dec!(1))
            .with_destinations(&[("GERMANY", true)])
            .matches_destination(&ids));
        assert!(!Balance::new("b", dec!(1))
            .with_destinations(&[("FRANCE", true)])
            .matches_destination(&ids));
        assert!(!Balance::new("b", dec!(1))
            .with_destinations(&[("GERMANY", true), ("GERMANY_MOBILE", false)])
            .matches_destination(&ids));
        assert!(Balance::new("b", dec!(1))
            .with_destinations(&[("FRANCE", false)])
            .matches_destination(&ids));
    }

    #[test]
    fn test_eligibility() {
        let now = Utc::now();
        let mut balance = Balance::new("b", dec!(1));
        assert!(balance.is_eligible(&[], now));

        balance.expiration_date = Some(now);
        assert!(!balance.is_eligible(&[], now));

        balance.expiration_date = None;
        balance.disabled = true;
        assert!(!balance.is_eligible(&[], now));
    }

    #[test]
    fn test_default_monetary_created_once() {
        let mut account = Account::new("vdf", "rif");
        account.default_monetary_mut().value -= dec!(2.5);
        account.default_monetary_mut().value -= dec!(1);
        let monetary = account.balances(BalanceType::Monetary);
        assert_eq!(monetary.len(), 1);
        assert_eq!(monetary[0].id, DEFAULT_BALANCE_ID);
        assert_eq!(monetary[0].value, dec!(-3.5));
    }

    #[test]
    fn test_account_helpers() {
        let account = Account::new("vdf", "rif")
            .with_balance(
                BalanceType::Monetary,
                Balance::new("m1", dec!(10)).with_shared_group("SG_TEST"),
            )
            .with_balance(BalanceType::Voice, Balance::new("v1", dec!(60)));

        assert_eq!(account.tenant(), "vdf");
        assert_eq!(account.total(BalanceType::Monetary), dec!(10));
        assert!(account.shared_group_ids().contains("SG_TEST"));

        let summary = account.summary();
        assert_eq!(summary.balances.len(), 2);
        assert_eq!(summary.balance("v1").unwrap().balance_type, BalanceType::Voice);
    }

    #[test]
    fn test_balance_map_json_keys() {
        let account = Account::new("vdf", "rif")
            .with_balance(BalanceType::Monetary, Balance::new("m1", dec!(10)));
        let json = serde_json::to_string(&account).unwrap();
        assert!(json.contains("\"*monetary\""));

        let back: Account = serde_json::from_str(&json).unwrap();
        assert_eq!(back, account);
    }

    #[test]
    fn test_sharing_parameters_fallback() {
        let mut group = SharedGroup::new("SG", &["vdf:a", "vdf:b"]);
        group.account_parameters.insert(
            ANY.to_string(),
            SharingParameters {
                strategy: SharingStrategy::Highest,
            },
        );
        assert_eq!(group.parameters_for("vdf:a").strategy, SharingStrategy::Highest);
    }
}
