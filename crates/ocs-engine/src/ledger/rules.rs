//! Debit rules per balance kind

use ocs_core::models::{Balance, BalanceType, DebitInfo, Increment, MonetaryInfo, ToR, UnitInfo};
use rust_decimal::Decimal;

/// How an increment is charged against one kind of balance
pub trait DebitRule {
    fn balance_type(&self) -> BalanceType;

    /// Amount the balance must give up for the increment
    fn amount(&self, increment: &Increment, balance: &Balance) -> Decimal;

    fn can_pay(&self, balance: &Balance, amount: Decimal) -> bool {
        balance.value >= amount
    }

    /// Record the payment; `balance` already holds the debited value
    fn attach(&self, info: &mut DebitInfo, balance: &Balance, amount: Decimal);
}

/// Money paying the increment cost
#[derive(Debug, Clone, Copy, Default)]
pub struct MonetaryRule;

impl DebitRule for MonetaryRule {
    fn balance_type(&self) -> BalanceType {
        BalanceType::Monetary
    }

    fn amount(&self, increment: &Increment, _balance: &Balance) -> Decimal {
        increment.cost
    }

    fn attach(&self, info: &mut DebitInfo, balance: &Balance, _amount: Decimal) {
        info.monetary = Some(MonetaryInfo {
            uuid: balance.uuid.clone(),
            id: balance.id.clone(),
            value: balance.value,
        });
    }
}

/// Units of the record type paying the increment usage
#[derive(Debug, Clone, Copy)]
pub struct UnitRule {
    pub tor: ToR,
}

impl DebitRule for UnitRule {
    fn balance_type(&self) -> BalanceType {
        BalanceType::from(self.tor)
    }

    fn amount(&self, increment: &Increment, balance: &Balance) -> Decimal {
        self.tor.units(increment.duration) * balance.effective_factor()
    }

    fn attach(&self, info: &mut DebitInfo, balance: &Balance, amount: Decimal) {
        info.unit = Some(UnitInfo {
            uuid: balance.uuid.clone(),
            id: balance.id.clone(),
            value: balance.value,
            consumed: amount,
            tor: self.tor,
            factor: balance.effective_factor(),
        });
    }
}
