// tests/refund_test.rs
mod common;

#[cfg(test)]
mod tests {
    use super::common::*;
    use chrono::Duration;
    use ocs_core::models::{DebitInfo, Increment, MonetaryInfo};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_refund_restores_debited_balances() {
        let store = fixture_store();
        let engine = engine(&store);
        let cd = call("rif", "0256", ts(18, 10, 0), ts(18, 10, 30));
        let cc = engine.debit(&cd).await.unwrap();
        assert_eq!(balance_value(&store, "vdf:rif", "m_light"), dec!(4));

        let mut refund = cd.clone();
        refund.increments = cc.increments();
        let summary = engine.refund_increments(&refund).await.unwrap().unwrap();

        assert_eq!(summary.balance("m_heavy").unwrap().value, dec!(10));
        assert_eq!(summary.balance("m_light").unwrap().value, dec!(10));
        assert_eq!(balance_value(&store, "vdf:rif", "m_heavy"), dec!(10));
        assert_eq!(balance_value(&store, "vdf:rif", "m_light"), dec!(10));
    }

    #[tokio::test]
    async fn test_refund_restores_units_and_repriced_money() {
        let store = fixture_store();
        let engine = engine(&store);
        let cd = call("bundle", "0256", ts(18, 10, 0), ts(18, 10, 13));
        let cc = engine.debit(&cd).await.unwrap();

        let mut refund = cd.clone();
        refund.increments = cc.increments();
        engine.refund_increments(&refund).await.unwrap();

        assert_eq!(balance_value(&store, "vdf:bundle", "minutes"), dec!(60));
        assert_eq!(balance_value(&store, "vdf:bundle", "m"), dec!(10));
    }

    #[tokio::test]
    async fn test_refund_reaches_shared_group_peer() {
        let store = fixture_store();
        let engine = engine(&store);
        let cd = call("minu", "0256", ts(18, 10, 0), ts(18, 10, 13));
        let cc = engine.debit(&cd).await.unwrap();

        let mut refund = cd.clone();
        refund.increments = cc.increments();
        let summary = engine.refund_increments(&refund).await.unwrap();

        // every increment was paid by the peer, so the caller is untouched
        assert!(summary.is_none());
        assert_eq!(balance_value(&store, "vdf:dan", "pool"), dec!(10));
    }

    #[tokio::test]
    async fn test_refund_skips_missing_accounts() {
        let store = fixture_store();
        let engine = engine(&store);
        let heavy_uuid = store
            .account("vdf:rif")
            .unwrap()
            .balance_map
            .values()
            .flatten()
            .find(|b| b.id == "m_heavy")
            .unwrap()
            .uuid
            .clone();

        let paid_by = |account: &str, uuid: &str| {
            let mut increment = Increment::new(Duration::seconds(1), dec!(2));
            increment.balance_info = Some(DebitInfo {
                account_id: account.to_string(),
                monetary: Some(MonetaryInfo {
                    uuid: uuid.to_string(),
                    id: "m".to_string(),
                    value: dec!(0),
                }),
                unit: None,
            });
            increment
        };
        let mut cd = call("rif", "0256", ts(18, 10, 0), ts(18, 10, 2));
        cd.increments = vec![paid_by("vdf:ghost", "nope"), paid_by("vdf:rif", &heavy_uuid)];

        let summary = engine.refund_increments(&cd).await.unwrap().unwrap();

        assert_eq!(summary.balance("m_heavy").unwrap().value, dec!(12));
        assert!(store.account("vdf:ghost").is_none());
    }

    #[tokio::test]
    async fn test_refund_without_balance_info_is_noop() {
        let store = fixture_store();
        let engine = engine(&store);
        let before = account_json(&store, "vdf:rif");
        let mut cd = call("rif", "0256", ts(18, 10, 0), ts(18, 10, 2));
        cd.increments = vec![Increment::new(Duration::seconds(1), dec!(1))];

        let summary = engine.refund_increments(&cd).await.unwrap();

        assert!(summary.is_none());
        assert_eq!(account_json(&store, "vdf:rif"), before);
    }
}
