// tests/data_test.rs
mod common;

#[cfg(test)]
mod tests {
    use super::common::*;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_get_cost_of_data_volume() {
        let store = fixture_store();
        let engine = engine(&store);

        let cc = engine
            .get_cost(&data("surfer", ts(10, 0, 0), 250_000_000))
            .await
            .unwrap();
        assert_eq!(cc.cost, dec!(25));
        assert!(cc.increments().is_empty());

        // a partial step is billed as a whole thousand
        let cc = engine
            .get_cost(&data("surfer", ts(10, 0, 0), 1_500))
            .await
            .unwrap();
        assert_eq!(cc.cost, dec!(0.0002));
        assert_eq!(cc.timespans[0].billed_duration, Duration::nanoseconds(2_000));
    }

    #[tokio::test]
    async fn test_get_cost_of_huge_volume() {
        let store = fixture_store();
        let engine = engine(&store);

        let cc = engine
            .get_cost(&data("surfer", ts(10, 0, 0), 1_000_000_000_000))
            .await
            .unwrap();

        assert_eq!(cc.cost, dec!(100000));
        assert_eq!(cc.duration(), Duration::nanoseconds(1_000_000_000_000));
    }

    #[tokio::test]
    async fn test_data_balance_pays_with_factor() {
        let store = fixture_store();
        let engine = engine(&store);

        let cc = engine
            .debit(&data("surfer", ts(10, 0, 0), 3_000_000))
            .await
            .unwrap();

        // every unit of volume takes two units of the balance
        assert_eq!(cc.cost, Decimal::ZERO);
        assert_eq!(balance_value(&store, "vdf:surfer", "bytes"), dec!(4000000));
        assert_eq!(balance_value(&store, "vdf:surfer", "m"), dec!(10));

        let increments = cc.increments();
        assert_eq!(increments.len(), 1);
        assert_eq!(increments[0].compress_factor, 3_000);
        let unit = increments[0]
            .balance_info
            .as_ref()
            .and_then(|info| info.unit.as_ref())
            .unwrap();
        assert_eq!(unit.factor, dec!(2));
        assert_eq!(unit.consumed, dec!(2000));
    }

    #[tokio::test]
    async fn test_data_falls_back_to_money_when_units_run_out() {
        let store = fixture_store();
        let engine = engine(&store);

        let cc = engine
            .debit(&data("surfer", ts(10, 0, 0), 8_000_000))
            .await
            .unwrap();

        assert_eq!(cc.cost, dec!(0.3));
        assert_eq!(balance_value(&store, "vdf:surfer", "bytes"), Decimal::ZERO);
        assert_eq!(balance_value(&store, "vdf:surfer", "m"), dec!(9.7));

        let factors: Vec<u64> = cc.increments().iter().map(|i| i.compress_factor).collect();
        assert_eq!(factors, vec![5_000, 3_000]);
    }

    #[tokio::test]
    async fn test_max_debit_truncates_data_volume() {
        let store = fixture_store();
        let engine = engine(&store);

        let cc = engine
            .max_debit(&data("browser", ts(10, 0, 0), 50_000_000))
            .await
            .unwrap();

        assert_eq!(cc.duration(), Duration::nanoseconds(10_000_000));
        assert_eq!(cc.cost, dec!(1));
        assert_eq!(balance_value(&store, "vdf:browser", "m"), Decimal::ZERO);
        assert!(cc.increments().len() <= 2);
    }

    #[tokio::test]
    async fn test_max_session_volume_spans_units_and_money() {
        let store = fixture_store();
        let engine = engine(&store);
        let before = account_json(&store, "vdf:surfer");

        let allowed = engine
            .get_max_session_duration(&data("surfer", ts(10, 0, 0), 200_000_000))
            .await
            .unwrap();

        // 5M volume from the unit balance, then 10 of money at 0.0001 per thousand
        assert_eq!(allowed, Duration::nanoseconds(105_000_000));
        assert_eq!(account_json(&store, "vdf:surfer"), before);
    }

    #[tokio::test]
    async fn test_refund_restores_data_and_money() {
        let store = fixture_store();
        let engine = engine(&store);
        let cd = data("surfer", ts(10, 0, 0), 8_000_000);
        let cc = engine.debit(&cd).await.unwrap();

        let mut refund = cd.clone();
        refund.increments = cc.increments();
        let summary = engine.refund_increments(&refund).await.unwrap().unwrap();

        assert_eq!(summary.balance("bytes").unwrap().value, dec!(10000000));
        assert_eq!(balance_value(&store, "vdf:surfer", "bytes"), dec!(10000000));
        assert_eq!(balance_value(&store, "vdf:surfer", "m"), dec!(10));
    }
}
