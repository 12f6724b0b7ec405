//! Dynamic options
//!
//! A setting is taken from the request options first, then from the first
//! configured `DynamicOpt` whose tenant matches and whose filters pass for
//! the call, then from the configured default.

use ocs_core::consts::ANY;
use ocs_core::error::RatingError;
use ocs_core::traits::FilterEvaluator;
use ocs_core::{DynamicOpt, RatingResult};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

fn decode<T: DeserializeOwned>(key: &str, value: &Value) -> RatingResult<T> {
    serde_json::from_value(value.clone())
        .map_err(|e| RatingError::InvalidInput(format!("option {}: {}", key, e)))
}

fn tenant_matches(opt: &DynamicOpt, tenant: &str) -> bool {
    opt.tenant.is_empty() || opt.tenant == ANY || opt.tenant == tenant
}

/// Resolve one option for a call
///
/// # Errors
///
/// Returns `RatingError::InvalidInput` when a matching value does not decode
/// to `T`, and the filter evaluator's errors verbatim.
pub async fn resolve_opt<T, F>(
    filters: &F,
    api_opts: &HashMap<String, Value>,
    key: &str,
    tenant: &str,
    dynamic: &[DynamicOpt],
    event: &Value,
    default: T,
) -> RatingResult<T>
where
    T: DeserializeOwned,
    F: FilterEvaluator + ?Sized,
{
    if let Some(value) = api_opts.get(key) {
        debug!("Option {} from request: {}", key, value);
        return decode(key, value);
    }

    for opt in dynamic.iter().filter(|opt| tenant_matches(opt, tenant)) {
        if filters.pass(tenant, &opt.filter_ids, event).await? {
            debug!("Option {} from dynamic options: {}", key, opt.value);
            return decode(key, &opt.value);
        }
    }

    Ok(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockall::mock;
    use ocs_core::traits::NoFilters;
    use serde_json::json;

    mock! {
        pub Filters {}

        #[async_trait]
        impl FilterEvaluator for Filters {
            async fn pass(
                &self,
                tenant: &str,
                filter_ids: &[String],
                event: &Value,
            ) -> RatingResult<bool>;
        }
    }

    const KEY: &str = "*roundingDecimals";

    fn opt(tenant: &str, filters: &[&str], value: Value) -> DynamicOpt {
        DynamicOpt {
            tenant: tenant.to_string(),
            filter_ids: filters.iter().map(|f| f.to_string()).collect(),
            value,
        }
    }

    #[tokio::test]
    async fn test_request_option_wins() {
        let mut api = HashMap::new();
        api.insert(KEY.to_string(), json!(2));
        let dynamic = vec![opt("", &[], json!(3))];

        let value: u32 = resolve_opt(&NoFilters, &api, KEY, "vdf", &dynamic, &json!({}), 5)
            .await
            .unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn test_first_passing_dynamic_option() {
        let mut filters = MockFilters::new();
        filters
            .expect_pass()
            .withf(|_, ids, _| ids.len() == 1 && ids[0] == "FLTR_RIF")
            .returning(|_, _, _| Ok(false));
        filters
            .expect_pass()
            .withf(|_, ids, _| ids.len() == 1 && ids[0] == "FLTR_ANY")
            .returning(|_, _, _| Ok(true));

        let dynamic = vec![
            opt("other", &[], json!(1)),
            opt("vdf", &["FLTR_RIF"], json!(2)),
            opt("*any", &["FLTR_ANY"], json!(3)),
        ];
        let value: u32 = resolve_opt(
            &filters,
            &HashMap::new(),
            KEY,
            "vdf",
            &dynamic,
            &json!({"subject": "rif"}),
            5,
        )
        .await
        .unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn test_default_when_nothing_matches() {
        let mut filters = MockFilters::new();
        filters
            .expect_pass()
            .withf(|tenant, _, _| tenant.to_string() == "vdf")
            .returning(|_, _, _| Ok(false));

        let dynamic = vec![opt("vdf", &["FLTR_NONE"], json!(1))];
        let value: u32 =
            resolve_opt(&filters, &HashMap::new(), KEY, "vdf", &dynamic, &json!({}), 5)
                .await
                .unwrap();
        assert_eq!(value, 5);
    }

    #[tokio::test]
    async fn test_bad_value_is_invalid_input() {
        let mut api = HashMap::new();
        api.insert(KEY.to_string(), json!("many"));
        let result: RatingResult<u32> =
            resolve_opt(&NoFilters, &api, KEY, "vdf", &[], &json!({}), 5).await;
        assert!(matches!(result, Err(RatingError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_filter_error_propagates() {
        let mut filters = MockFilters::new();
        filters
            .expect_pass()
            .returning(|_, _, _| Err(RatingError::Store("filters unavailable".into())));

        let dynamic = vec![opt("", &["FLTR"], json!(1))];
        let result: RatingResult<u32> =
            resolve_opt(&filters, &HashMap::new(), KEY, "vdf", &dynamic, &json!({}), 5).await;
        assert!(matches!(result, Err(RatingError::Store(_))));
    }
}
