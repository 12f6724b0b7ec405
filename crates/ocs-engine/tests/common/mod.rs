//! Shared catalog and account fixtures for the engine integration tests
//!
//! Tenant `vdf`, category `0`:
//! - `NAT` (0256, 0257): 1 per second with a connect fee of 1 on weekdays,
//!   0.5 per second from 18:00
//! - `GERMANY` (49): 0.25 per second all day
//! - `RET` (0723): 0.5 per second, priced only through the `fallback` profile
//!
//! Tenant `cgrates.org`, category `call`: `GERMANY` priced at 0.1 per minute
//! in one-second increments, rounded up to 4 decimals, by three intervals
//! starting at 00:00, 17:31:20 and 17:32:40.
//!
//! Tenant `vdf`, category `data`: any destination at 0.1 per million units
//! billed by the thousand, rounded up to 4 decimals. Data volumes travel as
//! nanosecond durations.
//!
//! 2012-02-02 is a Thursday.

#![allow(dead_code)]

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use ocs_core::consts::ANY;
use ocs_core::models::{
    Account, Balance, BalanceType, CallDescriptor, Destination, DestinationRate, RITiming, Rate,
    RateTier, RatingActivation, RatingPlan, RatingProfile, RoundingMethod, SharedGroup, ToR,
};
use ocs_core::RatingConfig;
use ocs_engine::RatingEngine;
use ocs_store::InMemoryStore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

pub fn ts(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2012, 2, 2, h, m, s).unwrap()
}

pub fn call(subject: &str, destination: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> CallDescriptor {
    CallDescriptor::new("vdf", "0", subject, destination, start, end)
}

/// Data session of `volume` units starting at `start`
pub fn data(subject: &str, start: DateTime<Utc>, volume: i64) -> CallDescriptor {
    let mut cd = CallDescriptor::new("vdf", "data", subject, ANY, start, start + Duration::nanoseconds(volume));
    cd.tor = ToR::Data;
    cd
}

fn per_second(value: Decimal, fee: Decimal) -> Rate {
    Rate {
        connect_fee: fee,
        rounding_method: RoundingMethod::Middle,
        rounding_decimals: 4,
        tiers: vec![RateTier::new(
            Duration::zero(),
            value,
            Duration::seconds(1),
            Duration::seconds(1),
        )],
        ..Default::default()
    }
}

fn entry(timing: &str, rating: &str) -> DestinationRate {
    DestinationRate {
        timing: timing.into(),
        rating: rating.into(),
        weight: dec!(10),
    }
}

fn midnight() -> NaiveTime {
    NaiveTime::from_hms_opt(0, 0, 0).unwrap()
}

fn rif_plan() -> RatingPlan {
    let mut plan = RatingPlan {
        id: "RP_RIF".into(),
        ..Default::default()
    };
    plan.timings
        .insert("WORKDAYS_00".into(), RITiming::weekdays_from(midnight()));
    plan.timings.insert(
        "WORKDAYS_18".into(),
        RITiming::weekdays_from(NaiveTime::from_hms_opt(18, 0, 0).unwrap()),
    );
    plan.timings.insert("ALWAYS".into(), RITiming::default());

    plan.ratings.insert("R_DAY".into(), per_second(dec!(1), dec!(1)));
    plan.ratings
        .insert("R_EVENING".into(), per_second(dec!(0.5), dec!(1)));
    plan.ratings
        .insert("R_DE".into(), per_second(dec!(0.25), Decimal::ZERO));

    plan.destination_rates.insert(
        "NAT".into(),
        vec![entry("WORKDAYS_00", "R_DAY"), entry("WORKDAYS_18", "R_EVENING")],
    );
    plan.destination_rates
        .insert("GERMANY".into(), vec![entry("ALWAYS", "R_DE")]);
    plan
}

fn ret_plan() -> RatingPlan {
    let mut plan = RatingPlan {
        id: "RP_RET".into(),
        ..Default::default()
    };
    plan.timings.insert("ALWAYS".into(), RITiming::default());
    plan.ratings
        .insert("R_RET".into(), per_second(dec!(0.5), Decimal::ZERO));
    plan.destination_rates
        .insert("RET".into(), vec![entry("ALWAYS", "R_RET")]);
    plan
}

/// Day rates that stop at 18:00, leaving the evening unpriced
fn gap_plan() -> RatingPlan {
    let mut plan = RatingPlan {
        id: "RP_GAP".into(),
        ..Default::default()
    };
    plan.timings.insert(
        "DAY_ONLY".into(),
        RITiming {
            start_time: Some(midnight()),
            end_time: NaiveTime::from_hms_opt(18, 0, 0),
            ..Default::default()
        },
    );
    plan.ratings.insert("R_DAY".into(), per_second(dec!(1), dec!(1)));
    plan.destination_rates
        .insert("NAT".into(), vec![entry("DAY_ONLY", "R_DAY")]);
    plan
}

fn round_plan() -> RatingPlan {
    let mut plan = RatingPlan {
        id: "RP_ROUND".into(),
        ..Default::default()
    };
    let starts = [("T_00", (0, 0, 0)), ("T_A", (17, 31, 20)), ("T_B", (17, 32, 40))];
    let mut entries = Vec::new();
    for (id, (h, m, s)) in starts {
        plan.timings.insert(
            id.into(),
            RITiming {
                start_time: NaiveTime::from_hms_opt(h, m, s),
                ..Default::default()
            },
        );
        entries.push(entry(id, "R_ROUND"));
    }
    plan.ratings.insert(
        "R_ROUND".into(),
        Rate {
            rounding_method: RoundingMethod::Up,
            rounding_decimals: 4,
            tiers: vec![RateTier::new(
                Duration::zero(),
                dec!(0.1),
                Duration::seconds(1),
                Duration::seconds(60),
            )],
            ..Default::default()
        },
    );
    plan.destination_rates.insert("GERMANY".into(), entries);
    plan
}

fn data_plan() -> RatingPlan {
    let mut plan = RatingPlan {
        id: "RP_DATA".into(),
        ..Default::default()
    };
    plan.timings.insert("ALWAYS".into(), RITiming::default());
    plan.ratings.insert(
        "R_DATA".into(),
        Rate {
            rounding_method: RoundingMethod::Up,
            rounding_decimals: 4,
            tiers: vec![RateTier::new(
                Duration::zero(),
                dec!(0.1),
                Duration::nanoseconds(1_000),
                Duration::nanoseconds(1_000_000),
            )],
            ..Default::default()
        },
    );
    plan.destination_rates
        .insert(ANY.into(), vec![entry("ALWAYS", "R_DATA")]);
    plan
}

fn profile(tenant: &str, category: &str, subject: &str, plan: &str, fallback: &[&str]) -> RatingProfile {
    RatingProfile {
        id: RatingProfile::key(tenant, category, subject),
        activations: vec![RatingActivation {
            activation_time: Utc.with_ymd_and_hms(2012, 1, 1, 0, 0, 0).unwrap(),
            rating_plan_id: plan.into(),
            fallback_keys: fallback.iter().map(|s| s.to_string()).collect(),
        }],
    }
}

pub fn money(id: &str, value: Decimal) -> Balance {
    Balance::new(id, value)
}

/// Catalog plus the accounts used across the tests
pub fn fixture_store() -> Arc<InMemoryStore> {
    let store = InMemoryStore::new();

    store.set_destination(Destination::new("NAT", &["0256", "0257"]));
    store.set_destination(Destination::new("GERMANY", &["49"]));
    store.set_destination(Destination::new("RET", &["0723"]));

    store.set_rating_plan(rif_plan());
    store.set_rating_plan(ret_plan());
    store.set_rating_plan(gap_plan());
    store.set_rating_plan(round_plan());
    store.set_rating_plan(data_plan());

    store.set_rating_profile(profile("vdf", "0", "rif", "RP_RIF", &[]));
    store.set_rating_profile(profile("vdf", "0", "*any", "RP_RIF", &[]));
    store.set_rating_profile(profile("vdf", "0", "fallback", "RP_RET", &["rif"]));
    store.set_rating_profile(profile("vdf", "0", "gappy", "RP_GAP", &[]));
    store.set_rating_profile(profile("cgrates.org", "call", "round", "RP_ROUND", &[]));
    store.set_rating_profile(profile("vdf", "data", "surfer", "RP_DATA", &[]));
    store.set_rating_profile(profile("vdf", "data", "browser", "RP_DATA", &[]));

    store.put_account(
        Account::new("vdf", "rif")
            .with_balance(
                BalanceType::Monetary,
                money("m_light", dec!(10)).with_weight(dec!(10)),
            )
            .with_balance(
                BalanceType::Monetary,
                money("m_heavy", dec!(10)).with_weight(dec!(20)),
            ),
    );

    store.set_shared_group(SharedGroup::new("SG_MINU", &["vdf:minu", "vdf:dan"]));
    store.put_account(Account::new("vdf", "minu").with_balance(
        BalanceType::Monetary,
        money("shared_own", Decimal::ZERO).with_shared_group("SG_MINU"),
    ));
    store.put_account(
        Account::new("vdf", "dan")
            .with_balance(
                BalanceType::Monetary,
                money("dan_main", dec!(1000)).with_weight(dec!(10)),
            )
            .with_balance(
                BalanceType::Monetary,
                money("pool", dec!(10)).with_shared_group("SG_MINU"),
            ),
    );

    store.put_account(
        Account::new("vdf", "poor").with_balance(BalanceType::Monetary, money("m", dec!(1))),
    );
    store.put_account(
        Account::new("vdf", "small").with_balance(BalanceType::Monetary, money("m", dec!(30))),
    );
    store.put_account(
        Account::new("vdf", "empty").with_balance(BalanceType::Monetary, money("m", Decimal::ZERO)),
    );

    let mut negative = Account::new("vdf", "negative");
    negative.allow_negative = true;
    store.put_account(negative);

    let mut blocker = money("blocker", dec!(1)).with_weight(dec!(20));
    blocker.blocker = true;
    store.put_account(
        Account::new("vdf", "blocked")
            .with_balance(BalanceType::Monetary, blocker)
            .with_balance(
                BalanceType::Monetary,
                money("plain", dec!(100)).with_weight(dec!(10)),
            ),
    );

    let mut off = Account::new("vdf", "off").with_balance(BalanceType::Monetary, money("m", dec!(10)));
    off.disabled = true;
    store.put_account(off);

    let mut repriced = Balance::new("minutes", dec!(60));
    repriced.rating_subject = Some("rif".into());
    store.put_account(
        Account::new("vdf", "voice")
            .with_balance(BalanceType::Voice, Balance::new("free_minutes", dec!(60)))
            .with_balance(BalanceType::Monetary, money("m", dec!(10))),
    );
    store.put_account(
        Account::new("vdf", "bundle")
            .with_balance(BalanceType::Voice, repriced)
            .with_balance(BalanceType::Monetary, money("m", dec!(10))),
    );

    store.put_account(
        Account::new("vdf", "conc").with_balance(BalanceType::Monetary, money("m", dec!(1000))),
    );
    store.put_account(
        Account::new("vdf", "gappy").with_balance(BalanceType::Monetary, money("m", dec!(100))),
    );

    let mut bytes = Balance::new("bytes", dec!(10000000));
    bytes.factor = dec!(2);
    store.put_account(
        Account::new("vdf", "surfer")
            .with_balance(BalanceType::Data, bytes)
            .with_balance(BalanceType::Monetary, money("m", dec!(10))),
    );
    store.put_account(
        Account::new("vdf", "browser").with_balance(BalanceType::Monetary, money("m", dec!(1))),
    );

    store.put_account(
        Account::new("cgrates.org", "round")
            .with_balance(BalanceType::Monetary, money("m", dec!(10))),
    );

    Arc::new(store)
}

pub fn engine(store: &Arc<InMemoryStore>) -> RatingEngine<InMemoryStore> {
    RatingEngine::with_store(Arc::clone(store), RatingConfig::default())
}

/// Value of the balance `id` of `account`
pub fn balance_value(store: &InMemoryStore, account: &str, id: &str) -> Decimal {
    store
        .account(account)
        .and_then(|a| {
            a.balance_map
                .values()
                .flatten()
                .find(|b| b.id == id)
                .map(|b| b.value)
        })
        .unwrap_or_else(|| panic!("balance {} of {} not found", id, account))
}

/// JSON form of a stored account
pub fn account_json(store: &InMemoryStore, account: &str) -> String {
    serde_json::to_string(&store.account(account).unwrap()).unwrap()
}
