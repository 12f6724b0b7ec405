//! Cost calculator
//!
//! Prices split time spans into a `CallCost`, builds the increments the
//! ledger debits and walks those increments to bound affordable usage.

use chrono::{DateTime, Duration, Utc};
use ocs_core::error::RatingError;
use ocs_core::models::duration::nanos;
use ocs_core::models::{
    CallCost, CallDescriptor, Increment, MaxCostStrategy, Rate, RateTier, RoundingMethod, TimeSpan,
};
use ocs_core::RatingResult;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

/// Usage already consumed by the session when the span starts
fn usage_at_start(span: &TimeSpan) -> Duration {
    span.duration_index - span.duration()
}

fn span_tier(span: &TimeSpan) -> RatingResult<&RateTier> {
    let interval = span
        .rate_interval
        .as_ref()
        .ok_or_else(|| RatingError::InvalidRatingPlan("span has no rate interval".to_string()))?;
    interval
        .rating
        .tier_at(usage_at_start(span))
        .ok_or_else(|| RatingError::InvalidRatingPlan("rate has no tiers".to_string()))
}

/// Number of increments needed to cover `usage`
fn increment_count(usage: Duration, increment: Duration) -> u64 {
    let usage = nanos(usage);
    let increment = nanos(increment);
    if usage <= 0 || increment <= 0 {
        return 0;
    }
    u64::try_from((usage + increment - 1) / increment).unwrap_or(0)
}

/// Equal-cost runs of `count` increments of `per_increment` each
///
/// The runs add up to `round(count × per_increment)`: the first `m` cost one
/// rounding step more than the rest.
fn increment_runs(rate: &Rate, tier: &RateTier, per_increment: Decimal, count: u64) -> Vec<Increment> {
    let decimals = rate.rounding_decimals.min(28);
    let step = Decimal::new(1, decimals);
    let low = RoundingMethod::Down.round(per_increment, decimals);
    let total = rate.round(per_increment * Decimal::from(count));
    let heavier = ((total - low * Decimal::from(count)) / step)
        .to_u64()
        .unwrap_or(0)
        .min(count);

    [(heavier, low + step), (count - heavier, low)]
        .into_iter()
        .filter(|(factor, _)| *factor > 0)
        .map(|(factor, cost)| Increment::new(tier.rate_increment, cost).times(factor))
        .collect()
}

/// Clip runs so their cumulative cost stays within `allowed`
///
/// A run crossing the cap splits into increments paid in full, one partial
/// increment and free increments.
fn clip_runs(runs: Vec<Increment>, allowed: &mut Decimal) -> Vec<Increment> {
    let mut clipped = Vec::with_capacity(runs.len());
    for run in runs {
        let total = run.total_cost();
        if run.cost <= Decimal::ZERO || total <= *allowed {
            *allowed = (*allowed - total.max(Decimal::ZERO)).max(Decimal::ZERO);
            clipped.push(run);
            continue;
        }

        let whole = (*allowed / run.cost)
            .floor()
            .to_u64()
            .unwrap_or(0)
            .min(run.compress_factor);
        let partial = *allowed - run.cost * Decimal::from(whole);
        let mut left = run.compress_factor - whole;
        if whole > 0 {
            clipped.push(Increment::new(run.duration, run.cost).times(whole));
        }
        if partial > Decimal::ZERO && left > 0 {
            clipped.push(Increment::new(run.duration, partial));
            left -= 1;
        }
        if left > 0 {
            clipped.push(Increment::new(run.duration, Decimal::ZERO).times(left));
        }
        *allowed = Decimal::ZERO;
    }
    clipped
}

/// Price the spans of a call
///
/// Each rated span costs `round(value × billed / unit)` with its rate's
/// rounding, plus the connect fee on the first rated span of a non-empty
/// first segment. With `with_increments` the span also carries compressed
/// runs of equal increments adding up to its cost. A `*free` cap clips the
/// cumulative cost, starting from `max_cost_so_far`.
///
/// # Errors
///
/// Returns `RatingError::InvalidRatingPlan` when a span's rate has no tiers.
pub fn price(
    cd: &CallDescriptor,
    spans: Vec<TimeSpan>,
    with_increments: bool,
) -> RatingResult<CallCost> {
    let mut cc = CallCost::for_call(cd);
    cc.timespans = spans;

    let mut fee_pending = cd.loop_index == 0 && cd.duration() > Duration::zero();
    let mut running = Decimal::ZERO;

    for span in cc.timespans.iter_mut().filter(|span| span.is_rated()) {
        let tier = span_tier(span)?.clone();
        let Some(rate) = span.rate_interval.as_ref().map(|iv| iv.rating.clone()) else {
            continue;
        };

        let count = increment_count(span.duration(), tier.rate_increment);
        let per_increment =
            tier.value * Decimal::from(nanos(tier.rate_increment)) / Decimal::from(nanos(tier.rate_unit));
        let exact = per_increment * Decimal::from(count);

        span.billed_duration = Duration::nanoseconds(
            nanos(tier.rate_increment).saturating_mul(i64::try_from(count).unwrap_or(i64::MAX)),
        );
        span.exact_cost = exact;
        span.connect_fee = Decimal::ZERO;
        span.increments.clear();

        let mut fee = Decimal::ZERO;
        if fee_pending {
            fee_pending = false;
            if !rate.connect_fee.is_zero() {
                fee = rate.connect_fee;
                span.connect_fee = fee;
                span.exact_cost += fee;
            }
        }
        let cap = rate
            .cost_cap()
            .filter(|(_, strategy)| *strategy == MaxCostStrategy::Free)
            .map(|(max_cost, _)| (max_cost - (cd.max_cost_so_far + running)).max(Decimal::ZERO));

        if with_increments {
            if !fee.is_zero() {
                span.increments.push(Increment::new(Duration::zero(), fee));
            }
            span.increments
                .extend(increment_runs(&rate, &tier, per_increment, count));
            if let Some(mut allowed) = cap {
                let runs = std::mem::take(&mut span.increments);
                span.increments = clip_runs(runs, &mut allowed);
            }
            span.cost = span.increments.iter().map(Increment::total_cost).sum();
        } else {
            let full = fee + rate.round(exact);
            span.cost = cap.map_or(full, |allowed| full.min(allowed));
        }
        running += span.cost;
    }

    cc.update_cost();
    debug!(
        "Priced {} spans of {} to {}",
        cc.timespans.len(),
        cd.destination,
        cc.cost
    );
    Ok(cc)
}

/// Lower the call cost to the once-rounded exact cost
///
/// The difference between the charged cost and `Σ exact` rounded to
/// `decimals` is taken back from the last increments that carry no unit
/// payment, splitting a run where only part of it is lowered. `on_refund`
/// sees each lowered run with the amount taken from the whole run.
/// Returns the total taken.
pub fn round_total<F>(cc: &mut CallCost, decimals: u32, mut on_refund: F) -> Decimal
where
    F: FnMut(&mut Increment, Decimal),
{
    let exact: Decimal = cc
        .timespans
        .iter()
        .filter(|span| span.is_rated())
        .map(|span| span.exact_cost)
        .sum();
    let rounded = RoundingMethod::Middle.round(exact, decimals);
    let mut delta = cc.cost - rounded;
    if delta <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let total = delta;

    for span in cc.timespans.iter_mut().rev().filter(|span| span.is_rated()) {
        if delta.is_zero() {
            break;
        }
        let mut lowered = Vec::with_capacity(span.increments.len() + 2);
        for mut run in std::mem::take(&mut span.increments).into_iter().rev() {
            let unit_paid = run
                .balance_info
                .as_ref()
                .map_or(false, |info| info.unit.is_some());
            if delta.is_zero() || unit_paid || run.cost <= Decimal::ZERO {
                lowered.push(run);
                continue;
            }

            // zero the trailing increments the delta fully covers
            let cleared = (delta / run.cost)
                .floor()
                .to_u64()
                .unwrap_or(0)
                .min(run.compress_factor);
            if cleared > 0 {
                let mut free = run.clone().times(cleared);
                let take = free.total_cost();
                free.cost = Decimal::ZERO;
                on_refund(&mut free, take);
                delta -= take;
                lowered.push(free);
                run.compress_factor -= cleared;
            }
            if run.compress_factor > 0 && delta > Decimal::ZERO {
                let mut last = run.clone().times(1);
                last.cost -= delta;
                on_refund(&mut last, delta);
                delta = Decimal::ZERO;
                lowered.push(last);
                run.compress_factor -= 1;
            }
            if run.compress_factor > 0 {
                lowered.push(run);
            }
        }
        lowered.reverse();
        span.increments = lowered;
    }

    cc.update_cost();
    total - delta
}

/// Whether a tier's price exceeds `max_rate` per `max_rate_unit`
fn exceeds_max_rate(cd: &CallDescriptor, tier: &RateTier) -> bool {
    let unit = nanos(cd.max_rate_unit);
    if cd.max_rate <= Decimal::ZERO || unit <= 0 {
        return false;
    }
    tier.price_per_nanosecond() > cd.max_rate / Decimal::from(unit)
}

/// Walk the increments of a priced call and return the usage they cover
///
/// The walk stops at the first unrated span, at a span priced above the
/// descriptor's max rate, at an increment crossing a `*disconnect` cost cap
/// and at the first increment `afford` cannot pay. `afford` receives each
/// run with its start time and returns how many of its increments are paid.
///
/// # Errors
///
/// Propagates the errors of `afford`.
pub fn estimate_max_usage<F>(
    cc: &mut CallCost,
    cd: &CallDescriptor,
    mut afford: F,
) -> RatingResult<Duration>
where
    F: FnMut(&mut Increment, DateTime<Utc>) -> RatingResult<u64>,
{
    let mut allowed = Duration::zero();
    let mut spent = cd.max_cost_so_far;

    for span in cc.timespans.iter_mut() {
        if !span.is_rated() {
            break;
        }
        let tier = span_tier(span)?;
        if exceeds_max_rate(cd, tier) {
            debug!("Span at {} exceeds the max rate", span.time_start);
            break;
        }
        let disconnect_at = span
            .rate_interval
            .as_ref()
            .and_then(|iv| iv.rating.cost_cap())
            .and_then(|(max_cost, strategy)| {
                (strategy == MaxCostStrategy::Disconnect).then_some(max_cost)
            });

        let span_duration = span.duration();
        let mut at = span.time_start;
        let mut covered = Duration::zero();
        let mut stopped = false;
        for run in &span.increments {
            let mut within = run.compress_factor;
            if let Some(max_cost) = disconnect_at {
                if run.cost > Decimal::ZERO && spent + run.total_cost() > max_cost {
                    within = ((max_cost - spent).max(Decimal::ZERO) / run.cost)
                        .floor()
                        .to_u64()
                        .unwrap_or(0)
                        .min(run.compress_factor);
                    debug!("Max cost reached at {}", at);
                }
            }

            let mut offered = run.clone().times(within);
            let paid = if within > 0 {
                afford(&mut offered, at)?.min(within)
            } else {
                0
            };
            let paid_run = run.clone().times(paid);
            spent += paid_run.total_cost();
            covered = covered + paid_run.total_duration();
            at = at + paid_run.total_duration();
            if paid < run.compress_factor {
                stopped = true;
                break;
            }
        }

        allowed = allowed + covered.min(span_duration);
        if stopped {
            break;
        }
    }

    Ok(allowed)
}
