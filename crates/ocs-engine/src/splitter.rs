//! Time-span splitter
//!
//! Cuts `[time_start, time_end)` into contiguous spans, each priced by a
//! single rate interval and a single rate tier. Spans end at activation
//! window edges, at the next instant where any candidate timing may switch
//! (a daily start or end time, or midnight) and at tier boundaries of the
//! session usage. Adjacent pieces selecting the same interval and tier merge.

use chrono::{DateTime, Duration, Utc};
use ocs_core::models::timing::start_of_day;
use ocs_core::models::{CallDescriptor, RateInterval, RatingInfo, TimeSpan};
use rust_decimal::Decimal;
use tracing::{debug, warn};

/// Result of splitting a call
#[derive(Debug, Clone)]
pub struct Split {
    pub spans: Vec<TimeSpan>,
    /// First instant no interval covers; the last span is then an unrated
    /// sentinel running to the end of the call
    pub gap: Option<DateTime<Utc>>,
}

struct Builder<'a> {
    cd: &'a CallDescriptor,
    offset: Duration,
    spans: Vec<TimeSpan>,
    /// (rating info index, tier start) of each span, used to merge
    keys: Vec<(usize, Duration)>,
}

impl<'a> Builder<'a> {
    fn usage_at(&self, at: DateTime<Utc>) -> Duration {
        self.offset + (at - self.cd.time_start)
    }

    fn push(
        &mut self,
        info_index: usize,
        info: &RatingInfo,
        interval: &RateInterval,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) {
        let tier_start = interval
            .rating
            .tier_at(self.usage_at(from))
            .map_or(Duration::zero(), |tier| tier.group_interval_start);
        let key = (info_index, tier_start);

        if let (Some(last), Some(last_key)) = (self.spans.last_mut(), self.keys.last()) {
            let same_interval = last.rate_interval.as_ref() == Some(interval);
            if *last_key == key && same_interval && last.time_end == from {
                last.time_end = to;
                last.duration_index = self.offset + (to - self.cd.time_start);
                return;
            }
        }

        let duration_index = self.usage_at(to);
        self.spans
            .push(new_span(info, Some(interval), from, to, duration_index));
        self.keys.push(key);
    }

    fn finish(self) -> Split {
        Split {
            spans: self.spans,
            gap: None,
        }
    }

    fn finish_with_gap(mut self, at: DateTime<Utc>, info: Option<&RatingInfo>) -> Split {
        warn!(
            "No rate interval covers {} for subject {} destination {}",
            at, self.cd.subject, self.cd.destination
        );
        let duration_index = self.usage_at(self.cd.time_end);
        let mut sentinel = match info {
            Some(info) => new_span(info, None, at, self.cd.time_end, duration_index),
            None => TimeSpan {
                time_start: at,
                time_end: self.cd.time_end,
                cost: Decimal::ZERO,
                exact_cost: Decimal::ZERO,
                connect_fee: Decimal::ZERO,
                billed_duration: Duration::zero(),
                rate_interval: None,
                duration_index,
                increments: Vec::new(),
                matched_subject: String::new(),
                matched_prefix: String::new(),
                matched_dest_id: String::new(),
                rating_plan_id: String::new(),
            },
        };
        sentinel.cost = Decimal::NEGATIVE_ONE;
        self.spans.push(sentinel);
        Split {
            spans: self.spans,
            gap: Some(at),
        }
    }
}

fn new_span(
    info: &RatingInfo,
    interval: Option<&RateInterval>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    duration_index: Duration,
) -> TimeSpan {
    TimeSpan {
        time_start: from,
        time_end: to,
        cost: Decimal::ZERO,
        exact_cost: Decimal::ZERO,
        connect_fee: Decimal::ZERO,
        billed_duration: Duration::zero(),
        rate_interval: interval.cloned(),
        duration_index,
        increments: Vec::new(),
        matched_subject: info.matched_subject.clone(),
        matched_prefix: info.matched_prefix.clone(),
        matched_dest_id: info.matched_dest_id.clone(),
        rating_plan_id: info.rating_plan_id.clone(),
    }
}

/// Next instant after `at` where the activity of any interval may change
fn next_timing_change(intervals: &[RateInterval], at: DateTime<Utc>) -> DateTime<Utc> {
    let day_start = start_of_day(at);
    let mut next = day_start + Duration::days(1);
    for boundary in intervals
        .iter()
        .flat_map(|interval| interval.timing.day_boundaries())
    {
        let candidate = day_start + boundary;
        if candidate > at && candidate < next {
            next = candidate;
        }
    }
    next
}

/// Split a call into priced-later time spans
///
/// `infos` must be ordered by `window_start` and not overlap, as produced by
/// the resolver.
pub fn split(cd: &CallDescriptor, infos: &[RatingInfo]) -> Split {
    let mut builder = Builder {
        cd,
        offset: cd.usage_offset(),
        spans: Vec::new(),
        keys: Vec::new(),
    };

    if cd.time_start == cd.time_end {
        let info = infos.iter().find(|info| info.covers(cd.time_start));
        return match info.and_then(|info| info.interval_at(cd.time_start).map(|iv| (info, iv))) {
            Some((info, interval)) => {
                builder.push(0, info, interval, cd.time_start, cd.time_end);
                builder.finish()
            }
            None => builder.finish_with_gap(cd.time_start, info.or(infos.first())),
        };
    }

    let time_based = cd.tor.is_time_based();
    let mut cursor = cd.time_start;
    for (index, info) in infos.iter().enumerate() {
        if info.window_end <= cursor {
            continue;
        }
        if info.window_start > cursor {
            let previous = index.checked_sub(1).and_then(|i| infos.get(i));
            return builder.finish_with_gap(cursor, previous.or(Some(info)));
        }

        let window_interval = if time_based {
            None
        } else {
            info.interval_at(info.window_start)
        };

        let mut at = cursor;
        while at < info.window_end {
            let interval = if time_based {
                info.interval_at(at)
            } else {
                window_interval
            };
            let Some(interval) = interval else {
                return builder.finish_with_gap(at, Some(info));
            };

            let mut boundary = info.window_end;
            if time_based {
                boundary = boundary.min(next_timing_change(&info.rate_intervals, at));
            }
            let usage = builder.usage_at(at);
            if let Some(tier_start) = interval.rating.next_tier_start(usage) {
                boundary = boundary.min(at + (tier_start - usage));
            }

            builder.push(index, info, interval, at, boundary);
            at = boundary;
        }
        cursor = info.window_end;
    }

    if cursor < cd.time_end {
        return builder.finish_with_gap(cursor, infos.last());
    }

    debug!("Split call into {} spans", builder.spans.len());
    builder.finish()
}
