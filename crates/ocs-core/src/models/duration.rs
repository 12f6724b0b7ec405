//! Serde helpers for `chrono::Duration`
//!
//! Durations travel as signed nanosecond counts.

use chrono::Duration;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(value.num_nanoseconds().unwrap_or(i64::MAX))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    i64::deserialize(deserializer).map(Duration::nanoseconds)
}

/// Total nanoseconds, saturating on overflow
#[inline]
pub fn nanos(value: Duration) -> i64 {
    value.num_nanoseconds().unwrap_or(i64::MAX)
}
