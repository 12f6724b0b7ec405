//! Call descriptor model
//!
//! The transient, single-call context handed to every rating operation.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

use super::cost::Increment;
use super::duration;
use super::plan::RatingProfile;
use crate::consts::KEY_SEPARATOR;
use crate::error::RatingError;
use crate::RatingResult;

/// Type of record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ToR {
    #[default]
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

impl ToR {
    /// Whether timing rules are evaluated along the wall clock
    ///
    /// Non-voice usage is volume or count encoded as a duration, so only the
    /// start of the session selects the timing.
    pub fn is_time_based(self) -> bool {
        matches!(self, ToR::Voice)
    }

    /// Balance units represented by a usage duration
    ///
    /// Voice counts seconds; every other kind counts one unit per nanosecond.
    pub fn units(self, usage: Duration) -> Decimal {
        let nanos = duration::nanos(usage);
        match self {
            ToR::Voice => Decimal::new(nanos, 9).normalize(),
            _ => Decimal::from(nanos),
        }
    }
}

fn zero_duration() -> Duration {
    Duration::zero()
}

/// Call descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CallDescriptor {
    #[validate(length(min = 1))]
    pub tenant: String,

    #[validate(length(min = 1))]
    pub category: String,

    /// Identity used for rate lookup
    #[validate(length(min = 1))]
    pub subject: String,

    /// Account to debit; empty means the subject
    #[serde(default)]
    pub account: String,

    #[validate(length(min = 1))]
    pub destination: String,

    #[serde(default)]
    pub tor: ToR,

    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,

    /// Position of this segment in a session; the connect fee applies at 0
    #[serde(default)]
    pub loop_index: u32,

    /// Total session usage up to `time_end`, including earlier segments
    #[serde(default = "zero_duration", with = "duration")]
    pub duration_index: Duration,

    /// Highest acceptable price per `max_rate_unit`; zero disables the check
    #[serde(default)]
    pub max_rate: Decimal,

    #[serde(default = "zero_duration", with = "duration")]
    pub max_rate_unit: Duration,

    /// Cost already charged for earlier segments of the session
    #[serde(default)]
    pub max_cost_so_far: Decimal,

    /// Extra subjects tried after the subject and `*any`
    #[serde(default)]
    pub fallback_subjects: Vec<String>,

    /// MaxDebit fails instead of truncating usage
    #[serde(default)]
    pub force_duration: bool,

    /// Round the call total and refund the difference
    #[serde(default)]
    pub perform_rounding: bool,

    /// Fail instead of creating debt
    #[serde(default)]
    pub deny_negative_account: bool,

    /// Compute the debit without persisting it
    #[serde(default)]
    pub dry_run: bool,

    /// Increments to refund
    #[serde(default)]
    pub increments: Vec<Increment>,

    /// Per-request option overrides
    #[serde(default)]
    pub opts: HashMap<String, serde_json::Value>,
}

impl CallDescriptor {
    pub fn new(
        tenant: impl Into<String>,
        category: impl Into<String>,
        subject: impl Into<String>,
        destination: impl Into<String>,
        time_start: DateTime<Utc>,
        time_end: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            category: category.into(),
            subject: subject.into(),
            account: String::new(),
            destination: destination.into(),
            tor: ToR::Voice,
            time_start,
            time_end,
            loop_index: 0,
            duration_index: Duration::zero(),
            max_rate: Decimal::ZERO,
            max_rate_unit: Duration::zero(),
            max_cost_so_far: Decimal::ZERO,
            fallback_subjects: Vec::new(),
            force_duration: false,
            perform_rounding: false,
            deny_negative_account: false,
            dry_run: false,
            increments: Vec::new(),
            opts: HashMap::new(),
        }
    }

    /// Validate field contents and the time range
    ///
    /// # Errors
    ///
    /// Returns `RatingError::Validation` for empty identifiers and
    /// `RatingError::InvalidInput` for an inverted range or a duration index
    /// shorter than the segment.
    pub fn check(&self) -> RatingResult<()> {
        self.validate()?;
        if self.time_end < self.time_start {
            return Err(RatingError::InvalidInput(format!(
                "time_end {} precedes time_start {}",
                self.time_end, self.time_start
            )));
        }
        if !self.duration_index.is_zero() && self.duration_index < self.duration() {
            return Err(RatingError::InvalidInput(
                "duration_index is shorter than the call duration".to_string(),
            ));
        }
        Ok(())
    }

    pub fn duration(&self) -> Duration {
        self.time_end - self.time_start
    }

    /// Session usage consumed before `time_start`
    pub fn usage_offset(&self) -> Duration {
        if self.duration_index.is_zero() {
            return Duration::zero();
        }
        (self.duration_index - self.duration()).max(Duration::zero())
    }

    pub fn account_key(&self) -> String {
        let account = if self.account.is_empty() {
            &self.subject
        } else {
            &self.account
        };
        format!("{}{}{}", self.tenant, KEY_SEPARATOR, account)
    }

    pub fn profile_key(&self, subject: &str) -> String {
        RatingProfile::key(&self.tenant, &self.category, subject)
    }

    /// Copy of the descriptor ending after `usage`, keeping the session offset
    pub fn truncated(&self, usage: Duration) -> Self {
        let mut cut = self.clone();
        let offset = self.usage_offset();
        cut.time_end = self.time_start + usage;
        if !self.duration_index.is_zero() {
            cut.duration_index = offset + usage;
        }
        cut
    }

    /// Copy of the descriptor rated with another subject
    pub fn with_subject(&self, subject: &str) -> Self {
        let mut other = self.clone();
        other.subject = subject.to_string();
        other.fallback_subjects.clear();
        other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn descriptor() -> CallDescriptor {
        CallDescriptor::new(
            "vdf",
            "0",
            "rif",
            "0256",
            Utc.with_ymd_and_hms(2012, 2, 2, 17, 30, 0).unwrap(),
            Utc.with_ymd_and_hms(2012, 2, 2, 18, 30, 0).unwrap(),
        )
    }

    #[test]
    fn test_account_key_defaults_to_subject() {
        let mut cd = descriptor();
        assert_eq!(cd.account_key(), "vdf:rif");
        cd.account = "minu".into();
        assert_eq!(cd.account_key(), "vdf:minu");
        assert_eq!(cd.profile_key("*any"), "*out:vdf:0:*any");
    }

    #[test]
    fn test_check() {
        let mut cd = descriptor();
        assert!(cd.check().is_ok());

        cd.tenant.clear();
        assert!(matches!(cd.check(), Err(RatingError::Validation(_))));

        let mut cd = descriptor();
        std::mem::swap(&mut cd.time_start, &mut cd.time_end);
        assert!(matches!(cd.check(), Err(RatingError::InvalidInput(_))));

        let mut cd = descriptor();
        cd.duration_index = Duration::minutes(10);
        assert!(matches!(cd.check(), Err(RatingError::InvalidInput(_))));
    }

    #[test]
    fn test_usage_offset_and_truncation() {
        let mut cd = descriptor();
        assert!(cd.usage_offset().is_zero());

        cd.duration_index = Duration::minutes(90);
        assert_eq!(cd.usage_offset(), Duration::minutes(30));

        let cut = cd.truncated(Duration::minutes(10));
        assert_eq!(cut.duration(), Duration::minutes(10));
        assert_eq!(cut.duration_index, Duration::minutes(40));
    }

    #[test]
    fn test_units() {
        assert_eq!(
            ToR::Voice.units(Duration::milliseconds(1500)),
            Decimal::new(15, 1)
        );
        assert_eq!(ToR::Data.units(Duration::nanoseconds(1024)), Decimal::from(1024));
    }

    #[test]
    fn test_descriptor_json_defaults() {
        let cd: CallDescriptor = serde_json::from_str(
            r#"{"tenant":"vdf","category":"0","subject":"rif","destination":"0256",
                "time_start":"2012-02-02T17:30:00Z","time_end":"2012-02-02T18:30:00Z"}"#,
        )
        .unwrap();
        assert_eq!(cd, descriptor());
    }
}
