//! Per-compile context holding the reference instant and the acting user.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use crmhub_core::config::QueryConfig;
use crmhub_core::result::AppResult;
use crmhub_core::types::UserId;

/// What happens to leaves the compiler cannot use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValidationMode {
    /// Skip unknown fields, disallowed operators and ill-typed values.
    #[default]
    Lenient,
    /// Fail with a [`CompileError`](crate::error::CompileError).
    Strict,
}

/// Everything time or user dependent a compile pass reads.
///
/// Captured once per request; relative dates in every leaf of a tree
/// resolve against the same `now`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileContext {
    /// Reference instant.
    pub now: DateTime<Utc>,
    /// Timezone local dates are computed in.
    pub timezone: FixedOffset,
    /// Authenticated user, substituted for the `"me"` sentinel.
    pub user_id: Option<UserId>,
    /// Handling of unusable leaves.
    pub validation: ValidationMode,
}

impl CompileContext {
    /// Context at `now` in `timezone`, anonymous and lenient.
    pub fn new(now: DateTime<Utc>, timezone: FixedOffset) -> Self {
        Self {
            now,
            timezone,
            user_id: None,
            validation: ValidationMode::Lenient,
        }
    }

    /// Context at `now` using the configured application timezone.
    pub fn from_config(config: &QueryConfig, now: DateTime<Utc>) -> AppResult<Self> {
        Ok(Self::new(now, config.timezone_offset()?))
    }

    /// UTC context at `now`.
    pub fn utc(now: DateTime<Utc>) -> Self {
        Self::new(now, Utc.fix())
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn strict(mut self) -> Self {
        self.validation = ValidationMode::Strict;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.validation == ValidationMode::Strict
    }

    /// Today's date in the context timezone.
    pub fn local_today(&self) -> NaiveDate {
        self.now.with_timezone(&self.timezone).date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_local_today_uses_offset() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 23, 30, 0).unwrap();
        let context = CompileContext::new(now, FixedOffset::east_opt(3600).unwrap());
        assert_eq!(context.local_today(), NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
        assert_eq!(
            CompileContext::utc(now).local_today(),
            NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
        );
    }

    #[test]
    fn test_from_config() {
        let config = QueryConfig {
            timezone: "-05:00".into(),
            ..QueryConfig::default()
        };
        let context = CompileContext::from_config(&config, Utc::now()).unwrap();
        assert_eq!(context.timezone.local_minus_utc(), -5 * 3600);
        assert!(!context.is_strict());
        assert!(context.strict().is_strict());
    }
}
