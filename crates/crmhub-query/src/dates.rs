//! Relative date windows for the `is` and `was` operators.
//!
//! Every token resolves against a local "today" to a half-open
//! `[start, end)` range of local dates. Weeks start on Monday.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, FixedOffset, Months, NaiveDate, NaiveTime, TimeDelta, Utc};

use crate::error::CompileError;
use crate::filters::Operator;

/// A relative date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelativeDate {
    Today,
    NextDay,
    ThisWeek,
    NextWeek,
    ThisMonth,
    NextMonth,
    ThisQuarter,
    NextQuarter,
    ThisYear,
    NextYear,
    /// Today and the following `n` days.
    NextDays(u32),
    Yesterday,
    LastWeek,
    LastMonth,
    LastQuarter,
    LastYear,
    /// The previous `n` days and today.
    LastDays(u32),
}

const DAY_SPANS: [u32; 6] = [7, 14, 30, 60, 90, 365];

const IS_TOKENS: [RelativeDate; 16] = [
    RelativeDate::Today,
    RelativeDate::NextDay,
    RelativeDate::ThisWeek,
    RelativeDate::NextWeek,
    RelativeDate::ThisMonth,
    RelativeDate::NextMonth,
    RelativeDate::ThisQuarter,
    RelativeDate::NextQuarter,
    RelativeDate::ThisYear,
    RelativeDate::NextYear,
    RelativeDate::NextDays(7),
    RelativeDate::NextDays(14),
    RelativeDate::NextDays(30),
    RelativeDate::NextDays(60),
    RelativeDate::NextDays(90),
    RelativeDate::NextDays(365),
];

const WAS_TOKENS: [RelativeDate; 11] = [
    RelativeDate::Yesterday,
    RelativeDate::LastWeek,
    RelativeDate::LastMonth,
    RelativeDate::LastQuarter,
    RelativeDate::LastYear,
    RelativeDate::LastDays(7),
    RelativeDate::LastDays(14),
    RelativeDate::LastDays(30),
    RelativeDate::LastDays(60),
    RelativeDate::LastDays(90),
    RelativeDate::LastDays(365),
];

impl RelativeDate {
    /// Tokens accepted by `operator`; empty for anything but `is`/`was`.
    pub fn for_operator(operator: Operator) -> &'static [Self] {
        match operator {
            Operator::Is => &IS_TOKENS,
            Operator::Was => &WAS_TOKENS,
            _ => &[],
        }
    }

    /// Parse a token such as `today` or `last_30_days`.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim().to_ascii_lowercase();
        let fixed = match token.as_str() {
            "today" => Some(Self::Today),
            "next_day" | "tomorrow" => Some(Self::NextDay),
            "this_week" => Some(Self::ThisWeek),
            "next_week" => Some(Self::NextWeek),
            "this_month" => Some(Self::ThisMonth),
            "next_month" => Some(Self::NextMonth),
            "this_quarter" => Some(Self::ThisQuarter),
            "next_quarter" => Some(Self::NextQuarter),
            "this_year" => Some(Self::ThisYear),
            "next_year" => Some(Self::NextYear),
            "yesterday" => Some(Self::Yesterday),
            "last_week" => Some(Self::LastWeek),
            "last_month" => Some(Self::LastMonth),
            "last_quarter" => Some(Self::LastQuarter),
            "last_year" => Some(Self::LastYear),
            _ => None,
        };
        if fixed.is_some() {
            return fixed;
        }

        let span = |prefix: &str| {
            token
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_suffix("_days"))
                .and_then(|days| days.parse::<u32>().ok())
                .filter(|days| DAY_SPANS.contains(days))
        };
        span("next_")
            .map(Self::NextDays)
            .or_else(|| span("last_").map(Self::LastDays))
    }

    /// Wire token.
    pub fn as_token(&self) -> String {
        match self {
            Self::Today => "today".into(),
            Self::NextDay => "next_day".into(),
            Self::ThisWeek => "this_week".into(),
            Self::NextWeek => "next_week".into(),
            Self::ThisMonth => "this_month".into(),
            Self::NextMonth => "next_month".into(),
            Self::ThisQuarter => "this_quarter".into(),
            Self::NextQuarter => "next_quarter".into(),
            Self::ThisYear => "this_year".into(),
            Self::NextYear => "next_year".into(),
            Self::NextDays(days) => format!("next_{days}_days"),
            Self::Yesterday => "yesterday".into(),
            Self::LastWeek => "last_week".into(),
            Self::LastMonth => "last_month".into(),
            Self::LastQuarter => "last_quarter".into(),
            Self::LastYear => "last_year".into(),
            Self::LastDays(days) => format!("last_{days}_days"),
        }
    }

    /// Display label (`Last 30 days`).
    pub fn label(&self) -> String {
        let spaced = self.as_token().replace('_', " ");
        let mut chars = spaced.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    /// Whether the window lies in the past and belongs to `was`.
    pub fn is_past(&self) -> bool {
        matches!(
            self,
            Self::Yesterday
                | Self::LastWeek
                | Self::LastMonth
                | Self::LastQuarter
                | Self::LastYear
                | Self::LastDays(_)
        )
    }

    /// Operator the token belongs to.
    pub fn operator(&self) -> Operator {
        if self.is_past() { Operator::Was } else { Operator::Is }
    }

    /// Local date range `[start, end)` relative to `today`.
    pub fn resolve(&self, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        let days = |n: i64| today.checked_add_signed(TimeDelta::days(n));
        let week = today.week(chrono::Weekday::Mon).first_day();
        let month = today.with_day(1)?;
        let quarter = NaiveDate::from_ymd_opt(today.year(), quarter_start_month(today.month()), 1)?;
        let year = NaiveDate::from_ymd_opt(today.year(), 1, 1)?;
        let add_months = |date: NaiveDate, n: u32| date.checked_add_months(Months::new(n));
        let sub_months = |date: NaiveDate, n: u32| date.checked_sub_months(Months::new(n));
        let add_days = |date: NaiveDate, n: i64| date.checked_add_signed(TimeDelta::days(n));

        Some(match self {
            Self::Today => (today, days(1)?),
            Self::NextDay => (days(1)?, days(2)?),
            Self::ThisWeek => (week, add_days(week, 7)?),
            Self::NextWeek => (add_days(week, 7)?, add_days(week, 14)?),
            Self::ThisMonth => (month, add_months(month, 1)?),
            Self::NextMonth => (add_months(month, 1)?, add_months(month, 2)?),
            Self::ThisQuarter => (quarter, add_months(quarter, 3)?),
            Self::NextQuarter => (add_months(quarter, 3)?, add_months(quarter, 6)?),
            Self::ThisYear => (year, add_months(year, 12)?),
            Self::NextYear => (add_months(year, 12)?, add_months(year, 24)?),
            Self::NextDays(n) => (today, days(i64::from(*n) + 1)?),
            Self::Yesterday => (days(-1)?, today),
            Self::LastWeek => (add_days(week, -7)?, week),
            Self::LastMonth => (sub_months(month, 1)?, month),
            Self::LastQuarter => (sub_months(quarter, 3)?, quarter),
            Self::LastYear => (sub_months(year, 12)?, year),
            Self::LastDays(n) => (days(-i64::from(*n))?, days(1)?),
        })
    }
}

impl fmt::Display for RelativeDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_token())
    }
}

impl FromStr for RelativeDate {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| CompileError::invalid_value("", "is", format!("unknown relative date '{s}'")))
    }
}

fn quarter_start_month(month: u32) -> u32 {
    ((month - 1) / 3) * 3 + 1
}

/// The UTC instant of local midnight starting `date`.
pub fn local_midnight(date: NaiveDate, timezone: FixedOffset) -> DateTime<Utc> {
    let local = date.and_time(NaiveTime::MIN);
    (local - TimeDelta::seconds(i64::from(timezone.local_minus_utc()))).and_utc()
}
