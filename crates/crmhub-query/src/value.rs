//! Bound values carried by compiled predicates.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;

use crate::schema::ColumnType;

/// A scalar value bound into a predicate.
///
/// Values are typed by the column they are compared against, not by the
/// JSON they arrived as: `"4"` bound to an integer column is `Integer(4)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryValue {
    /// SQL `NULL`.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// Text.
    Text(String),
    /// Calendar date without time.
    Date(NaiveDate),
    /// UTC instant.
    DateTime(DateTime<Utc>),
}

impl QueryValue {
    /// Whether the value is `NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Convert a JSON value into a value of the given column type.
    ///
    /// Returns `None` when the JSON cannot represent a value of that type.
    pub fn from_json(value: &serde_json::Value, column_type: ColumnType) -> Option<Self> {
        use serde_json::Value;

        if value.is_null() {
            return Some(Self::Null);
        }

        match column_type {
            ColumnType::Integer => match value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                    .map(Self::Integer),
                Value::String(s) => s.trim().parse().ok().map(Self::Integer),
                Value::Bool(b) => Some(Self::Integer(i64::from(*b))),
                _ => None,
            },
            ColumnType::Decimal => match value {
                Value::Number(n) => n.as_f64().map(Self::Float),
                Value::String(s) => s.trim().parse().ok().map(Self::Float),
                _ => None,
            },
            ColumnType::Boolean => match value {
                Value::Bool(b) => Some(Self::Bool(*b)),
                Value::Number(n) => n.as_i64().map(|n| Self::Bool(n != 0)),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => Some(Self::Bool(true)),
                    "0" | "false" | "no" | "off" => Some(Self::Bool(false)),
                    _ => None,
                },
                _ => None,
            },
            ColumnType::Date => value.as_str().and_then(parse_date).map(Self::Date),
            ColumnType::DateTime => value.as_str().and_then(parse_utc_datetime).map(Self::DateTime),
            ColumnType::Text | ColumnType::Time => match value {
                Value::String(s) => Some(Self::Text(s.clone())),
                Value::Number(n) => Some(Self::Text(n.to_string())),
                Value::Bool(b) => Some(Self::Text(b.to_string())),
                _ => None,
            },
            ColumnType::Json => Some(Self::Text(value.to_string())),
        }
    }

    /// Text form used for pattern matching.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            Self::Integer(n) => Some(n.to_string()),
            Self::Float(n) => Some(n.to_string()),
            Self::Text(s) => Some(s.clone()),
            Self::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Self::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }

    /// Compare two values the way a SQL engine would compare same-typed
    /// operands. `None` means the comparison is unknown (a `NULL` operand
    /// or incompatible types).
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Bool(a), Self::Integer(b)) => Some(i64::from(*a).cmp(b)),
            (Self::Integer(a), Self::Bool(b)) => Some(a.cmp(&i64::from(*b))),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::DateTime(a), Self::DateTime(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::DateTime(b)) => Some(start_of(*a).cmp(b)),
            (Self::DateTime(a), Self::Date(b)) => Some(a.cmp(&start_of(*b))),
            _ => None,
        }
    }

    /// Ordering used by `ORDER BY`: `NULL` sorts before everything else and
    /// incomparable values keep their relative order.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.compare(other).unwrap_or(Ordering::Equal),
        }
    }
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("NULL"),
        }
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<NaiveDate> for QueryValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<DateTime<Utc>> for QueryValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::DateTime(value)
    }
}

/// Parse `YYYY-MM-DD`, also accepting a trailing time part.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok().or_else(|| {
        value
            .get(..10)
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
    })
}

/// Parse a naive `YYYY-MM-DD HH:MM[:SS]` (or `T`-separated) local time.
pub fn parse_naive_datetime(value: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    let value = value.trim();
    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

/// Parse a stored datetime: RFC 3339, or a naive datetime taken as UTC.
pub fn parse_utc_datetime(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| parse_naive_datetime(value).map(|naive| naive.and_utc()))
        .or_else(|| parse_date(value).map(start_of))
}

fn start_of(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}
