//! Rule compiler configuration.

use std::fmt;
use std::str::FromStr;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Storage driver the compiled SQL is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Driver {
    /// PostgreSQL (`pgsql`).
    Postgres,
    /// MySQL / MariaDB (`mysql`).
    MySql,
    /// SQLite (`sqlite`).
    Sqlite,
    /// Microsoft SQL Server (`sqlsrv`).
    SqlServer,
}

impl Driver {
    /// Return the configuration name of this driver.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "pgsql",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
            Self::SqlServer => "sqlsrv",
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Driver {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pgsql" | "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "sqlite" => Ok(Self::Sqlite),
            "sqlsrv" | "sqlserver" | "mssql" => Ok(Self::SqlServer),
            other => Err(AppError::not_implemented(format!(
                "Unsupported database driver [{other}]"
            ))),
        }
    }
}

impl TryFrom<String> for Driver {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Driver> for String {
    fn from(driver: Driver) -> Self {
        driver.as_str().to_string()
    }
}

/// Settings for the filter-rule compiler and the request criteria.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Driver used to render compiled queries.
    #[serde(default = "default_driver")]
    pub driver: Driver,
    /// Application timezone as a UTC offset (`"+02:00"`), used when the
    /// request does not carry a user timezone.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Validate rule trees strictly before saving filters.
    #[serde(default = "default_true")]
    pub strict_rules: bool,
    /// Longest numeric search term still treated as a primary key lookup.
    #[serde(default = "default_max_search_id_length")]
    pub max_search_id_length: usize,
    /// Limit applied to listings that do not pass `take`.
    #[serde(default)]
    pub default_take: Option<u64>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            timezone: default_timezone(),
            strict_rules: true,
            max_search_id_length: default_max_search_id_length(),
            default_take: None,
        }
    }
}

impl QueryConfig {
    /// Parse the configured application timezone.
    pub fn timezone_offset(&self) -> Result<FixedOffset, AppError> {
        parse_utc_offset(&self.timezone)
    }

    /// Check values that serde cannot check on its own.
    pub fn validate(&self) -> Result<(), AppError> {
        self.timezone_offset()?;
        if self.max_search_id_length == 0 {
            return Err(AppError::configuration(
                "query.max_search_id_length must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Parse `"UTC"`, `"Z"`, `"+02:00"`, `"-0530"` style offsets.
pub fn parse_utc_offset(value: &str) -> Result<FixedOffset, AppError> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("utc") || trimmed == "Z" || trimmed.is_empty() {
        return FixedOffset::east_opt(0)
            .ok_or_else(|| AppError::configuration("Invalid UTC offset"));
    }

    let (sign, rest) = match trimmed.as_bytes()[0] {
        b'+' => (1, &trimmed[1..]),
        b'-' => (-1, &trimmed[1..]),
        _ => {
            return Err(AppError::configuration(format!(
                "Invalid timezone offset '{value}', expected e.g. +02:00"
            )));
        }
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::configuration(format!(
            "Invalid timezone offset '{value}', expected e.g. +02:00"
        )));
    }

    let hours: i32 = digits[..2].parse().unwrap_or(0);
    let minutes: i32 = digits[2..].parse().unwrap_or(0);
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| AppError::configuration(format!("Timezone offset '{value}' out of range")))
}

fn default_driver() -> Driver {
    Driver::Postgres
}

fn default_timezone() -> String {
    "+00:00".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_search_id_length() -> usize {
    20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_aliases() {
        assert_eq!("pgsql".parse::<Driver>().unwrap(), Driver::Postgres);
        assert_eq!("MariaDB".parse::<Driver>().unwrap(), Driver::MySql);
        assert_eq!("sqlsrv".parse::<Driver>().unwrap(), Driver::SqlServer);
    }

    #[test]
    fn test_unknown_driver_is_not_implemented() {
        let err = "oracle".parse::<Driver>().unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::NotImplemented);
        assert!(err.message.contains("oracle"));
    }

    #[test]
    fn test_parse_offsets() {
        assert_eq!(parse_utc_offset("UTC").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_utc_offset("+02:00").unwrap().local_minus_utc(), 7200);
        assert_eq!(parse_utc_offset("-0530").unwrap().local_minus_utc(), -19800);
        assert!(parse_utc_offset("Europe/Berlin").is_err());
        assert!(parse_utc_offset("+2").is_err());
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: QueryConfig = serde_json::from_str(r#"{"driver": "sqlite"}"#).unwrap();
        assert_eq!(config.driver, Driver::Sqlite);
        assert_eq!(config.max_search_id_length, 20);
        assert!(config.strict_rules);
        assert!(config.validate().is_ok());
    }
}
