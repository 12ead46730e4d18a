//! Request context carrying the acting user and their timezone.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crmhub_core::config::QueryConfig;
use crmhub_core::config::query::parse_utc_offset;
use crmhub_core::result::AppResult;
use crmhub_core::types::UserId;
use crmhub_query::CompileContext;

/// Context for the current authenticated request.
///
/// Authentication happens upstream; services only read who is acting and
/// whether they may manage system filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// The authenticated user's ID.
    pub user_id: UserId,
    /// Whether the user may manage filters shared by the system.
    #[serde(default)]
    pub is_super_admin: bool,
    /// The user's timezone as a UTC offset (`"-05:00"`).
    #[serde(default)]
    pub timezone: Option<String>,
    /// When the request was received; the `now` of every rule compiled for it.
    pub request_time: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            is_super_admin: false,
            timezone: None,
            request_time: Utc::now(),
        }
    }

    pub fn super_admin(mut self) -> Self {
        self.is_super_admin = true;
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// Pin the request time.
    pub fn at(mut self, request_time: DateTime<Utc>) -> Self {
        self.request_time = request_time;
        self
    }

    /// The user's timezone, else the application timezone.
    pub fn timezone_offset(&self, config: &QueryConfig) -> AppResult<FixedOffset> {
        match self.timezone.as_deref() {
            Some(timezone) => parse_utc_offset(timezone),
            None => config.timezone_offset(),
        }
    }

    /// Lenient compile context for this request.
    pub fn compile_context(&self, config: &QueryConfig) -> AppResult<CompileContext> {
        Ok(CompileContext::new(self.request_time, self.timezone_offset(config)?).with_user(self.user_id))
    }
}
