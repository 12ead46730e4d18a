//! Connection to the PostgreSQL saved filter store.

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crmhub_core::config::DatabaseConfig;
use crmhub_core::error::{AppError, ErrorKind};

use crate::repositories::PgSavedFilterRepository;

/// Pool behind the saved filter repository.
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// Validate `config` and open the pool.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        config.validate()?;
        let url = mask_password(&config.url);
        info!(url = %url, max = config.max_connections, "Opening saved filter store");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout())
            .idle_timeout(config.idle_timeout())
            .connect(&config.url)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, format!("Cannot reach saved filter store at {url}: {e}"), e)
            })?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Repository over this pool.
    pub fn saved_filters(&self) -> PgSavedFilterRepository {
        PgSavedFilterRepository::new(self.pool.clone())
    }
}

/// Hide the password of a database URL before it is logged.
pub fn mask_password(url: &str) -> String {
    let scheme_end = url.find("://").map_or(0, |pos| pos + 3);
    let Some(at) = url[scheme_end..].rfind('@').map(|pos| pos + scheme_end) else {
        return url.to_string();
    };
    match url[scheme_end..at].find(':') {
        Some(colon) => format!("{}:****@{}", &url[..scheme_end + colon], &url[at + 1..]),
        None => url.to_string(),
    }
}
