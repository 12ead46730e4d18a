//! CLI command definitions and dispatch.

pub mod compile;
pub mod config;
pub mod filters;
pub mod migrate;
pub mod saved;
pub mod search;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};

use crmhub_core::config::{AppConfig, LoggingConfig};
use crmhub_core::error::AppError;
use crmhub_core::result::AppResult;
use crmhub_core::types::UserId;
use crmhub_database::MemorySavedFilterStore;
use crmhub_query::{EntitySchema, RequestParams, SchemaRegistry};
use crmhub_service::{ListingRequest, ListingService, RequestContext, ResourceCatalog, RuleSourceRequest};

use crate::output::OutputFormat;

/// CRMHub: compile CRM filter rules into queries
#[derive(Debug, Parser)]
#[command(name = "crmhub", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default")]
    pub config: String,

    /// Environment overlay loaded from config/{env}
    #[arg(long, default_value = "development")]
    pub env: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compile rules, search and ordering into SQL
    Compile(compile::CompileArgs),
    /// Describe the filters of an entity
    Filters(filters::FiltersArgs),
    /// Run a listing against a JSON data set
    Search(search::SearchArgs),
    /// Saved filter management
    Saved(saved::SavedArgs),
    /// Database migration management
    Migrate(migrate::MigrateArgs),
    /// Configuration management
    Config(config::ConfigArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> AppResult<()> {
        match &self.command {
            Commands::Compile(args) => compile::execute(args, self, self.format).await,
            Commands::Filters(args) => filters::execute(args, self.format).await,
            Commands::Search(args) => search::execute(args, self, self.format).await,
            Commands::Saved(args) => saved::execute(args, self, self.format).await,
            Commands::Migrate(args) => migrate::execute(args, self).await,
            Commands::Config(args) => config::execute(args, self, self.format).await,
        }
    }

    /// Load the configuration selected on the command line.
    pub fn load_config(&self) -> AppResult<AppConfig> {
        AppConfig::load(&self.config, &self.env)
    }

    /// Logging settings, falling back to defaults when the configuration
    /// cannot be loaded.
    pub fn logging_config(&self) -> LoggingConfig {
        self.load_config().map(|config| config.logging).unwrap_or_default()
    }
}

/// Entity schemas read from a JSON file.
#[derive(Debug, Args)]
pub struct SchemaArgs {
    /// JSON file holding an array of entity schemas
    #[arg(short, long)]
    pub schema: PathBuf,

    /// Entity to list
    #[arg(short, long)]
    pub entity: String,
}

impl SchemaArgs {
    pub async fn registry(&self) -> AppResult<SchemaRegistry> {
        let schemas: Vec<EntitySchema> = serde_json::from_value(read_json(&self.schema).await?)?;
        Ok(SchemaRegistry::new(schemas)?)
    }
}

/// Listing parameters shared by `compile` and `search`.
#[derive(Debug, Args)]
pub struct ListingArgs {
    /// Rule tree as JSON, or @path to a JSON file
    #[arg(short, long)]
    pub rules: Option<String>,

    /// Search text
    #[arg(short, long)]
    pub q: Option<String>,

    /// `;` separated fields to search
    #[arg(long)]
    pub search_fields: Option<String>,

    /// Combine field matches with `and` instead of `or`
    #[arg(long)]
    pub match_all: bool,

    /// Order such as `name|asc;id|desc`
    #[arg(short, long)]
    pub order: Option<String>,

    /// Maximum number of rows
    #[arg(short, long)]
    pub take: Option<u64>,

    /// Acting user, substituted for `me`
    #[arg(long, default_value_t = 1)]
    pub user: i64,

    /// User timezone as a UTC offset
    #[arg(long)]
    pub timezone: Option<String>,

    /// Reference instant for relative dates (RFC 3339)
    #[arg(long)]
    pub now: Option<String>,

    /// Reject rules that do not compile instead of skipping them
    #[arg(long)]
    pub strict: bool,
}

impl ListingArgs {
    pub fn context(&self) -> AppResult<RequestContext> {
        let mut ctx = RequestContext::new(UserId(self.user));
        if let Some(now) = &self.now {
            let now = DateTime::parse_from_rfc3339(now)
                .map_err(|e| AppError::validation(format!("Invalid --now '{now}': {e}")))?;
            ctx = ctx.at(now.with_timezone(&Utc));
        }
        if let Some(timezone) = &self.timezone {
            ctx = ctx.with_timezone(timezone);
        }
        Ok(ctx)
    }

    pub async fn rules(&self) -> AppResult<Option<Value>> {
        match self.rules.as_deref() {
            None => Ok(None),
            Some(path) if path.starts_with('@') => Ok(Some(read_json(Path::new(&path[1..])).await?)),
            Some(inline) => Ok(Some(serde_json::from_str(inline)?)),
        }
    }

    pub async fn request(&self) -> AppResult<ListingRequest> {
        let params = RequestParams::from_value(&json!({
            "q": self.q,
            "search_fields": self.search_fields,
            "search_match": if self.match_all { "and" } else { "or" },
            "order": self.order,
            "take": self.take,
        }))?;
        Ok(ListingRequest {
            params,
            source: RuleSourceRequest {
                rules: self.rules().await?,
                ..RuleSourceRequest::default()
            },
            view: None,
        })
    }
}

/// A listing service over `registry`, with every entity exposed as a
/// resource and no stored filters.
pub fn listing_service(registry: SchemaRegistry, config: &AppConfig) -> AppResult<ListingService> {
    let catalog = ResourceCatalog::from_registry(registry)?;
    Ok(ListingService::new(
        Arc::new(catalog),
        Arc::new(MemorySavedFilterStore::new()),
        config.query.clone(),
    ))
}

async fn read_json(path: &Path) -> AppResult<Value> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AppError::internal(format!("Failed to read '{}': {e}", path.display())))?;
    Ok(serde_json::from_str(&text)?)
}
