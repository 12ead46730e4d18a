//! Saved filter management commands.

use std::sync::Arc;

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crmhub_core::config::AppConfig;
use crmhub_core::result::AppResult;
use crmhub_core::types::{SavedFilterId, UserId};
use crmhub_database::{DatabasePool, MemorySavedFilterStore, SavedFilterStore};
use crmhub_service::{RequestContext, ResourceCatalog, SavedFilterService};

use super::Cli;
use crate::output::{self, OutputFormat};

/// Arguments for saved filter commands
#[derive(Debug, Args)]
pub struct SavedArgs {
    /// Acting user
    #[arg(long, global = true, default_value_t = 1)]
    pub user: i64,

    /// Act as a super admin
    #[arg(long, global = true)]
    pub admin: bool,

    /// Saved filter subcommand
    #[command(subcommand)]
    pub command: SavedCommand,
}

/// Saved filter subcommands
#[derive(Debug, Subcommand)]
pub enum SavedCommand {
    /// List the filters of a listing visible to the user
    List {
        /// Listing identifier
        identifier: String,
    },
    /// Make a filter the default of its view
    Default {
        /// Filter ID
        id: i64,
    },
    /// Stop using a filter as default
    Undefault {
        /// Filter ID
        id: i64,
    },
    /// Delete a filter
    Delete {
        /// Filter ID
        id: i64,
    },
}

#[derive(Serialize, Tabled)]
struct SavedFilterRow {
    id: i64,
    name: String,
    view: String,
    owner: String,
    default: bool,
    readonly: bool,
}

/// A service that validates rules without storage access.
pub fn validator(catalog: &ResourceCatalog, config: &AppConfig) -> SavedFilterService {
    SavedFilterService::new(
        Arc::new(MemorySavedFilterStore::new()),
        Arc::new(catalog.clone()),
        config.query.clone(),
    )
}

/// Execute saved filter commands
pub async fn execute(args: &SavedArgs, cli: &Cli, format: OutputFormat) -> AppResult<()> {
    let config = cli.load_config()?;
    let pool = DatabasePool::connect(&config.database).await?;
    let store: Arc<dyn SavedFilterStore> = Arc::new(pool.saved_filters());

    let mut ctx = RequestContext::new(UserId(args.user));
    if args.admin {
        ctx = ctx.super_admin();
    }
    let service = SavedFilterService::new(store.clone(), Arc::new(ResourceCatalog::default()), config.query);

    match &args.command {
        SavedCommand::List { identifier } => {
            let rows: Vec<SavedFilterRow> = store
                .list_visible(identifier, ctx.user_id)
                .await?
                .into_iter()
                .map(|filter| SavedFilterRow {
                    id: filter.id.get(),
                    owner: filter
                        .user_id
                        .map(|user| user.to_string())
                        .unwrap_or_else(|| "system".to_string()),
                    name: filter.name,
                    view: filter.view,
                    default: filter.is_default,
                    readonly: filter.is_readonly || filter.is_system_default,
                })
                .collect();
            output::print_list(&rows, format);
        }
        SavedCommand::Default { id } => {
            let filter = service.mark_as_default(&ctx, SavedFilterId(*id)).await?;
            output::print_success(&format!("'{}' is now the default {} filter", filter.name, filter.view));
        }
        SavedCommand::Undefault { id } => {
            let filter = service.unmark_default(&ctx, SavedFilterId(*id)).await?;
            output::print_success(&format!("'{}' is no longer a default", filter.name));
        }
        SavedCommand::Delete { id } => {
            service.delete(&ctx, SavedFilterId(*id)).await?;
            output::print_success(&format!("Saved filter {id} deleted"));
        }
    }

    pool.pool().close().await;
    Ok(())
}
