//! Run a listing against rows loaded from JSON.

use std::path::PathBuf;

use clap::Args;

use crmhub_core::result::AppResult;
use crmhub_core::types::{PageRequest, PageResponse};
use crmhub_query::MemoryDatabase;

use super::{Cli, ListingArgs, SchemaArgs};
use crate::output::{self, OutputFormat};

/// Arguments for the search command
#[derive(Debug, Args)]
pub struct SearchArgs {
    #[command(flatten)]
    pub schema: SchemaArgs,

    #[command(flatten)]
    pub listing: ListingArgs,

    /// JSON file of the form {"table": [{...}, ...]}
    #[arg(short, long)]
    pub data: PathBuf,

    /// Page to show (1-based); shows every row when absent
    #[arg(long)]
    pub page: Option<u64>,

    /// Rows per page
    #[arg(long, default_value_t = 25)]
    pub page_size: u64,
}

/// Execute the search command
pub async fn execute(args: &SearchArgs, cli: &Cli, format: OutputFormat) -> AppResult<()> {
    let mut config = cli.load_config()?;
    config.query.strict_rules = args.listing.strict;

    let registry = args.schema.registry().await?;
    let database = MemoryDatabase::from_json(&registry, &super::read_json(&args.data).await?)?;
    let service = super::listing_service(registry, &config)?;

    let ctx = args.listing.context()?;
    let mut query = service
        .build_query(&ctx, &args.schema.entity, &args.listing.request().await?)
        .await?;
    let page = args.page.map(|page| PageRequest::new(page, args.page_size));
    if let Some(page) = &page {
        service.paginate(&mut query, page);
    }
    let rows = database.execute(&query);

    let mut header: Vec<String> = if query.selects().is_empty() {
        query.entity().columns.keys().cloned().collect()
    } else {
        query.selects().iter().map(|column| column.output_name().to_string()).collect()
    };
    header.extend(query.aggregates().iter().map(|aggregate| aggregate.alias.clone()));

    let cells = rows
        .iter()
        .map(|row| {
            header
                .iter()
                .map(|column| row.get(column).map(ToString::to_string).unwrap_or_default())
                .collect()
        })
        .collect();
    match page {
        Some(page) => {
            let total = database.count(&query) as u64;
            output::print_rows(&header, cells, &PageResponse::new(rows, &page, total), format);
        }
        None => output::print_rows(&header, cells, &rows, format),
    }
    Ok(())
}
