//! Compile a listing request into SQL.

use clap::Args;
use serde_json::json;

use crmhub_core::config::Driver;
use crmhub_core::result::AppResult;
use crmhub_query::SqlGrammar;

use super::{Cli, ListingArgs, SchemaArgs};
use crate::output::{self, OutputFormat};

/// Arguments for the compile command
#[derive(Debug, Args)]
pub struct CompileArgs {
    #[command(flatten)]
    pub schema: SchemaArgs,

    #[command(flatten)]
    pub listing: ListingArgs,

    /// Render for this driver instead of the configured one
    #[arg(long)]
    pub driver: Option<Driver>,
}

/// Execute the compile command
pub async fn execute(args: &CompileArgs, cli: &Cli, format: OutputFormat) -> AppResult<()> {
    let mut config = cli.load_config()?;
    config.query.strict_rules = args.listing.strict;
    if let Some(driver) = args.driver {
        config.query.driver = driver;
    }

    let service = super::listing_service(args.schema.registry().await?, &config)?;
    let ctx = args.listing.context()?;
    let request = args.listing.request().await?;
    if let Some(rules) = &request.source.rules {
        let resource = service.catalog().get(&args.schema.entity)?;
        super::saved::validator(service.catalog(), &config).validate_rules(&ctx, &resource, rules)?;
    }

    let query = service.build_query(&ctx, &args.schema.entity, &request).await?;
    let compiled = SqlGrammar::new(config.query.driver).compile_select(&query)?;

    match format {
        OutputFormat::Table => {
            println!("{}", compiled.sql);
            for (index, binding) in compiled.bindings.iter().enumerate() {
                output::print_kv(&format!("${}", index + 1), &binding.to_string());
            }
        }
        OutputFormat::Json => output::print_item(
            &json!({ "sql": compiled.sql, "bindings": compiled.bindings }),
            format,
        ),
    }
    Ok(())
}
