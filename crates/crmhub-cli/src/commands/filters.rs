//! Describe the filters an entity exposes.

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use crmhub_core::result::AppResult;
use crmhub_query::FilterSet;

use super::SchemaArgs;
use crate::output::{self, OutputFormat};

/// Arguments for the filters command
#[derive(Debug, Args)]
pub struct FiltersArgs {
    #[command(flatten)]
    pub schema: SchemaArgs,
}

#[derive(Serialize, Tabled)]
struct FilterRow {
    id: String,
    label: String,
    #[tabled(rename = "type")]
    filter_type: String,
    operators: String,
}

/// Execute the filters command
pub async fn execute(args: &FiltersArgs, format: OutputFormat) -> AppResult<()> {
    let registry = args.schema.registry().await?;
    let entity = registry.get(&args.schema.entity)?;
    let descriptions = FilterSet::from_schema(&entity)?.describe();

    match format {
        OutputFormat::Table => {
            let rows: Vec<FilterRow> = descriptions
                .iter()
                .map(|filter| FilterRow {
                    id: filter.id.clone(),
                    label: filter.label.clone(),
                    filter_type: filter.filter_type.to_string(),
                    operators: filter
                        .operators
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", "),
                })
                .collect();
            output::print_list(&rows, format);
        }
        OutputFormat::Json => output::print_item(&descriptions, format),
    }
    Ok(())
}
