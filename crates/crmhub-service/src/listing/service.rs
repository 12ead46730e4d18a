use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crmhub_core::config::QueryConfig;
use crmhub_core::error::AppError;
use crmhub_core::result::AppResult;
use crmhub_core::types::PageRequest;
use crmhub_database::SavedFilterStore;
use crmhub_query::builder::CompiledSql;
use crmhub_query::criteria::request::order_by_field;
use crmhub_query::{
    CompileContext, Criteria, CriteriaStack, ExportCriteria, ExportPeriod, FilterRulesCriteria, Query,
    RequestCriteria, RequestParams, SqlGrammar, TableCriteria,
};

use crate::catalog::{Resource, ResourceCatalog};
use crate::context::RequestContext;
use crate::filter::{RuleSourceRequest, resolve_rule_source};

/// Parameters of a listing request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingRequest {
    #[serde(flatten)]
    pub params: RequestParams,
    #[serde(flatten)]
    pub source: RuleSourceRequest,
    /// View the default filter is looked up for, `table` when absent.
    #[serde(default)]
    pub view: Option<String>,
}

impl ListingRequest {
    fn view(&self) -> &str {
        self.view.as_deref().unwrap_or("table")
    }
}

/// Parameters of an export.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportRequest {
    #[serde(flatten)]
    pub source: RuleSourceRequest,
    /// Relative period token or `[start, end]` dates.
    #[serde(default)]
    pub period: Value,
}

/// Builds the query behind each listing of a resource.
#[derive(Clone)]
pub struct ListingService {
    catalog: Arc<ResourceCatalog>,
    store: Arc<dyn SavedFilterStore>,
    config: QueryConfig,
}

impl ListingService {
    pub fn new(catalog: Arc<ResourceCatalog>, store: Arc<dyn SavedFilterStore>, config: QueryConfig) -> Self {
        Self { catalog, store, config }
    }

    pub fn catalog(&self) -> &ResourceCatalog {
        &self.catalog
    }

    /// Query for an index request: the entity's default order, then the
    /// resolved rules, then search, order, select, eager loads and limit.
    pub async fn build_query(
        &self,
        ctx: &RequestContext,
        identifier: &str,
        request: &ListingRequest,
    ) -> AppResult<Query> {
        let resource = self.catalog.get(identifier)?;
        let rules = resolve_rule_source(self.store.as_ref(), &request.source, identifier, request.view(), ctx.user_id)
            .await?;
        let context = ctx.compile_context(&self.config)?;

        let mut query = self.base_query(&resource)?;
        for sort in &query.entity().default_order.clone() {
            order_by_field(&mut query, self.catalog.registry(), sort)?;
        }

        let registry = self.catalog.registry();
        let mut stack = CriteriaStack::new();
        if let Some(rules) = rules {
            stack = stack.push(FilterRulesCriteria::new(rules, &resource.filters, registry, &context));
        }
        stack
            .push(RequestCriteria::new(request.params.clone(), registry, &context, &self.config))
            .apply(&mut query)?;

        debug!(identifier, user_id = %ctx.user_id, clauses = query.wheres().len(), "Listing query built");
        Ok(query)
    }

    /// Query for the resource table: like [`ListingService::build_query`]
    /// but ordered through the table's column definitions.
    pub async fn build_table_query(
        &self,
        ctx: &RequestContext,
        identifier: &str,
        request: &ListingRequest,
    ) -> AppResult<Query> {
        let resource = self.catalog.get(identifier)?;
        let rules = resolve_rule_source(self.store.as_ref(), &request.source, identifier, request.view(), ctx.user_id)
            .await?;
        let context = ctx.compile_context(&self.config)?;
        let registry = self.catalog.registry();

        let mut params = request.params.clone();
        let order = std::mem::take(&mut params.order);

        let mut query = self.base_query(&resource)?;
        let mut stack = CriteriaStack::new();
        if let Some(rules) = rules {
            stack = stack.push(FilterRulesCriteria::new(rules, &resource.filters, registry, &context));
        }
        stack
            .push(RequestCriteria::new(params, registry, &context, &self.config))
            .push(TableCriteria::new(&resource.table_columns, order, registry))
            .apply(&mut query)?;
        Ok(query)
    }

    /// Query for an export: the resolved rules restricted to a period of
    /// the resource's export column, newest first.
    pub async fn build_export_query(
        &self,
        ctx: &RequestContext,
        identifier: &str,
        request: &ExportRequest,
    ) -> AppResult<Query> {
        let resource = self.catalog.get(identifier)?;
        let column = resource.export_column.clone().ok_or_else(|| {
            AppError::validation(format!("Resource '{identifier}' cannot be exported"))
        })?;
        let period = ExportPeriod::from_value(&request.period)?;
        let rules = resolve_rule_source(self.store.as_ref(), &request.source, identifier, "export", ctx.user_id).await?;
        let context = ctx.compile_context(&self.config)?;
        let registry = self.catalog.registry();

        let mut query = self.base_query(&resource)?;
        let mut stack = CriteriaStack::new();
        if let Some(rules) = rules {
            stack = stack.push(FilterRulesCriteria::new(rules, &resource.filters, registry, &context));
        }
        stack
            .push(ExportCriteria::new(column, period, &context))
            .apply(&mut query)?;
        Ok(query)
    }

    /// Compile a rule tree alone against a resource, for previews.
    pub fn compile_rules(&self, context: &CompileContext, identifier: &str, rules: Value) -> AppResult<Query> {
        let resource = self.catalog.get(identifier)?;
        let mut query = self.base_query(&resource)?;
        FilterRulesCriteria::new(rules, &resource.filters, self.catalog.registry(), context).apply(&mut query)?;
        Ok(query)
    }

    /// Restrict `query` to one page.
    pub fn paginate(&self, query: &mut Query, page: &PageRequest) {
        query.offset(page.offset()).limit(page.limit());
    }

    /// Render a query for the configured driver.
    pub fn render(&self, query: &Query) -> AppResult<CompiledSql> {
        SqlGrammar::new(self.config.driver).compile_select(query)
    }

    fn base_query(&self, resource: &Resource) -> AppResult<Query> {
        Ok(Query::new(self.catalog.entity(resource)?))
    }
}
