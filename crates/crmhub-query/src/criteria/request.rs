//! Free-text search, ordering, projection and eager loading driven by
//! request parameters.

use std::sync::{Arc, LazyLock};

use crmhub_core::config::QueryConfig;
use crmhub_core::error::AppError;
use crmhub_core::result::AppResult;
use crmhub_core::types::SortField;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::builder::{Boolean, Column, CompareOp, OrderTarget, Query};
use crate::context::CompileContext;
use crate::error::CompileError;
use crate::filters::{Filter, FilterSet, Operator};
use crate::parser::Parser;
use crate::schema::{EntitySchema, SchemaRegistry, SearchOperator, SearchableColumn};

use super::Criteria;

static STRUCTURED_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_.]*)\s*:(.*)$").expect("invalid search pair regex"));

static NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9().\s-]*[0-9][0-9().\s-]*$").expect("invalid numeric regex"));

static AGGREGATE_ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(_count$)|(_exists$)|(_(sum|min|max|avg|exists)_)").expect("invalid aggregate regex")
});

/// How search predicates on several fields combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMatch {
    /// Every field must match.
    And,
    /// Any field may match.
    #[default]
    Or,
}

/// Listing parameters in their query-string shape.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RequestParams {
    /// Search text.
    #[serde(default)]
    pub q: Option<String>,
    /// `;` separated fields to search, optionally `field:operator`.
    #[serde(default)]
    pub search_fields: Option<String>,
    #[serde(default)]
    pub search_match: Option<SearchMatch>,
    /// Columns to project.
    #[serde(default, deserialize_with = "list_param")]
    pub select: Vec<String>,
    /// Relations to eager load.
    #[serde(default, deserialize_with = "list_param")]
    pub with: Vec<String>,
    #[serde(default, deserialize_with = "order_param")]
    pub order: Vec<SortField>,
    #[serde(default, deserialize_with = "take_param")]
    pub take: Option<u64>,
}

impl RequestParams {
    /// Parameters from a JSON object; unknown keys are ignored.
    pub fn from_value(value: &Value) -> AppResult<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn search(q: impl Into<String>) -> Self {
        Self {
            q: Some(q.into()),
            ..Self::default()
        }
    }

    fn requested_search_fields(&self) -> Option<Vec<(String, Option<SearchOperator>)>> {
        let fields: Vec<_> = self
            .search_fields
            .as_deref()?
            .split(';')
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .map(|field| match field.split_once(':') {
                Some((name, operator)) => (name.trim().to_string(), SearchOperator::parse(operator)),
                None => (field.to_string(), None),
            })
            .collect();
        (!fields.is_empty()).then_some(fields)
    }
}

/// Hook adding caller predicates to the search scope.
pub type SearchHook<'a> = Box<dyn Fn(&mut Query) -> Result<(), CompileError> + Send + Sync + 'a>;

/// Applies [`RequestParams`] to a listing query.
pub struct RequestCriteria<'a> {
    params: RequestParams,
    registry: &'a SchemaRegistry,
    context: &'a CompileContext,
    config: &'a QueryConfig,
    searchable: Option<Vec<SearchableColumn>>,
    hook: Option<SearchHook<'a>>,
}

impl<'a> RequestCriteria<'a> {
    pub fn new(
        params: RequestParams,
        registry: &'a SchemaRegistry,
        context: &'a CompileContext,
        config: &'a QueryConfig,
    ) -> Self {
        Self {
            params,
            registry,
            context,
            config,
            searchable: None,
            hook: None,
        }
    }

    /// Search these columns instead of the entity's declared ones.
    pub fn searchable_columns(mut self, columns: Vec<SearchableColumn>) -> Self {
        self.searchable = Some(columns);
        self
    }

    /// Add predicates to the search scope after the field predicates.
    pub fn with_search_hook(
        mut self,
        hook: impl Fn(&mut Query) -> Result<(), CompileError> + Send + Sync + 'a,
    ) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn params(&self) -> &RequestParams {
        &self.params
    }

    /// The searchable columns in effect, narrowed to the requested
    /// `search_fields`.
    ///
    /// Requesting only fields outside the searchable set is an
    /// authorization error listing the acceptable fields.
    pub fn active_fields(&self, entity: &EntitySchema) -> AppResult<Vec<SearchableColumn>> {
        let declared = self.searchable.as_deref().unwrap_or(&entity.searchable);
        let Some(requested) = self.params.requested_search_fields() else {
            return Ok(declared.to_vec());
        };

        let narrowed: Vec<SearchableColumn> = requested
            .iter()
            .filter_map(|(field, operator)| {
                declared
                    .iter()
                    .find(|column| column.field == *field)
                    .map(|column| SearchableColumn {
                        field: column.field.clone(),
                        operator: operator.unwrap_or(column.operator),
                    })
            })
            .collect();

        if narrowed.is_empty() {
            let requested: Vec<&str> = requested.iter().map(|(field, _)| field.as_str()).collect();
            let acceptable: Vec<&str> = declared.iter().map(|column| column.field.as_str()).collect();
            return Err(AppError::authorization(format!(
                "The search fields [{}] are not allowed, acceptable fields are: {}",
                requested.join(", "),
                acceptable.join(", ")
            )));
        }
        Ok(narrowed)
    }

    /// Whether `term` should be looked up by primary key only.
    pub fn is_primary_key_term(&self, term: &str) -> bool {
        !term.is_empty()
            && term.len() <= self.config.max_search_id_length
            && term.bytes().all(|byte| byte.is_ascii_digit())
            && !term.starts_with('0')
            && term.parse::<i64>().is_ok_and(|id| id >= 1)
    }

    fn apply_search(&self, query: &mut Query) -> AppResult<()> {
        let Some(text) = self.params.q.as_deref().map(str::trim).filter(|text| !text.is_empty()) else {
            return Ok(());
        };
        let entity = Arc::clone(query.entity());
        let fields = self.active_fields(&entity)?;
        let search = SearchText::parse(text, &fields);
        let explicit = self.params.requested_search_fields().is_some() || !search.pairs.is_empty();

        let mut matches = query.nested();
        match search.term.as_deref() {
            Some(term) if !explicit && self.is_primary_key_term(term) => {
                debug!(entity = %entity.name, term, "Searching by primary key");
                let id = term.parse::<i64>().map_err(|err| AppError::validation(err.to_string()))?;
                matches.where_column(&entity.primary_key, CompareOp::Eq, id, Boolean::And);
            }
            term => {
                let filters = FilterSet::default();
                let parser = Parser::new(&filters, self.registry, self.context);
                let mut search_fields = SearchFields {
                    parser: &parser,
                    match_all: self.params.search_match == Some(SearchMatch::And),
                    applied: 0,
                };

                for (field, value) in &search.pairs {
                    if let Some(column) = fields.iter().find(|column| column.field == *field) {
                        search_fields.apply(&mut matches, column, value)?;
                    }
                }
                if let Some(term) = term {
                    let numeric = NUMERIC.is_match(term);
                    for column in &fields {
                        if !numeric && self.is_key_field(&entity, &column.field) {
                            continue;
                        }
                        search_fields.apply(&mut matches, column, term)?;
                    }
                }
            }
        }

        let mut scope = query.nested();
        scope.add_nested(Boolean::And, matches);
        if let Some(hook) = &self.hook {
            hook(&mut scope)?;
        }
        query.inherit_removed_scopes(&scope);
        query.add_nested(Boolean::And, scope);
        Ok(())
    }

    fn is_key_field(&self, entity: &Arc<EntitySchema>, field: &str) -> bool {
        let path = self.registry.split_path(entity, field);
        match self.registry.walk(entity, &path.relations) {
            Ok(owner) => owner.is_key_column(&path.column),
            Err(_) => false,
        }
    }

    fn apply_order(&self, query: &mut Query) -> Result<(), CompileError> {
        if self.params.order.is_empty() {
            return Ok(());
        }
        query.forget_orders();
        for sort in &self.params.order {
            order_by_field(query, self.registry, sort)?;
        }
        Ok(())
    }

    fn apply_select(&self, query: &mut Query) -> Result<(), CompileError> {
        if self.params.select.is_empty() {
            return Ok(());
        }
        let entity = Arc::clone(query.entity());
        if let Some(unknown) = self.params.select.iter().find(|column| !entity.has_column(column)) {
            return Err(CompileError::UnknownColumn {
                entity: entity.name.clone(),
                column: unknown.clone(),
            });
        }
        query.select(std::iter::once(&entity.primary_key).chain(&self.params.select));
        Ok(())
    }

    fn apply_with(&self, query: &mut Query) -> Result<(), CompileError> {
        let entity = Arc::clone(query.entity());
        for relation in &self.params.with {
            let path: Vec<String> = relation.split('.').map(str::to_string).collect();
            self.registry.walk(&entity, &path)?;
        }
        query.with(self.params.with.iter().cloned());
        Ok(())
    }
}

impl Criteria for RequestCriteria<'_> {
    fn apply(&self, query: &mut Query) -> AppResult<()> {
        self.apply_search(query)?;
        self.apply_order(query)?;
        self.apply_select(query)?;
        self.apply_with(query)?;
        if let Some(take) = self.params.take.or(self.config.default_take) {
            query.limit(take);
        }
        Ok(())
    }
}

/// Order `query` by a column, a `relation|column` path or an aggregate
/// alias.
///
/// Relation columns are left joined; a path through a to-many relation
/// cannot be ordered by.
pub fn order_by_field(query: &mut Query, registry: &SchemaRegistry, sort: &SortField) -> Result<(), CompileError> {
    let field = sort.field.trim();
    let entity = Arc::clone(query.entity());
    if entity.has_column(field) {
        query.order_by_column(field, sort.direction);
        return Ok(());
    }
    if AGGREGATE_ALIAS.is_match(field) {
        query.order_by(OrderTarget::Alias(field.to_string()), sort.direction);
        return Ok(());
    }

    let path = registry.split_path(&entity, &field.replace('|', "."));
    if path.is_related() {
        let related = registry.walk(&entity, &path.relations)?;
        if !related.has_column(&path.column) {
            return Err(CompileError::UnknownColumn {
                entity: related.name.clone(),
                column: path.column,
            });
        }
        let alias = query.join_relation_path(registry, &path.relations)?;
        query.order_by(OrderTarget::Column(Column::field(alias, &path.column)), sort.direction);
        return Ok(());
    }

    Err(CompileError::UnknownColumn {
        entity: entity.name.clone(),
        column: field.to_string(),
    })
}

/// Search text split into `field:value` pairs and a generic term.
#[derive(Debug, Default, PartialEq)]
struct SearchText {
    pairs: Vec<(String, String)>,
    term: Option<String>,
}

impl SearchText {
    fn parse(text: &str, fields: &[SearchableColumn]) -> Self {
        let mut pairs = Vec::new();
        let mut generic = Vec::new();
        for segment in text.split(';') {
            let pair = STRUCTURED_PAIR
                .captures(segment)
                .map(|captures| (captures[1].to_string(), captures[2].trim().to_string()))
                .filter(|(field, _)| fields.iter().any(|column| column.field == *field));
            match pair {
                Some(pair) => pairs.push(pair),
                None => generic.push(segment),
            }
        }
        let term = generic.join(";").trim().to_string();
        Self {
            pairs,
            term: (!term.is_empty()).then_some(term),
        }
    }
}

struct SearchFields<'p> {
    parser: &'p Parser<'p>,
    match_all: bool,
    applied: usize,
}

impl SearchFields<'_> {
    /// Add the predicate for one field. Fields the value cannot be coerced
    /// for are skipped.
    fn apply(&mut self, query: &mut Query, column: &SearchableColumn, value: &str) -> Result<(), CompileError> {
        let operator = match column.operator {
            SearchOperator::Equal => Operator::Equal,
            SearchOperator::Like => Operator::Contains,
            SearchOperator::In => Operator::In,
        };
        let filter = Filter::text(&column.field, &column.field);
        let value = Value::String(value.to_string());
        let predicate = match self.parser.field_predicate(query, &column.field, &filter, operator, &value) {
            Ok(predicate) => predicate,
            Err(CompileError::InvalidValue { reason, .. }) => {
                debug!(field = %column.field, reason = %reason, "Skipping search field");
                None
            }
            Err(err) => return Err(err),
        };

        if let Some(predicate) = predicate {
            let boolean = if self.applied == 0 || self.match_all {
                Boolean::And
            } else {
                Boolean::Or
            };
            query.where_clause(boolean, predicate);
            self.applied += 1;
        }
        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListParam {
    Many(Vec<String>),
    One(String),
}

fn list_param<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Option::<ListParam>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(ListParam::Many(items)) => items
            .into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
        Some(ListParam::One(value)) => split_list(&value),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OrderItem {
    Field(SortField),
    Compact(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OrderParam {
    Many(Vec<OrderItem>),
    One(OrderItem),
}

impl OrderItem {
    fn into_fields(self) -> Vec<SortField> {
        match self {
            Self::Field(field) => vec![field],
            Self::Compact(value) => split_list(&value)
                .iter()
                .map(|item| SortField::parse_compact(item))
                .collect(),
        }
    }
}

fn order_param<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<SortField>, D::Error> {
    Ok(match Option::<OrderParam>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OrderParam::Many(items)) => items.into_iter().flat_map(OrderItem::into_fields).collect(),
        Some(OrderParam::One(item)) => item.into_fields(),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TakeParam {
    Number(u64),
    Text(String),
}

fn take_param<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Ok(match Option::<TakeParam>::deserialize(deserializer)? {
        Some(TakeParam::Number(take)) => Some(take),
        Some(TakeParam::Text(text)) => text.trim().parse().ok(),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use crmhub_core::error::ErrorKind;
    use crmhub_core::types::SortDirection;
    use serde_json::json;

    use super::*;
    use crate::builder::Predicate;
    use crate::memory::MemoryDatabase;
    use crate::schema::{ColumnType, Relation};

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new([
            EntitySchema::new("contacts", "contacts")
                .column("first_name", ColumnType::Text)
                .column("email", ColumnType::Text)
                .column("phone", ColumnType::Text)
                .column("user_id", ColumnType::Integer)
                .column("company_id", ColumnType::Integer)
                .relation("company", Relation::belongs_to("companies", "company_id"))
                .relation("owner", Relation::belongs_to("users", "user_id"))
                .relation("notes", Relation::has_many("notes", "contact_id"))
                .searchable("first_name", SearchOperator::Like)
                .searchable("email", SearchOperator::Equal)
                .searchable("phone", SearchOperator::Like)
                .searchable("user_id", SearchOperator::Equal)
                .searchable("company.name", SearchOperator::Like)
                .default_order(SortField::asc("id")),
            EntitySchema::new("companies", "companies").column("name", ColumnType::Text),
            EntitySchema::new("users", "users").column("name", ColumnType::Text),
            EntitySchema::new("notes", "notes")
                .column("contact_id", ColumnType::Integer)
                .column("body", ColumnType::Text),
        ])
        .unwrap()
    }

    fn database(registry: &SchemaRegistry) -> MemoryDatabase {
        MemoryDatabase::from_json(
            registry,
            &json!({
                "contacts": [
                    {"id": 1, "first_name": "Ann", "email": "ann@acme.test", "phone": "+1 555 0100", "user_id": 2, "company_id": 10},
                    {"id": 2, "first_name": "Bob", "email": "bob@globex.test", "phone": "0042", "user_id": 1, "company_id": 11},
                    {"id": 3, "first_name": "Acmed", "email": "cid@acme.test", "user_id": 1}
                ],
                "companies": [{"id": 10, "name": "Acme"}, {"id": 11, "name": "Globex"}],
                "notes": [{"id": 1, "contact_id": 1, "body": "hi"}]
            }),
        )
        .unwrap()
    }

    fn context() -> CompileContext {
        CompileContext::utc(Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap())
    }

    fn run(params: RequestParams) -> AppResult<(Query, Vec<i64>)> {
        let registry = registry();
        let context = context();
        let config = QueryConfig::default();
        let mut query = Query::new(registry.get("contacts").unwrap());
        RequestCriteria::new(params, &registry, &context, &config).apply(&mut query)?;
        let ids = database(&registry).ids(&query);
        Ok((query, ids))
    }

    #[test]
    fn test_term_is_searched_across_fields() {
        let (_, mut ids) = run(RequestParams::search("acme")).unwrap();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_match_all_requires_every_field() {
        let mut params = RequestParams::search("first_name:Ann;email:bob@globex.test");
        params.search_match = Some(SearchMatch::And);
        assert!(run(params).unwrap().1.is_empty());

        let params = RequestParams::search("first_name:Ann;email:bob@globex.test");
        let (_, mut ids) = run(params).unwrap();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_unknown_search_field_is_forbidden() {
        let mut params = RequestParams::search("ann");
        params.search_fields = Some("nonexistent_field".into());
        let err = run(params).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authorization);
        assert_eq!(err.status_code(), 403);
        assert!(err.message.contains("first_name, email, phone, user_id, company.name"));
    }

    #[test]
    fn test_search_fields_narrow_and_override_operator() {
        let mut params = RequestParams::search("ann");
        params.search_fields = Some("email:like;nonexistent".into());
        assert_eq!(run(params).unwrap().1, vec![1]);
    }

    #[test]
    fn test_numeric_term_searches_primary_key_only() {
        let (query, ids) = run(RequestParams::search("2")).unwrap();
        assert_eq!(ids, vec![2]);
        assert!(matches!(
            &query.wheres()[0].predicate,
            Predicate::Compare { op: CompareOp::Eq, .. }
        ));
    }

    #[test]
    fn test_zero_prefixed_and_phone_terms_scan_fields() {
        assert_eq!(run(RequestParams::search("0042")).unwrap().1, vec![2]);
        assert_eq!(run(RequestParams::search("555 0100")).unwrap().1, vec![1]);
    }

    #[test]
    fn test_key_columns_skipped_for_text_terms() {
        let registry = registry();
        let context = context();
        let config = QueryConfig::default();
        let mut query = Query::new(registry.get("contacts").unwrap());
        RequestCriteria::new(RequestParams::search("bob"), &registry, &context, &config)
            .apply(&mut query)
            .unwrap();
        let Predicate::Nested(clauses) = &query.wheres()[0].predicate else {
            panic!("expected a search group");
        };
        // first_name, email, phone and company.name; user_id is a key column
        assert_eq!(clauses.len(), 4);
        assert!(matches!(&clauses[3].predicate, Predicate::Exists { .. }));
    }

    #[test]
    fn test_hook_is_applied_in_search_scope() {
        let registry = registry();
        let context = context();
        let config = QueryConfig::default();
        let mut query = Query::new(registry.get("contacts").unwrap());
        RequestCriteria::new(RequestParams::search("acme"), &registry, &context, &config)
            .with_search_hook(|query| {
                query.where_column("user_id", CompareOp::Eq, 2, Boolean::And);
                Ok(())
            })
            .apply(&mut query)
            .unwrap();
        assert_eq!(query.wheres().len(), 1);
        assert_eq!(database(&registry).ids(&query), vec![1]);
    }

    #[test]
    fn test_order_by_relation_column_joins() {
        let params = RequestParams::from_value(&json!({"order": "company|name|desc"})).unwrap();
        let (query, ids) = run(params).unwrap();
        assert_eq!(query.joins().len(), 1);
        assert_eq!(query.orders().len(), 1);
        assert_eq!(query.orders()[0].direction, SortDirection::Desc);
        assert_eq!(ids[..2], [2, 1]);
    }

    #[test]
    fn test_order_replaces_existing_order() {
        let registry = registry();
        let context = context();
        let config = QueryConfig::default();
        let mut query = Query::new(registry.get("contacts").unwrap());
        query.order_by_column("id", SortDirection::Asc);
        let params = RequestParams::from_value(&json!({"order": [{"field": "first_name", "direction": "desc"}]})).unwrap();
        RequestCriteria::new(params, &registry, &context, &config)
            .apply(&mut query)
            .unwrap();
        assert_eq!(query.orders().len(), 1);
        assert_eq!(database(&registry).ids(&query), vec![2, 1, 3]);
    }

    #[test]
    fn test_order_by_aggregate_alias() {
        let params = RequestParams::from_value(&json!({"order": {"field": "notes_count", "direction": "desc"}})).unwrap();
        let (query, _) = run(params).unwrap();
        assert_eq!(query.orders()[0].target, OrderTarget::Alias("notes_count".into()));
    }

    #[test]
    fn test_invalid_orders_are_validation_errors() {
        for order in ["notes|body", "missing", "company|missing"] {
            let params = RequestParams::from_value(&json!({ "order": order })).unwrap();
            let err = run(params).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Validation, "{order}");
        }
    }

    #[test]
    fn test_params_accept_lists_and_strings() {
        let params = RequestParams::from_value(&json!({
            "select": "first_name; email",
            "with": ["company"],
            "order": "first_name|desc;id",
            "take": "5",
            "search_match": "and"
        }))
        .unwrap();
        assert_eq!(params.select, vec!["first_name", "email"]);
        assert_eq!(params.with, vec!["company"]);
        assert_eq!(params.order, vec![SortField::desc("first_name"), SortField::asc("id")]);
        assert_eq!(params.take, Some(5));
        assert_eq!(params.search_match, Some(SearchMatch::And));
    }

    #[test]
    fn test_select_with_and_take() {
        let params = RequestParams::from_value(&json!({"select": "first_name", "with": "company", "take": 2})).unwrap();
        let (query, ids) = run(params).unwrap();
        assert_eq!(query.selects().len(), 2);
        assert_eq!(query.eager_loads(), ["company".to_string()]);
        assert_eq!(query.limit_value(), Some(2));
        assert_eq!(ids.len(), 2);

        let params = RequestParams::from_value(&json!({"with": "ghosts"})).unwrap();
        assert_eq!(run(params).unwrap_err().kind, ErrorKind::Validation);
    }
}
