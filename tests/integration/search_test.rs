//! Free-text search through the request criteria.

use crmhub::common::config::QueryConfig;
use crmhub::query::criteria::{RequestCriteria, RequestParams};
use crmhub::{Criteria, ErrorKind, Query};
use serde_json::json;

use crate::helpers;

fn search(params: serde_json::Value) -> crmhub::AppResult<Query> {
    let registry = helpers::registry();
    let context = helpers::context();
    let config = QueryConfig::default();
    let mut query = Query::new(registry.get("contacts").unwrap());
    RequestCriteria::new(RequestParams::from_value(&params)?, &registry, &context, &config).apply(&mut query)?;
    Ok(query)
}

#[test]
fn test_unknown_search_field_is_forbidden() {
    let err = search(json!({"q": "acme", "search_fields": "nonexistent_field"})).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Authorization);
    assert_eq!(err.status_code(), 403);
    assert!(err.message.contains("name, email"));
}

#[test]
fn test_search_matches_any_searchable_field() {
    let database = helpers::database(&helpers::contacts_document());
    let query = search(json!({"q": "corp"})).unwrap();
    assert_eq!(helpers::sorted_ids(&database, &query), vec![1, 6]);
}

#[test]
fn test_numeric_term_searches_primary_key() {
    let database = helpers::database(&helpers::contacts_document());
    let query = search(json!({"q": "4"})).unwrap();
    assert_eq!(database.ids(&query), vec![4]);
}

#[test]
fn test_search_and_order_and_take() {
    let database = helpers::database(&helpers::contacts_document());
    let query = search(json!({"q": "a", "search_fields": "name", "order": "score|desc", "take": 2})).unwrap();
    assert_eq!(database.ids(&query), vec![4, 1]);
}
