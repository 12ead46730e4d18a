//! Shared schemas, filters and data sets.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};

use crmhub::query::criteria::FilterRulesCriteria;
use crmhub::query::schema::{ColumnType, Relation, SearchOperator};
use crmhub::query::{EntitySchema, Filter, MemoryDatabase};
use crmhub::{CompileContext, Criteria, FilterSet, Query, SchemaRegistry};

/// `now` of the date scenarios.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap()
}

pub fn context() -> CompileContext {
    CompileContext::utc(now())
}

/// Activities, contacts and their notes.
pub fn registry() -> SchemaRegistry {
    SchemaRegistry::new([
        EntitySchema::new("activities", "activities")
            .column("title", ColumnType::Text)
            .column("activity_type_id", ColumnType::Integer)
            .column("due_date", ColumnType::Date)
            .column("reminder_at", ColumnType::DateTime)
            .column("user_id", ColumnType::Integer),
        EntitySchema::new("contacts", "contacts")
            .column("name", ColumnType::Text)
            .column("score", ColumnType::Integer)
            .column("email", ColumnType::Text)
            .column("company_id", ColumnType::Integer)
            .relation("company", Relation::belongs_to("companies", "company_id"))
            .relation("notes", Relation::has_many("notes", "contact_id"))
            .searchable("name", SearchOperator::Like)
            .searchable("email", SearchOperator::Like),
        EntitySchema::new("companies", "companies").column("name", ColumnType::Text),
        EntitySchema::new("notes", "notes")
            .column("contact_id", ColumnType::Integer)
            .column("body", ColumnType::Text),
    ])
    .unwrap()
}

pub fn activity_filters() -> FilterSet {
    FilterSet::new([
        Filter::text("title", "Title"),
        Filter::number("activity_type_id", "Activity type"),
        Filter::date("due_date", "Due date"),
        Filter::date_time("reminder_at", "Reminder"),
        Filter::user("user_id", "Owner", vec![]),
    ])
    .unwrap()
}

pub fn contact_filters() -> FilterSet {
    FilterSet::new([
        Filter::text("name", "Name"),
        Filter::number("score", "Score"),
        Filter::text("company.name", "Company"),
        Filter::text("notes.body", "Note"),
    ])
    .unwrap()
}

/// Contacts with their notes; contact 5 has one note without a body.
pub fn contacts_document() -> Value {
    json!({
        "contacts": [
            {"id": 1, "name": "Acme Corp", "score": 3, "company_id": 10},
            {"id": 2, "name": "acme", "score": null, "company_id": 11},
            {"id": 3, "name": null, "score": 0},
            {"id": 4, "name": "Beta", "score": 5, "company_id": 10},
            {"id": 5, "name": "", "score": -1},
            {"id": 6, "name": "Zeta Corp", "score": 2, "company_id": 11}
        ],
        "companies": [{"id": 10, "name": "Initech"}, {"id": 11, "name": "Globex"}],
        "notes": [
            {"id": 1, "contact_id": 1, "body": "Call back"},
            {"id": 2, "contact_id": 1, "body": "sent quote"},
            {"id": 3, "contact_id": 3, "body": "call"},
            {"id": 4, "contact_id": 4, "body": "Meeting"},
            {"id": 5, "contact_id": 4, "body": "call"},
            {"id": 6, "contact_id": 4, "body": "CALL"},
            {"id": 7, "contact_id": 5, "body": null},
            {"id": 8, "contact_id": 6, "body": "quote"}
        ]
    })
}

pub fn database(document: &Value) -> MemoryDatabase {
    MemoryDatabase::from_json(&registry(), document).unwrap()
}

/// Apply `rules` to a fresh query on `entity`.
pub fn compile(entity: &str, filters: &FilterSet, rules: Value, context: &CompileContext) -> Query {
    let registry = registry();
    let mut query = Query::new(registry.get(entity).unwrap());
    FilterRulesCriteria::new(rules, filters, &registry, context)
        .apply(&mut query)
        .unwrap();
    query
}

/// Sorted primary keys matched by `query`.
pub fn sorted_ids(database: &MemoryDatabase, query: &Query) -> Vec<i64> {
    let mut ids = database.ids(query);
    ids.sort_unstable();
    ids
}

pub fn leaf(rule: &str, operator: &str, value: Value) -> Value {
    json!({"type": "rule", "query": {"rule": rule, "operator": operator, "value": value}})
}

pub fn group(condition: &str, children: Vec<Value>) -> Value {
    json!({"type": "group", "query": {"condition": condition, "children": children}})
}
