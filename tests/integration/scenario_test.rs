//! Concrete listings with known answers.

use chrono::{FixedOffset, TimeZone, Utc};
use serde_json::json;

use crmhub::CompileContext;
use crmhub::common::types::UserId;

use crate::helpers::{self, group, leaf};

fn activities() -> serde_json::Value {
    json!({"activities": [
        {"id": 1, "title": "Acme Corp", "activity_type_id": 2, "due_date": "2024-03-09", "user_id": 1},
        {"id": 2, "title": "Beta", "activity_type_id": 4, "due_date": "2024-03-10", "user_id": 2},
        {"id": 3, "title": "Acme Corp", "activity_type_id": 4, "due_date": "2024-03-11", "user_id": 1},
        {"id": 4, "title": "Gamma", "activity_type_id": 4, "due_date": "2024-03-17", "user_id": 3},
        {"id": 5, "title": "Acme", "activity_type_id": 1, "due_date": "2024-03-18", "user_id": 2}
    ]})
}

#[test]
fn test_title_and_type_select_single_activity() {
    let database = helpers::database(&activities());
    let query = helpers::compile(
        "activities",
        &helpers::activity_filters(),
        group(
            "AND",
            vec![
                leaf("title", "like", json!("Acme")),
                leaf("activity_type_id", "=", json!(4)),
            ],
        ),
        &helpers::context(),
    );
    assert_eq!(helpers::sorted_ids(&database, &query), vec![3]);
}

#[test]
fn test_today_or_next_week() {
    let mut document = activities();
    document["activities"]
        .as_array_mut()
        .unwrap()
        .extend([
            json!({"id": 6, "title": "Undated", "activity_type_id": 1, "due_date": null}),
            json!({"id": 7, "title": "Later", "activity_type_id": 1, "due_date": "2024-03-25"}),
        ]);
    let database = helpers::database(&document);

    let query = helpers::compile(
        "activities",
        &helpers::activity_filters(),
        group(
            "OR",
            vec![
                leaf("due_date", "is", json!("today")),
                leaf("due_date", "is", json!("next_week")),
            ],
        ),
        &helpers::context(),
    );
    assert_eq!(helpers::sorted_ids(&database, &query), vec![2, 3, 4]);
}

#[test]
fn test_next_week_on_datetime_column_uses_timezone() {
    let database = helpers::database(&json!({"activities": [
        {"id": 1, "title": "a", "reminder_at": "2024-03-10T23:30:00Z"},
        {"id": 2, "title": "b", "reminder_at": "2024-03-17T21:59:59Z"},
        {"id": 3, "title": "c", "reminder_at": "2024-03-17T22:00:00Z"},
        {"id": 4, "title": "d", "reminder_at": "2024-03-10T21:00:00Z"}
    ]}));
    // 2024-03-10T00:00 UTC is still Sunday at +02:00
    let context = CompileContext::new(
        Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap(),
        FixedOffset::east_opt(2 * 3600).unwrap(),
    );
    let query = helpers::compile(
        "activities",
        &helpers::activity_filters(),
        group("AND", vec![leaf("reminder_at", "is", json!("next_week"))]),
        &context,
    );
    assert_eq!(helpers::sorted_ids(&database, &query), vec![1, 2]);
}

#[test]
fn test_me_resolves_to_acting_user_only() {
    let database = helpers::database(&activities());
    let rules = group(
        "OR",
        vec![
            leaf("user_id", "equal", json!("me")),
            leaf("title", "equal", json!("Gamma")),
        ],
    );

    let for_user = |user: i64| {
        let context = helpers::context().with_user(UserId(user));
        let query = helpers::compile("activities", &helpers::activity_filters(), rules.clone(), &context);
        helpers::sorted_ids(&database, &query)
    };
    assert_eq!(for_user(1), vec![1, 3, 4]);
    assert_eq!(for_user(2), vec![2, 4, 5]);
}

#[test]
fn test_corrupted_rules_list_everything() {
    let database = helpers::database(&activities());
    for rules in [json!("{not json"), json!(42), json!({"type": "group", "query": {"children": []}})] {
        let query = helpers::compile("activities", &helpers::activity_filters(), rules, &helpers::context());
        assert_eq!(helpers::sorted_ids(&database, &query), vec![1, 2, 3, 4, 5]);
    }
}
