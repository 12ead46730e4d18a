//! Relation-qualified leaves.

use serde_json::json;

use crmhub::query::parser::{Parser, RuleParser};
use crmhub::{Query, RuleTree};

use crate::helpers::{self, group, leaf};

#[test]
fn test_to_many_leaf_in_or_group_does_not_duplicate_rows() {
    let database = helpers::database(&helpers::contacts_document());
    let query = helpers::compile(
        "contacts",
        &helpers::contact_filters(),
        group(
            "OR",
            vec![
                leaf("notes.body", "contains", json!("call")),
                leaf("name", "equal", json!("Zeta Corp")),
            ],
        ),
        &helpers::context(),
    );
    // contact 4 has three matching notes
    assert!(query.joins().is_empty());
    assert_eq!(database.ids(&query).iter().filter(|id| **id == 4).count(), 1);
    assert_eq!(helpers::sorted_ids(&database, &query), vec![1, 3, 4, 6]);
}

#[test]
fn test_to_one_leaf_compiles_through_join() {
    let database = helpers::database(&helpers::contacts_document());
    let query = helpers::compile(
        "contacts",
        &helpers::contact_filters(),
        group(
            "AND",
            vec![
                leaf("company.name", "equal", json!("Initech")),
                leaf("score", "greater", json!(3)),
            ],
        ),
        &helpers::context(),
    );
    assert_eq!(query.joins().len(), 1);
    assert_eq!(helpers::sorted_ids(&database, &query), vec![4]);
}

#[test]
fn test_join_and_subquery_parsers_agree() {
    let database = helpers::database(&helpers::contacts_document());
    let registry = helpers::registry();
    let filters = helpers::contact_filters();
    let context = helpers::context();
    let rules = group(
        "OR",
        vec![
            leaf("company.name", "begins_with", json!("glo")),
            group(
                "AND",
                vec![
                    leaf("notes.body", "contains", json!("quote")),
                    leaf("company.name", "is_null", json!(null)),
                ],
            ),
        ],
    );

    let joined = helpers::compile("contacts", &filters, rules.clone(), &context);
    let tree = RuleTree::parse(&rules).unwrap();
    let mut nested = Query::new(registry.get("contacts").unwrap());
    Parser::new(&filters, &registry, &context)
        .parse(&tree, &mut nested)
        .unwrap();

    assert_eq!(joined.joins().len(), 1);
    assert!(nested.joins().is_empty());
    assert_eq!(helpers::sorted_ids(&database, &joined), vec![2, 6]);
    assert_eq!(helpers::sorted_ids(&database, &nested), vec![2, 6]);
}
