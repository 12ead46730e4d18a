//! Random rule trees compiled and executed must select exactly the rows a
//! direct evaluation of the tree selects.

use proptest::prelude::*;
use serde_json::{Value, json};

use crate::helpers::{self, group, leaf};

/// Contacts of `helpers::contacts_document`, as the reference evaluator
/// sees them.
struct Contact {
    id: i64,
    name: Option<&'static str>,
    score: Option<i64>,
    notes: Vec<Option<&'static str>>,
}

fn contacts() -> Vec<Contact> {
    vec![
        Contact { id: 1, name: Some("Acme Corp"), score: Some(3), notes: vec![Some("Call back"), Some("sent quote")] },
        Contact { id: 2, name: Some("acme"), score: None, notes: vec![] },
        Contact { id: 3, name: None, score: Some(0), notes: vec![Some("call")] },
        Contact { id: 4, name: Some("Beta"), score: Some(5), notes: vec![Some("Meeting"), Some("call"), Some("CALL")] },
        Contact { id: 5, name: Some(""), score: Some(-1), notes: vec![None] },
        Contact { id: 6, name: Some("Zeta Corp"), score: Some(2), notes: vec![Some("quote")] },
    ]
}

#[derive(Debug, Clone)]
enum Node {
    Name(&'static str, &'static str),
    Score(&'static str, i64),
    ScoreBetween(i64, i64),
    Note(&'static str, &'static str),
    Group(bool, Vec<Node>),
}

const TEXT_OPERATORS: &[&str] = &[
    "equal",
    "not_equal",
    "contains",
    "not_contains",
    "begins_with",
    "not_begins_with",
    "ends_with",
    "is_null",
    "is_not_null",
    "is_empty",
];
const NUMBER_OPERATORS: &[&str] = &[
    "equal",
    "not_equal",
    "less",
    "less_or_equal",
    "greater",
    "greater_or_equal",
    "is_null",
    "is_not_null",
];
const WORDS: &[&str] = &["Acme", "acme", "Corp", "Beta", "ta", "", "zz"];
const NOTE_OPERATORS: &[&str] = &["contains", "begins_with", "equal"];
const NOTE_WORDS: &[&str] = &["call", "quote", "Meeting", "x"];

impl Node {
    fn to_rules(&self) -> Value {
        match self {
            Node::Name(operator, word) => leaf("name", operator, json!(word)),
            Node::Score(operator, value) => leaf("score", operator, json!(value)),
            Node::ScoreBetween(low, high) => leaf("score", "between", json!([low, high])),
            Node::Note(operator, word) => leaf("notes.body", operator, json!(word)),
            Node::Group(any, children) => group(
                if *any { "OR" } else { "AND" },
                children.iter().map(Node::to_rules).collect(),
            ),
        }
    }

    fn holds(&self, contact: &Contact) -> bool {
        match self {
            Node::Name(operator, word) => text_holds(contact.name, operator, word),
            Node::Score(operator, value) => match (*operator, contact.score) {
                ("is_null", score) => score.is_none(),
                ("is_not_null", score) => score.is_some(),
                (_, None) => false,
                ("equal", Some(score)) => score == *value,
                ("not_equal", Some(score)) => score != *value,
                ("less", Some(score)) => score < *value,
                ("less_or_equal", Some(score)) => score <= *value,
                ("greater", Some(score)) => score > *value,
                ("greater_or_equal", Some(score)) => score >= *value,
                (other, _) => unreachable!("unexpected operator {other}"),
            },
            Node::ScoreBetween(low, high) => contact.score.is_some_and(|score| *low <= score && score <= *high),
            Node::Note(operator, word) => contact.notes.iter().any(|body| text_holds(*body, operator, word)),
            Node::Group(true, children) => children.iter().any(|child| child.holds(contact)),
            Node::Group(false, children) => children.iter().all(|child| child.holds(contact)),
        }
    }
}

/// SQL semantics: any comparison with `NULL` is false; `LIKE` ignores case
/// and `=` does not.
fn text_holds(text: Option<&str>, operator: &str, word: &str) -> bool {
    match (operator, text) {
        ("is_null", text) => text.is_none(),
        ("is_not_null", text) => text.is_some(),
        ("is_empty", text) => text.is_none_or(str::is_empty),
        (_, None) => false,
        ("equal", Some(text)) => text == word,
        ("not_equal", Some(text)) => text != word,
        (operator, Some(text)) => {
            let (text, word) = (text.to_lowercase(), word.to_lowercase());
            match operator {
                "contains" => text.contains(&word),
                "not_contains" => !text.contains(&word),
                "begins_with" => text.starts_with(&word),
                "not_begins_with" => !text.starts_with(&word),
                "ends_with" => text.ends_with(&word),
                other => unreachable!("unexpected operator {other}"),
            }
        }
    }
}

fn leaf_strategy() -> impl Strategy<Value = Node> {
    prop_oneof![
        (prop::sample::select(TEXT_OPERATORS), prop::sample::select(WORDS))
            .prop_map(|(operator, word)| Node::Name(operator, word)),
        (prop::sample::select(NUMBER_OPERATORS), -2i64..7).prop_map(|(operator, value)| Node::Score(operator, value)),
        (-2i64..7, -2i64..7).prop_map(|(low, high)| Node::ScoreBetween(low, high)),
        (prop::sample::select(NOTE_OPERATORS), prop::sample::select(NOTE_WORDS))
            .prop_map(|(operator, word)| Node::Note(operator, word)),
    ]
}

fn tree_strategy() -> impl Strategy<Value = Node> {
    let node = leaf_strategy().prop_recursive(3, 24, 4, |inner| {
        (any::<bool>(), prop::collection::vec(inner, 1..4)).prop_map(|(any, children)| Node::Group(any, children))
    });
    (any::<bool>(), prop::collection::vec(node, 1..4)).prop_map(|(any, children)| Node::Group(any, children))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn test_compiled_rules_match_reference(tree in tree_strategy()) {
        let database = helpers::database(&helpers::contacts_document());
        let query = helpers::compile("contacts", &helpers::contact_filters(), tree.to_rules(), &helpers::context());

        let expected: Vec<i64> = contacts()
            .iter()
            .filter(|contact| tree.holds(contact))
            .map(|contact| contact.id)
            .collect();
        prop_assert_eq!(helpers::sorted_ids(&database, &query), expected);
    }
}
