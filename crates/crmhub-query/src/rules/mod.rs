//! The rule tree clients submit.
//!
//! ```json
//! {"type": "group", "query": {"condition": "AND", "children": [
//!     {"type": "rule", "query": {"rule": "title", "operator": "contains", "value": "Acme"}}
//! ]}}
//! ```

pub mod special;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::builder::Boolean;
use crate::error::CompileError;

pub use special::substitute_special_values;

/// How the children of a group combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

impl From<Condition> for Boolean {
    fn from(condition: Condition) -> Self {
        match condition {
            Condition::And => Boolean::And,
            Condition::Or => Boolean::Or,
        }
    }
}

/// A node of the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "query", rename_all = "lowercase")]
pub enum RuleNode {
    Group(RuleGroup),
    Rule(RuleLeaf),
}

/// A parenthesised group of nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleGroup {
    #[serde(default)]
    pub condition: Condition,
    #[serde(default)]
    pub children: Vec<RuleNode>,
}

/// A single condition on a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleLeaf {
    /// Filter id, possibly relation-qualified (`company.name`).
    pub rule: String,
    /// Operator token as submitted.
    pub operator: String,
    /// Selected operand of an operand filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operand: Option<String>,
    #[serde(default)]
    pub value: Value,
}

impl RuleGroup {
    pub fn new(condition: Condition, children: Vec<RuleNode>) -> Self {
        Self {
            condition,
            children,
        }
    }
}

impl RuleLeaf {
    pub fn new(rule: impl Into<String>, operator: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            rule: rule.into(),
            operator: operator.into(),
            operand: None,
            value: value.into(),
        }
    }

    pub fn with_operand(mut self, operand: impl Into<String>) -> Self {
        self.operand = Some(operand.into());
        self
    }
}

impl RuleNode {
    /// Group node.
    pub fn group(condition: Condition, children: Vec<RuleNode>) -> Self {
        Self::Group(RuleGroup::new(condition, children))
    }

    /// Leaf node.
    pub fn rule(rule: impl Into<String>, operator: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Rule(RuleLeaf::new(rule, operator, value))
    }
}

/// A validated tree: a root group with at least one child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "RuleNode", try_from = "RuleNode")]
pub struct RuleTree {
    root: RuleGroup,
}

impl RuleTree {
    /// Wrap a root group.
    pub fn new(root: RuleGroup) -> Result<Self, CompileError> {
        if root.children.is_empty() {
            return Err(CompileError::malformed("the root group has no rules"));
        }
        Ok(Self { root })
    }

    /// Parse a stored or submitted payload.
    ///
    /// Accepts a group node, a bare group body, an array of nodes (joined
    /// with `AND`) or a string holding any of these as JSON.
    pub fn parse(payload: &Value) -> Result<Self, CompileError> {
        match payload {
            Value::Null => Err(CompileError::malformed("no rules given")),
            Value::String(text) => {
                let decoded: Value = serde_json::from_str(text)
                    .map_err(|e| CompileError::malformed(format!("invalid JSON: {e}")))?;
                if decoded.is_string() {
                    return Err(CompileError::malformed("rules must be an object or array"));
                }
                Self::parse(&decoded)
            }
            Value::Array(_) => {
                let children: Vec<RuleNode> = serde_json::from_value(payload.clone())
                    .map_err(|e| CompileError::malformed(e.to_string()))?;
                Self::new(RuleGroup::new(Condition::And, children))
            }
            Value::Object(object) if object.contains_key("type") => {
                match serde_json::from_value::<RuleNode>(payload.clone())
                    .map_err(|e| CompileError::malformed(e.to_string()))?
                {
                    RuleNode::Group(group) => Self::new(group),
                    RuleNode::Rule(_) => Err(CompileError::malformed("the root must be a group")),
                }
            }
            Value::Object(object) if object.contains_key("children") => {
                let group: RuleGroup = serde_json::from_value(payload.clone())
                    .map_err(|e| CompileError::malformed(e.to_string()))?;
                Self::new(group)
            }
            _ => Err(CompileError::malformed("rules must be a group or an array of rules")),
        }
    }

    /// Lenient variant of [`RuleTree::parse`]: an unusable payload means
    /// no filter.
    pub fn from_value(payload: &Value) -> Option<Self> {
        if payload.is_null() {
            return None;
        }
        match Self::parse(payload) {
            Ok(tree) => Some(tree),
            Err(err) => {
                warn!(error = %err, "Ignoring malformed rule tree");
                None
            }
        }
    }

    pub fn root(&self) -> &RuleGroup {
        &self.root
    }

    pub fn into_root(self) -> RuleGroup {
        self.root
    }

    /// Every leaf, depth first.
    pub fn leaves(&self) -> Vec<&RuleLeaf> {
        fn collect<'a>(group: &'a RuleGroup, out: &mut Vec<&'a RuleLeaf>) {
            for child in &group.children {
                match child {
                    RuleNode::Group(group) => collect(group, out),
                    RuleNode::Rule(leaf) => out.push(leaf),
                }
            }
        }
        let mut leaves = Vec::new();
        collect(&self.root, &mut leaves);
        leaves
    }

    /// Visit every leaf mutably, depth first.
    pub fn for_each_leaf_mut(&mut self, mut visit: impl FnMut(&mut RuleLeaf)) {
        fn walk(group: &mut RuleGroup, visit: &mut dyn FnMut(&mut RuleLeaf)) {
            for child in &mut group.children {
                match child {
                    RuleNode::Group(group) => walk(group, visit),
                    RuleNode::Rule(leaf) => visit(leaf),
                }
            }
        }
        walk(&mut self.root, &mut visit);
    }

    /// The tree as JSON.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(RuleNode::Group(self.root.clone())).unwrap_or(Value::Null)
    }
}

impl From<RuleTree> for RuleNode {
    fn from(tree: RuleTree) -> Self {
        RuleNode::Group(tree.root)
    }
}

impl TryFrom<RuleNode> for RuleTree {
    type Error = CompileError;

    fn try_from(node: RuleNode) -> Result<Self, Self::Error> {
        match node {
            RuleNode::Group(group) => Self::new(group),
            RuleNode::Rule(_) => Err(CompileError::malformed("the root must be a group")),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn payload() -> Value {
        json!({
            "type": "group",
            "query": {
                "condition": "OR",
                "children": [
                    {"type": "rule", "query": {"rule": "title", "operator": "contains", "value": "Acme"}},
                    {"type": "group", "query": {"condition": "and", "children": [
                        {"type": "rule", "query": {"rule": "amount", "operator": ">", "operand": null, "value": 5}}
                    ]}}
                ]
            }
        })
    }

    #[test]
    fn test_parse_group_payload() {
        let tree = RuleTree::parse(&payload()).unwrap();
        assert_eq!(tree.root().condition, Condition::Or);
        let leaves = tree.leaves();
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[1].rule, "amount");
        assert_eq!(leaves[1].value, json!(5));
    }

    #[test]
    fn test_parse_string_and_array_forms() {
        let text = Value::String(payload().to_string());
        assert_eq!(RuleTree::parse(&text).unwrap(), RuleTree::parse(&payload()).unwrap());

        let array = json!([{"type": "rule", "query": {"rule": "title", "operator": "equal", "value": "x"}}]);
        let tree = RuleTree::parse(&array).unwrap();
        assert_eq!(tree.root().condition, Condition::And);
        assert_eq!(tree.leaves().len(), 1);
    }

    #[test]
    fn test_empty_and_malformed_trees() {
        assert!(RuleTree::parse(&json!({"type": "group", "query": {"condition": "AND", "children": []}})).is_err());
        assert!(RuleTree::parse(&json!([])).is_err());
        assert!(RuleTree::parse(&json!({"type": "rule", "query": {"rule": "a", "operator": "="}})).is_err());
        assert!(RuleTree::parse(&json!("not json")).is_err());
        assert!(RuleTree::parse(&json!(42)).is_err());
        assert!(RuleTree::from_value(&json!({"children": "nope"})).is_none());
        assert!(RuleTree::from_value(&Value::Null).is_none());
    }

    #[test]
    fn test_serializes_to_wire_format() {
        let tree = RuleTree::parse(&payload()).unwrap();
        let value = tree.to_value();
        assert_eq!(value["type"], json!("group"));
        assert_eq!(value["query"]["condition"], json!("OR"));
        assert_eq!(value["query"]["children"][1]["query"]["condition"], json!("AND"));
        assert!(value["query"]["children"][0]["query"].get("operand").is_none());
    }

    #[test]
    fn test_for_each_leaf_mut() {
        let mut tree = RuleTree::parse(&payload()).unwrap();
        tree.for_each_leaf_mut(|leaf| leaf.value = json!(null));
        assert!(tree.leaves().iter().all(|leaf| leaf.value.is_null()));
    }
}
