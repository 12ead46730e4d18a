use serde_json::Value;
use tracing::debug;

use crate::context::CompileContext;
use crate::filters::{CURRENT_USER, Filter, FilterSet};

use super::{RuleLeaf, RuleTree};

/// Replace the `"me"` sentinel with the current user's id in every leaf on
/// a user selector, including inside list values. Other leaves are left
/// untouched.
pub fn substitute_special_values(tree: &mut RuleTree, filters: &FilterSet, context: &CompileContext) {
    let Some(user_id) = context.user_id else {
        return;
    };
    tree.for_each_leaf_mut(|leaf| {
        let Some(filter) = filters.get(&leaf.rule) else {
            return;
        };
        if !selects_user(filter, leaf) {
            return;
        }
        if replace_sentinel(&mut leaf.value, user_id.get()) {
            debug!(field = %leaf.rule, user_id = %user_id, "Substituted current user");
        }
    });
}

fn selects_user(filter: &Filter, leaf: &RuleLeaf) -> bool {
    if filter.is_user_selector() {
        return true;
    }
    leaf.operand
        .as_deref()
        .and_then(|operand| filter.find_operand(operand))
        .is_some_and(|operand| operand.filter().is_user_selector())
}

fn replace_sentinel(value: &mut Value, user_id: i64) -> bool {
    match value {
        Value::String(text) if text == CURRENT_USER => {
            *value = Value::from(user_id);
            true
        }
        Value::String(text) if text.split(',').any(|item| item.trim() == CURRENT_USER) => {
            let user = user_id.to_string();
            let items: Vec<&str> = text
                .split(',')
                .map(|item| if item.trim() == CURRENT_USER { user.as_str() } else { item })
                .collect();
            let replaced = items.join(",");
            *value = Value::from(replaced);
            true
        }
        Value::Array(items) => items
            .iter_mut()
            .fold(false, |replaced, item| replace_sentinel(item, user_id) || replaced),
        _ => false,
    }
}
