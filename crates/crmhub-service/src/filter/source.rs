//! Which rule tree applies to a listing request.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crmhub_core::result::AppResult;
use crmhub_core::types::{SavedFilterId, UserId};
use crmhub_database::SavedFilterStore;

/// Where a listing's rules come from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSourceRequest {
    /// Inline rule tree.
    #[serde(default)]
    pub rules: Option<Value>,
    /// Saved filter to apply.
    #[serde(default)]
    pub filter_id: Option<SavedFilterId>,
    /// Apply the default filter when nothing else is requested.
    #[serde(default)]
    pub with_default: bool,
}

/// Resolve the rule tree for a listing view.
///
/// Inline rules win, then the requested saved filter if the user can see
/// it, then the default filter for (identifier, view, user). A missing
/// saved filter means no filter.
pub async fn resolve_rule_source(
    store: &dyn SavedFilterStore,
    request: &RuleSourceRequest,
    identifier: &str,
    view: &str,
    user: UserId,
) -> AppResult<Option<Value>> {
    if let Some(rules) = request.rules.as_ref().filter(|rules| !rules.is_null()) {
        return Ok(Some(rules.clone()));
    }

    if let Some(id) = request.filter_id {
        return match store.find_visible(id, user).await? {
            Some(filter) if filter.identifier == identifier => {
                debug!(filter_id = %id, "Applying saved filter");
                Ok(Some(filter.rules.0))
            }
            _ => {
                warn!(filter_id = %id, identifier, user_id = %user, "Saved filter not found, applying no filter");
                Ok(None)
            }
        };
    }

    if request.with_default {
        if let Some(filter) = store.find_default(identifier, view, user).await? {
            debug!(filter_id = %filter.id, identifier, view, "Applying default filter");
            return Ok(Some(filter.rules.0));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crmhub_database::MemorySavedFilterStore;
    use crmhub_entity::CreateSavedFilter;

    use super::*;

    async fn store() -> (MemorySavedFilterStore, SavedFilterId, SavedFilterId) {
        let store = MemorySavedFilterStore::new();
        let saved = store
            .create(&CreateSavedFilter {
                user_id: Some(UserId(1)),
                name: "Saved".into(),
                identifier: "deals".into(),
                view: "table".into(),
                rules: json!({"saved": true}),
                is_readonly: false,
                is_system_default: false,
            })
            .await
            .unwrap();
        let default = store
            .create(&CreateSavedFilter {
                user_id: None,
                name: "Default".into(),
                identifier: "deals".into(),
                view: "table".into(),
                rules: json!({"default": true}),
                is_readonly: false,
                is_system_default: true,
            })
            .await
            .unwrap();
        store.mark_as_default(default.id).await.unwrap();
        (store, saved.id, default.id)
    }

    #[tokio::test]
    async fn test_precedence() {
        let (store, saved, _) = store().await;
        let resolve = |request: RuleSourceRequest| {
            let store = store.clone();
            async move { resolve_rule_source(&store, &request, "deals", "table", UserId(1)).await.unwrap() }
        };

        let inline = RuleSourceRequest {
            rules: Some(json!({"inline": true})),
            filter_id: Some(saved),
            with_default: true,
        };
        assert_eq!(resolve(inline).await, Some(json!({"inline": true})));

        let by_id = RuleSourceRequest {
            filter_id: Some(saved),
            with_default: true,
            ..RuleSourceRequest::default()
        };
        assert_eq!(resolve(by_id).await, Some(json!({"saved": true})));

        let default = RuleSourceRequest {
            with_default: true,
            ..RuleSourceRequest::default()
        };
        assert_eq!(resolve(default).await, Some(json!({"default": true})));
        assert_eq!(resolve(RuleSourceRequest::default()).await, None);
    }

    #[tokio::test]
    async fn test_invisible_or_missing_filter_applies_nothing() {
        let (store, saved, _) = store().await;
        let request = RuleSourceRequest {
            filter_id: Some(saved),
            ..RuleSourceRequest::default()
        };
        let other_user = resolve_rule_source(&store, &request, "deals", "table", UserId(2)).await.unwrap();
        assert_eq!(other_user, None);

        let wrong_listing = resolve_rule_source(&store, &request, "contacts", "table", UserId(1)).await.unwrap();
        assert_eq!(wrong_listing, None);

        let missing = RuleSourceRequest {
            filter_id: Some(SavedFilterId(99)),
            with_default: true,
            ..RuleSourceRequest::default()
        };
        assert_eq!(resolve_rule_source(&store, &missing, "deals", "table", UserId(1)).await.unwrap(), None);
    }
}
