//! Saved filter management.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crmhub_core::config::QueryConfig;
use crmhub_core::error::AppError;
use crmhub_core::result::AppResult;
use crmhub_core::types::SavedFilterId;
use crmhub_database::SavedFilterStore;
use crmhub_entity::{CreateSavedFilter, SavedFilter, UpdateSavedFilter};
use crmhub_query::rules::substitute_special_values;
use crmhub_query::{Parser, Query, RuleParser, RuleTree};

use crate::catalog::{Resource, ResourceCatalog};
use crate::context::RequestContext;

/// Request to save a new filter for the current user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveFilterRequest {
    pub name: String,
    /// Listing the filter belongs to.
    pub identifier: String,
    #[serde(default = "default_view")]
    pub view: String,
    pub rules: Value,
    /// Make it the user's default for the view.
    #[serde(default)]
    pub is_default: bool,
}

fn default_view() -> String {
    "table".to_string()
}

/// Creates, edits and deletes saved filters and maintains the default
/// filter of each listing view.
#[derive(Clone)]
pub struct SavedFilterService {
    store: Arc<dyn SavedFilterStore>,
    catalog: Arc<ResourceCatalog>,
    config: QueryConfig,
}

impl SavedFilterService {
    pub fn new(store: Arc<dyn SavedFilterStore>, catalog: Arc<ResourceCatalog>, config: QueryConfig) -> Self {
        Self { store, catalog, config }
    }

    /// Filters of a listing the user can apply.
    pub async fn list(&self, ctx: &RequestContext, identifier: &str) -> AppResult<Vec<SavedFilter>> {
        self.catalog.get(identifier)?;
        self.store.list_visible(identifier, ctx.user_id).await
    }

    /// A filter the user can see.
    pub async fn get(&self, ctx: &RequestContext, id: SavedFilterId) -> AppResult<SavedFilter> {
        self.store
            .find_visible(id, ctx.user_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Saved filter {id} not found")))
    }

    /// Save a filter owned by the current user.
    pub async fn create(&self, ctx: &RequestContext, req: SaveFilterRequest) -> AppResult<SavedFilter> {
        if req.name.trim().is_empty() {
            return Err(AppError::validation("A saved filter needs a name"));
        }
        let resource = self.catalog.get(&req.identifier)?;
        self.validate_rules(ctx, &resource, &req.rules)?;

        let filter = self
            .store
            .create(&CreateSavedFilter {
                user_id: Some(ctx.user_id),
                name: req.name.trim().to_string(),
                identifier: req.identifier,
                view: req.view,
                rules: req.rules,
                is_readonly: false,
                is_system_default: false,
            })
            .await?;

        info!(
            user_id = %ctx.user_id,
            filter_id = %filter.id,
            identifier = %filter.identifier,
            "Saved filter created"
        );

        if req.is_default {
            return self.store.mark_as_default(filter.id).await;
        }
        Ok(filter)
    }

    /// Rename a filter or replace its rules.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: SavedFilterId,
        data: UpdateSavedFilter,
    ) -> AppResult<SavedFilter> {
        let filter = self.editable(ctx, id).await?;
        if let Some(rules) = &data.rules {
            let resource = self.catalog.get(&filter.identifier)?;
            self.validate_rules(ctx, &resource, rules)?;
        }
        if data.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(AppError::validation("A saved filter needs a name"));
        }
        let updated = self.store.update(id, &data).await?;
        info!(user_id = %ctx.user_id, filter_id = %id, "Saved filter updated");
        Ok(updated)
    }

    pub async fn delete(&self, ctx: &RequestContext, id: SavedFilterId) -> AppResult<()> {
        self.editable(ctx, id).await?;
        self.store.delete(id).await?;
        info!(user_id = %ctx.user_id, filter_id = %id, "Saved filter deleted");
        Ok(())
    }

    /// Make the filter the default of its listing view, replacing the
    /// previous default of the same owner.
    ///
    /// Users choose defaults among their own filters; system filters can
    /// only be made default by super admins.
    pub async fn mark_as_default(&self, ctx: &RequestContext, id: SavedFilterId) -> AppResult<SavedFilter> {
        let filter = self.get(ctx, id).await?;
        if filter.is_system() && !ctx.is_super_admin {
            return Err(AppError::authorization(
                "Only administrators can change the default of a system filter",
            ));
        }
        let filter = self.store.mark_as_default(id).await?;
        info!(user_id = %ctx.user_id, filter_id = %id, view = %filter.view, "Default filter changed");
        Ok(filter)
    }

    pub async fn unmark_default(&self, ctx: &RequestContext, id: SavedFilterId) -> AppResult<SavedFilter> {
        let filter = self.get(ctx, id).await?;
        if filter.is_system() && !ctx.is_super_admin {
            return Err(AppError::authorization(
                "Only administrators can change the default of a system filter",
            ));
        }
        self.store.unmark_default(id).await
    }

    /// Check that a rule tree is well formed and, with `strict_rules`,
    /// that every leaf compiles against the resource's filters.
    pub fn validate_rules(&self, ctx: &RequestContext, resource: &Resource, rules: &Value) -> AppResult<()> {
        let mut tree = RuleTree::parse(rules)?;
        if !self.config.strict_rules {
            return Ok(());
        }

        let context = ctx.compile_context(&self.config)?.strict();
        substitute_special_values(&mut tree, &resource.filters, &context);
        let mut query = Query::new(self.catalog.entity(resource)?);
        Parser::new(&resource.filters, self.catalog.registry(), &context).parse(&tree, &mut query)?;
        Ok(())
    }

    /// A filter the user may change.
    async fn editable(&self, ctx: &RequestContext, id: SavedFilterId) -> AppResult<SavedFilter> {
        let filter = self.get(ctx, id).await?;
        if !filter.is_mutable() {
            return Err(AppError::authorization(format!(
                "Saved filter '{}' is readonly",
                filter.name
            )));
        }
        if filter.is_system() && !ctx.is_super_admin {
            return Err(AppError::authorization(format!(
                "Saved filter '{}' is shared by the system and cannot be changed",
                filter.name
            )));
        }
        Ok(filter)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crmhub_core::error::ErrorKind;
    use crmhub_core::types::UserId;
    use crmhub_database::MemorySavedFilterStore;
    use crmhub_query::schema::ColumnType;
    use crmhub_query::{EntitySchema, Filter, FilterSet, SchemaRegistry};

    use super::*;

    fn catalog() -> Arc<ResourceCatalog> {
        let registry = SchemaRegistry::new([EntitySchema::new("deals", "deals")
            .column("name", ColumnType::Text)
            .column("user_id", ColumnType::Integer)])
        .unwrap();
        let filters = FilterSet::new([Filter::text("name", "Name"), Filter::user("user_id", "Owner", vec![])]).unwrap();
        let mut catalog = ResourceCatalog::new(registry);
        catalog.register(Resource::new("deals", "deals", filters)).unwrap();
        Arc::new(catalog)
    }

    fn service(strict: bool) -> (SavedFilterService, Arc<MemorySavedFilterStore>) {
        let store = Arc::new(MemorySavedFilterStore::new());
        let config = QueryConfig {
            strict_rules: strict,
            ..QueryConfig::default()
        };
        (SavedFilterService::new(store.clone(), catalog(), config), store)
    }

    fn request(rules: Value) -> SaveFilterRequest {
        SaveFilterRequest {
            name: "My deals".into(),
            identifier: "deals".into(),
            view: "table".into(),
            rules,
            is_default: false,
        }
    }

    fn rule(field: &str, operator: &str, value: Value) -> Value {
        json!([{"type": "rule", "query": {"rule": field, "operator": operator, "value": value}}])
    }

    #[tokio::test]
    async fn test_create_validates_strictly() {
        let (service, _) = service(true);
        let ctx = RequestContext::new(UserId(1));

        let created = service
            .create(&ctx, request(rule("user_id", "equal", json!("me"))))
            .await
            .unwrap();
        assert_eq!(created.user_id, Some(UserId(1)));
        assert_eq!(created.rules.0, rule("user_id", "equal", json!("me")));

        let err = service
            .create(&ctx, request(rule("missing", "equal", json!(1))))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);

        let err = service
            .create(&ctx, request(rule("name", "between", json!("x"))))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_lenient_config_only_checks_structure() {
        let (service, _) = service(false);
        let ctx = RequestContext::new(UserId(1));
        assert!(service.create(&ctx, request(rule("missing", "equal", json!(1)))).await.is_ok());
        assert!(service.create(&ctx, request(json!("not a tree"))).await.is_err());
    }

    #[tokio::test]
    async fn test_readonly_and_system_filters_are_protected() {
        let (service, store) = service(true);
        let ctx = RequestContext::new(UserId(1));
        let readonly = store
            .create(&CreateSavedFilter {
                user_id: Some(UserId(1)),
                name: "Locked".into(),
                identifier: "deals".into(),
                view: "table".into(),
                rules: rule("name", "equal", json!("x")),
                is_readonly: true,
                is_system_default: false,
            })
            .await
            .unwrap();
        let system = store
            .create(&CreateSavedFilter {
                user_id: None,
                name: "Everyone".into(),
                identifier: "deals".into(),
                view: "table".into(),
                rules: rule("name", "equal", json!("x")),
                is_readonly: false,
                is_system_default: true,
            })
            .await
            .unwrap();

        for id in [readonly.id, system.id] {
            let err = service.delete(&ctx, id).await.unwrap_err();
            assert_eq!(err.kind, ErrorKind::Authorization);
            let err = service.update(&ctx, id, UpdateSavedFilter::default()).await.unwrap_err();
            assert_eq!(err.kind, ErrorKind::Authorization);
        }
        let err = service.mark_as_default(&ctx, system.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authorization);
        assert!(service.mark_as_default(&ctx.clone().super_admin(), system.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_other_users_filters_are_not_found() {
        let (service, _) = service(true);
        let owner = RequestContext::new(UserId(1));
        let other = RequestContext::new(UserId(2));
        let filter = service.create(&owner, request(rule("name", "equal", json!("x")))).await.unwrap();

        let err = service.delete(&other, filter.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(service.list(&other, "deals").await.unwrap().is_empty());
        assert_eq!(service.list(&owner, "deals").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_single_default_per_view() {
        let (service, store) = service(true);
        let ctx = RequestContext::new(UserId(1));
        let mut first = request(rule("name", "equal", json!("a")));
        first.is_default = true;
        let first = service.create(&ctx, first).await.unwrap();
        assert!(first.is_default);

        let mut second = request(rule("name", "equal", json!("b")));
        second.is_default = true;
        let second = service.create(&ctx, second).await.unwrap();

        assert!(!store.find(first.id).await.unwrap().unwrap().is_default);
        assert!(store.find(second.id).await.unwrap().unwrap().is_default);

        service.mark_as_default(&ctx, first.id).await.unwrap();
        assert!(!store.find(second.id).await.unwrap().unwrap().is_default);
    }
}
