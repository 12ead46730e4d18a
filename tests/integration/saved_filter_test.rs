//! Saved filters applied to listings.

use std::sync::Arc;

use serde_json::json;

use crmhub::common::config::QueryConfig;
use crmhub::common::types::UserId;
use crmhub::database::{MemorySavedFilterStore, SavedFilterStore};
use crmhub::service::{ListingRequest, Resource, SaveFilterRequest};
use crmhub::{ErrorKind, ListingService, RequestContext, ResourceCatalog, SavedFilterService};

use crate::helpers::{self, group, leaf};

struct Fixture {
    filters: SavedFilterService,
    listings: ListingService,
    store: Arc<MemorySavedFilterStore>,
}

fn fixture() -> Fixture {
    let mut catalog = ResourceCatalog::new(helpers::registry());
    catalog
        .register(Resource::new("contacts", "contacts", helpers::contact_filters()))
        .unwrap();
    let catalog = Arc::new(catalog);
    let store = Arc::new(MemorySavedFilterStore::new());
    Fixture {
        filters: SavedFilterService::new(store.clone(), catalog.clone(), QueryConfig::default()),
        listings: ListingService::new(catalog, store.clone(), QueryConfig::default()),
        store,
    }
}

fn save(name: &str, rules: serde_json::Value, is_default: bool) -> SaveFilterRequest {
    SaveFilterRequest {
        name: name.into(),
        identifier: "contacts".into(),
        view: "table".into(),
        rules,
        is_default,
    }
}

fn listing(value: serde_json::Value) -> ListingRequest {
    serde_json::from_value(value).unwrap()
}

#[tokio::test]
async fn test_default_filter_drives_listing() {
    let fixture = fixture();
    let ctx = RequestContext::new(UserId(1)).at(helpers::now());
    let database = helpers::database(&helpers::contacts_document());

    let high = fixture
        .filters
        .create(&ctx, save("High score", group("AND", vec![leaf("score", "greater_or_equal", json!(3))]), true))
        .await
        .unwrap();
    let query = fixture
        .listings
        .build_query(&ctx, "contacts", &listing(json!({"with_default": true})))
        .await
        .unwrap();
    assert_eq!(helpers::sorted_ids(&database, &query), vec![1, 4]);

    let globex = fixture
        .filters
        .create(&ctx, save("Globex", group("AND", vec![leaf("company.name", "equal", json!("Globex"))]), true))
        .await
        .unwrap();
    assert!(!fixture.store.find(high.id).await.unwrap().unwrap().is_default);

    let query = fixture
        .listings
        .build_query(&ctx, "contacts", &listing(json!({"with_default": true})))
        .await
        .unwrap();
    assert_eq!(helpers::sorted_ids(&database, &query), vec![2, 6]);

    // an explicit filter wins over the default
    let query = fixture
        .listings
        .build_query(&ctx, "contacts", &listing(json!({"filter_id": high.id, "with_default": true})))
        .await
        .unwrap();
    assert_eq!(helpers::sorted_ids(&database, &query), vec![1, 4]);
    assert_ne!(high.id, globex.id);
}

#[tokio::test]
async fn test_other_users_filter_applies_nothing() {
    let fixture = fixture();
    let owner = RequestContext::new(UserId(1)).at(helpers::now());
    let other = RequestContext::new(UserId(2)).at(helpers::now());
    let database = helpers::database(&helpers::contacts_document());

    let private = fixture
        .filters
        .create(&owner, save("Mine", group("AND", vec![leaf("name", "equal", json!("Beta"))]), false))
        .await
        .unwrap();
    let query = fixture
        .listings
        .build_query(&other, "contacts", &listing(json!({"filter_id": private.id})))
        .await
        .unwrap();
    assert_eq!(helpers::sorted_ids(&database, &query), vec![1, 2, 3, 4, 5, 6]);

    let err = fixture.filters.delete(&other, private.id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_strict_validation_rejects_unknown_filters() {
    let fixture = fixture();
    let ctx = RequestContext::new(UserId(1));
    let err = fixture
        .filters
        .create(&ctx, save("Broken", group("AND", vec![leaf("nope", "equal", json!(1))]), false))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}
