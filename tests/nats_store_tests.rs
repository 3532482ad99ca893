// Copyright 2025 Cowboy AI, LLC.

//! Integration tests for the JetStream KV registry store
//!
//! These tests require a running NATS server with JetStream enabled:
//! ```bash
//! docker run -d --name nats-test -p 4222:4222 nats:latest -js
//! ```

use cim_domain_registry::{
    BuyerInfo, ClaimKind, ClaimRequest, CommitOutcome, Contributor, EngineConfig, FulfillmentStatus,
    IdentityRef, InMemoryEventPublisher, LineItem, NatsKvRegistryStore, NatsStoreConfig,
    QuantityUpdate, Registry, RegistryDraft, RegistryError, RegistryPatch, RegistryStatus,
    RegistryStore, ReservationEngine,
};
use std::sync::Arc;

async fn store() -> NatsKvRegistryStore {
    let client = async_nats::connect("nats://localhost:4222").await.unwrap();
    let config = NatsStoreConfig {
        bucket: format!("test-registries-{}", uuid::Uuid::new_v4().simple()),
        history: 5,
    };
    NatsKvRegistryStore::new(client, config).await.unwrap()
}

fn registry() -> Registry {
    Registry::new(IdentityRef::new("owner"), RegistryDraft::titled("Housewarming")).unwrap()
}

#[tokio::test]
#[ignore] // Requires NATS server to be running
async fn test_registry_round_trip() {
    let store = store().await;
    let registry = registry();
    let registry_id = registry.id;
    store.create_registry(registry.clone()).await.unwrap();

    let first = LineItem::new("sku-kettle", 2).unwrap();
    let second = LineItem::new("sku-mugs", 6).unwrap();
    store.add_item(&registry_id, first.clone()).await.unwrap();
    store.add_item(&registry_id, second.clone()).await.unwrap();

    let loaded = store.load(&registry_id).await.unwrap().unwrap();
    assert_eq!(loaded.title, "Housewarming");
    assert_eq!(
        loaded.items.iter().map(|i| i.id).collect::<Vec<_>>(),
        vec![first.id, second.id]
    );

    let patched = store
        .update_metadata(
            &registry_id,
            &RegistryPatch {
                description: Some("New flat".into()),
                ..RegistryPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(patched.description, "New flat");
    assert_eq!(store.list().await.unwrap().len(), 1);

    assert!(store.delete_registry(&registry_id).await.unwrap());
    assert!(store.load(&registry_id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore] // Requires NATS server to be running
async fn test_commit_guards_capacity() {
    let store = store().await;
    let registry = registry();
    let registry_id = registry.id;
    store.create_registry(registry).await.unwrap();
    let item = LineItem::new("sku-kettle", 2).unwrap();
    let item_id = item.id;
    store.add_item(&registry_id, item).await.unwrap();

    let claim = |name: &str, quantity| {
        ClaimRequest::new(
            quantity,
            BuyerInfo::guest(name, "guest@example.com"),
            ClaimKind::Reserved,
        )
        .into_claim()
    };

    let committed = store
        .commit_claim(&registry_id, &item_id, claim("Ana", 2))
        .await
        .unwrap();
    let CommitOutcome::Committed(item) = committed else {
        panic!("expected commit, got {committed:?}");
    };
    assert_eq!(item.claimed_quantity, 2);

    let rejected = store
        .commit_claim(&registry_id, &item_id, claim("Ben", 1))
        .await
        .unwrap();
    assert!(matches!(rejected, CommitOutcome::Insufficient { current } if current.remaining() == 0));

    assert_eq!(
        store.set_requested_quantity(&registry_id, &item_id, 1).await.unwrap(),
        QuantityUpdate::BelowClaimed { claimed: 2 }
    );

    let claim_id = item.claims[0].id;
    let updated = store
        .set_claim_fulfillment(&registry_id, &item_id, &claim_id, FulfillmentStatus::Completed)
        .await
        .unwrap();
    assert_eq!(updated.fulfillment_status, FulfillmentStatus::Completed);
}

#[tokio::test]
#[ignore] // Requires NATS server to be running
async fn test_status_and_contributors() {
    let store = store().await;
    let registry = registry();
    let registry_id = registry.id;
    store.create_registry(registry).await.unwrap();

    assert!(store
        .transition_status(&registry_id, RegistryStatus::Active, RegistryStatus::Inactive)
        .await
        .unwrap());
    assert!(!store
        .transition_status(&registry_id, RegistryStatus::Active, RegistryStatus::Completed)
        .await
        .unwrap());

    let ana = Contributor {
        identity: IdentityRef::new("ana"),
        first_contributed_at: chrono::Utc::now(),
    };
    assert!(store.add_contributor(&registry_id, ana.clone()).await.unwrap());
    assert!(!store.add_contributor(&registry_id, ana).await.unwrap());

    let loaded = store.load(&registry_id).await.unwrap().unwrap();
    assert_eq!(loaded.status, RegistryStatus::Inactive);
    assert_eq!(loaded.contributors.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore] // Requires NATS server to be running
async fn test_concurrent_claims_on_jetstream() {
    let store = store().await;
    let registry = registry();
    let registry_id = registry.id;
    store.create_registry(registry).await.unwrap();
    let item = LineItem::new("sku-chairs", 10).unwrap();
    let item_id = item.id;
    store.add_item(&registry_id, item).await.unwrap();
    store
        .add_item(&registry_id, LineItem::new("sku-spare", 1).unwrap())
        .await
        .unwrap();

    let store = Arc::new(store);
    let engine = ReservationEngine::new(
        store.clone(),
        Arc::new(InMemoryEventPublisher::new()),
        EngineConfig {
            max_attempts: 5,
            retry_backoff_ms: 10,
        },
    );

    let handles: Vec<_> = (0..30)
        .map(|n| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .submit_claim(
                        &registry_id,
                        &item_id,
                        1,
                        BuyerInfo::guest(format!("Guest {n}"), "guest@example.com"),
                        ClaimKind::Reserved,
                    )
                    .await
            })
        })
        .collect();

    let mut committed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => committed += 1,
            Err(RegistryError::InsufficientCapacity { .. }) | Err(RegistryError::Contention { .. }) => {}
            Err(other) => panic!("unexpected claim error: {other}"),
        }
    }

    let loaded = store.load(&registry_id).await.unwrap().unwrap();
    let item = loaded.item(item_id).unwrap();
    assert!(item.claimed_quantity <= 10);
    assert_eq!(item.claimed_quantity, committed);
    item.check_invariants().unwrap();
}
