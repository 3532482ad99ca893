// Copyright 2025 Cowboy AI, LLC.

//! End-to-end registry scenarios through the service and order linkage

use async_trait::async_trait;
use cim_domain_registry::{
    BuyerInfo, Caller, CapacitySnapshot, Claim, ClaimId, ClaimKind, ClaimRequest, CommitOutcome,
    Contributor, EngineConfig, ErrorKind, FulfillmentStatus, GiftLinkOutcome, IdentityRef,
    InMemoryEventPublisher,
    InMemoryOrderBook, InMemoryOwnerDirectory, InMemoryRegistryStore, LineItem, LineItemId, Order,
    OrderBook, OrderLinkageAdapter, FollowUpLog, QuantityUpdate, Registry, RegistryDraft,
    RegistryError, RegistryEvent, RegistryId, RegistryPatch, RegistryService, RegistryStatus,
    RegistryStore, ReservationEngine, StoreError,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

struct Harness {
    service: RegistryService,
    store: InMemoryRegistryStore,
    publisher: InMemoryEventPublisher,
}

fn harness() -> Harness {
    let store = InMemoryRegistryStore::new();
    let publisher = InMemoryEventPublisher::new();
    let service = RegistryService::new(
        Arc::new(store.clone()),
        Arc::new(publisher.clone()),
        Arc::new(InMemoryOwnerDirectory::new()),
        EngineConfig::default(),
    );
    Harness {
        service,
        store,
        publisher,
    }
}

fn owner() -> Caller {
    Caller::user("owner")
}

fn guest(name: &str) -> BuyerInfo {
    BuyerInfo::guest(name, format!("{}@example.com", name.to_lowercase()))
}

async fn registry_with(h: &Harness, public: bool, quantities: &[u32]) -> (RegistryId, Vec<LineItemId>) {
    let draft = RegistryDraft::titled("Baby Lou");
    let draft = if public { draft.public() } else { draft };
    let registry = h.service.create_registry(&owner(), draft).await.unwrap();
    let mut items = Vec::new();
    for (n, q) in quantities.iter().enumerate() {
        let item = h
            .service
            .add_item(&owner(), &registry.id, &format!("sku-{n}"), *q)
            .await
            .unwrap();
        items.push(item.id);
    }
    (registry.id, items)
}

#[tokio::test]
async fn test_second_claim_reports_what_is_left() {
    let h = harness();
    let (registry_id, items) = registry_with(&h, true, &[5, 1]).await;

    let first = h
        .service
        .claim(
            &Caller::anonymous(),
            &registry_id,
            &items[0],
            ClaimRequest::new(3, guest("Ana"), ClaimKind::Reserved),
        )
        .await
        .unwrap();
    assert_eq!(first.item.claimed_quantity, 3);
    assert!(!first.is_list_complete);

    let second = h
        .service
        .claim(
            &Caller::anonymous(),
            &registry_id,
            &items[0],
            ClaimRequest::new(3, guest("Ben"), ClaimKind::Reserved),
        )
        .await
        .unwrap_err();
    assert_eq!(
        second,
        RegistryError::InsufficientCapacity {
            requested: 3,
            remaining: 2
        }
    );
    assert_eq!(second.kind(), ErrorKind::InsufficientCapacity);
}

#[tokio::test]
async fn test_filling_the_list_completes_it() {
    let h = harness();
    let (registry_id, items) = registry_with(&h, true, &[2]).await;

    let record = h
        .service
        .claim(
            &Caller::user("ana"),
            &registry_id,
            &items[0],
            ClaimRequest::new(2, guest("Ana"), ClaimKind::Purchased),
        )
        .await
        .unwrap();
    assert!(record.is_list_complete);
    assert_eq!(record.registry_status, RegistryStatus::Completed);
    assert!(record.settled);

    let registry = h.service.get_registry(&owner(), &registry_id).await.unwrap();
    assert_eq!(registry.status, RegistryStatus::Completed);
    assert_eq!(registry.contributors.len(), 1);

    let late = h
        .service
        .claim(
            &Caller::anonymous(),
            &registry_id,
            &items[0],
            ClaimRequest::new(1, guest("Ben"), ClaimKind::Reserved),
        )
        .await
        .unwrap_err();
    assert_eq!(
        late,
        RegistryError::RegistryNotActive {
            status: RegistryStatus::Completed
        }
    );
    assert_eq!(h.publisher.count_of("RegistryCompleted").await, 1);
    assert_eq!(h.publisher.count_of("ClaimCommitted").await, 1);
}

#[tokio::test]
async fn test_reopened_registry_accepts_new_items() {
    let h = harness();
    let (registry_id, items) = registry_with(&h, true, &[1]).await;
    h.service
        .claim(
            &Caller::anonymous(),
            &registry_id,
            &items[0],
            ClaimRequest::new(1, guest("Ana"), ClaimKind::Reserved),
        )
        .await
        .unwrap();

    let reopened = h
        .service
        .update_registry(
            &owner(),
            &registry_id,
            RegistryPatch {
                status: Some(RegistryStatus::Active),
                ..RegistryPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(reopened.status, RegistryStatus::Active);

    let item = h
        .service
        .add_item(&owner(), &registry_id, "sku-more", 2)
        .await
        .unwrap();
    let record = h
        .service
        .claim(
            &Caller::anonymous(),
            &registry_id,
            &item.id,
            ClaimRequest::new(1, guest("Ben"), ClaimKind::Reserved),
        )
        .await
        .unwrap();
    assert!(!record.is_list_complete);

    let changes: Vec<_> = h
        .publisher
        .published()
        .await
        .into_iter()
        .filter_map(|e| match e {
            RegistryEvent::RegistryStatusChanged { from, to, .. } => Some((from, to)),
            _ => None,
        })
        .collect();
    assert_eq!(changes, vec![(RegistryStatus::Completed, RegistryStatus::Active)]);
}

#[tokio::test]
async fn test_private_registry_visibility() {
    let h = harness();
    let (registry_id, _) = registry_with(&h, false, &[1]).await;

    let anonymous = h
        .service
        .get_registry(&Caller::anonymous(), &registry_id)
        .await
        .unwrap_err();
    assert_eq!(anonymous.kind(), ErrorKind::Authorization);

    let stranger = h
        .service
        .get_registry(&Caller::user("stranger"), &registry_id)
        .await
        .unwrap_err();
    assert_eq!(stranger.kind(), ErrorKind::Authorization);

    assert!(h.service.get_registry(&owner(), &registry_id).await.is_ok());
    assert!(h
        .service
        .get_registry(&Caller::admin("root"), &registry_id)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_deactivated_registry_rejects_claims() {
    let h = harness();
    let (registry_id, items) = registry_with(&h, true, &[3]).await;
    h.service
        .update_registry(
            &owner(),
            &registry_id,
            RegistryPatch {
                status: Some(RegistryStatus::Inactive),
                ..RegistryPatch::default()
            },
        )
        .await
        .unwrap();

    let err = h
        .service
        .claim(
            &Caller::anonymous(),
            &registry_id,
            &items[0],
            ClaimRequest::new(1, guest("Ana"), ClaimKind::Reserved),
        )
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RegistryError::RegistryNotActive {
            status: RegistryStatus::Inactive
        }
    );
}

#[tokio::test]
async fn test_legacy_state_setter_claims_whole_item() {
    let h = harness();
    let (registry_id, items) = registry_with(&h, true, &[3, 1]).await;

    let outcome = h
        .service
        .set_item_state(&Caller::anonymous(), &registry_id, &items[0], 1, Some(guest("Ana")))
        .await
        .unwrap();
    assert_eq!(outcome.item.claimed_quantity, 3);
    assert_eq!(outcome.state.legacy_code(), 1);
    assert!(!outcome.claim.unwrap().is_list_complete);

    let again = h
        .service
        .set_item_state(&Caller::anonymous(), &registry_id, &items[0], 2, Some(guest("Ben")))
        .await
        .unwrap_err();
    assert_eq!(
        again,
        RegistryError::InsufficientCapacity {
            requested: 1,
            remaining: 0
        }
    );

    let revert = h
        .service
        .set_item_state(&Caller::anonymous(), &registry_id, &items[0], 0, None)
        .await
        .unwrap_err();
    assert!(revert.is_validation_error());
}

#[tokio::test]
async fn test_removing_the_last_open_item_completes() {
    let h = harness();
    let (registry_id, items) = registry_with(&h, true, &[1, 4]).await;
    h.service
        .claim(
            &Caller::anonymous(),
            &registry_id,
            &items[0],
            ClaimRequest::new(1, guest("Ana"), ClaimKind::Reserved),
        )
        .await
        .unwrap();

    h.service
        .remove_item(&owner(), &registry_id, &items[1])
        .await
        .unwrap();

    let registry = h.store.load(&registry_id).await.unwrap().unwrap();
    assert_eq!(registry.status, RegistryStatus::Completed);
    assert_eq!(registry.items.len(), 1);
}

/// Store whose item writes can be made to always lose the race, and whose
/// contributor writes can be made to fail
struct FaultyStore {
    inner: InMemoryRegistryStore,
    stale_commits: bool,
    contributor_outage: bool,
}

#[async_trait]
impl RegistryStore for FaultyStore {
    async fn create_registry(&self, registry: Registry) -> Result<(), StoreError> {
        self.inner.create_registry(registry).await
    }

    async fn load(&self, registry_id: &RegistryId) -> Result<Option<Registry>, StoreError> {
        self.inner.load(registry_id).await
    }

    async fn list(&self) -> Result<Vec<Registry>, StoreError> {
        self.inner.list().await
    }

    async fn delete_registry(&self, registry_id: &RegistryId) -> Result<bool, StoreError> {
        self.inner.delete_registry(registry_id).await
    }

    async fn update_metadata(
        &self,
        registry_id: &RegistryId,
        patch: &RegistryPatch,
    ) -> Result<Registry, StoreError> {
        self.inner.update_metadata(registry_id, patch).await
    }

    async fn transition_status(
        &self,
        registry_id: &RegistryId,
        from: RegistryStatus,
        to: RegistryStatus,
    ) -> Result<bool, StoreError> {
        self.inner.transition_status(registry_id, from, to).await
    }

    async fn add_item(&self, registry_id: &RegistryId, item: LineItem) -> Result<(), StoreError> {
        self.inner.add_item(registry_id, item).await
    }

    async fn remove_item(
        &self,
        registry_id: &RegistryId,
        item_id: &LineItemId,
    ) -> Result<LineItem, StoreError> {
        self.inner.remove_item(registry_id, item_id).await
    }

    async fn set_requested_quantity(
        &self,
        registry_id: &RegistryId,
        item_id: &LineItemId,
        requested: u32,
    ) -> Result<QuantityUpdate, StoreError> {
        self.inner
            .set_requested_quantity(registry_id, item_id, requested)
            .await
    }

    async fn item_capacity(
        &self,
        registry_id: &RegistryId,
        item_id: &LineItemId,
    ) -> Result<CapacitySnapshot, StoreError> {
        self.inner.item_capacity(registry_id, item_id).await
    }

    async fn commit_claim(
        &self,
        registry_id: &RegistryId,
        item_id: &LineItemId,
        claim: Claim,
    ) -> Result<CommitOutcome, StoreError> {
        if !self.stale_commits {
            return self.inner.commit_claim(registry_id, item_id, claim).await;
        }
        let snapshot = self.inner.item_capacity(registry_id, item_id).await?;
        Ok(CommitOutcome::Stale {
            current: snapshot.capacity,
        })
    }

    async fn add_contributor(
        &self,
        registry_id: &RegistryId,
        contributor: Contributor,
    ) -> Result<bool, StoreError> {
        if self.contributor_outage {
            return Err(StoreError::Backend("contributor bucket unavailable".into()));
        }
        self.inner.add_contributor(registry_id, contributor).await
    }

    async fn set_claim_fulfillment(
        &self,
        registry_id: &RegistryId,
        item_id: &LineItemId,
        claim_id: &ClaimId,
        status: FulfillmentStatus,
    ) -> Result<Claim, StoreError> {
        self.inner
            .set_claim_fulfillment(registry_id, item_id, claim_id, status)
            .await
    }
}

#[tokio::test]
async fn test_contended_gift_leaves_order_intact() {
    let inner = InMemoryRegistryStore::new();
    let registry = Registry::new("owner".into(), RegistryDraft::titled("Wedding").public()).unwrap();
    let registry_id = registry.id;
    inner.create_registry(registry).await.unwrap();
    let item = LineItem::new("sku-teapot", 2).unwrap();
    let item_id = item.id;
    inner.add_item(&registry_id, item).await.unwrap();

    let store: Arc<dyn RegistryStore> = Arc::new(FaultyStore {
        inner: inner.clone(),
        stale_commits: true,
        contributor_outage: false,
    });
    let publisher = InMemoryEventPublisher::new();
    let config = EngineConfig {
        max_attempts: 3,
        retry_backoff_ms: 0,
    };
    let engine = ReservationEngine::new(store.clone(), Arc::new(publisher.clone()), config);
    let orders = InMemoryOrderBook::new();
    let follow_ups = FollowUpLog::new();
    let adapter = OrderLinkageAdapter::new(
        engine,
        store,
        Arc::new(orders.clone()),
        Arc::new(publisher.clone()),
        follow_ups.clone(),
    );

    let order = Order::new(guest("Ana"))
        .with_gift(registry_id, item_id, 1)
        .paid_with("card");
    orders.insert(order.clone()).await;

    let outcomes = adapter.link_order_gifts(&order).await;
    assert_eq!(
        outcomes,
        vec![GiftLinkOutcome::NeedsFollowUp(RegistryError::Contention { attempts: 3 })]
    );

    let stored = orders.get_order(&order.id).await.unwrap().unwrap();
    assert_eq!(stored.id, order.id);
    assert!(stored.gift_lines[0].needs_follow_up());
    assert_eq!(stored.gift_lines[0].claim_id, None);

    let queued = follow_ups.for_order(&order.id).await;
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].code, "contention");
    assert_eq!(publisher.count_of("GiftLinkFailed").await, 1);

    let untouched = inner.load(&registry_id).await.unwrap().unwrap();
    assert_eq!(untouched.items[0].claimed_quantity, 0);
}

#[tokio::test]
async fn test_linked_order_outcome_reaches_claims() {
    let h = harness();
    let (registry_id, items) = registry_with(&h, true, &[2, 1]).await;
    let orders = InMemoryOrderBook::new();
    let adapter = OrderLinkageAdapter::new(
        h.service.engine().clone(),
        h.service.store(),
        Arc::new(orders.clone()),
        Arc::new(h.publisher.clone()),
        FollowUpLog::new(),
    );

    let order = Order::new(guest("Ana")).with_gift(registry_id, items[0], 2);
    orders.insert(order.clone()).await;
    let outcomes = adapter.link_order_gifts(&order).await;
    let GiftLinkOutcome::Linked(record) = &outcomes[0] else {
        panic!("gift was not linked: {outcomes:?}");
    };
    assert_eq!(record.claim.kind, ClaimKind::Purchased);
    assert_eq!(record.claim.order_id, Some(order.id));

    let updated = adapter.record_order_outcome(&order.id, false).await.unwrap();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].fulfillment_status, FulfillmentStatus::Cancelled);

    // Cancelled orders keep their claimed quantity.
    let registry = h.store.load(&registry_id).await.unwrap().unwrap();
    assert_eq!(registry.item(items[0]).unwrap().claimed_quantity, 2);
}

fn worker(store: Arc<dyn RegistryStore>) -> RegistryService {
    RegistryService::new(
        store,
        Arc::new(InMemoryEventPublisher::new()),
        Arc::new(InMemoryOwnerDirectory::new()),
        EngineConfig::default(),
    )
}

#[tokio::test]
async fn test_another_worker_settles_a_failed_follow_up() {
    let inner = InMemoryRegistryStore::new();
    let flaky = worker(Arc::new(FaultyStore {
        inner: inner.clone(),
        stale_commits: false,
        contributor_outage: true,
    }));
    let healthy = worker(Arc::new(inner.clone()));

    let registry = healthy
        .create_registry(&owner(), RegistryDraft::titled("Shower").public())
        .await
        .unwrap();
    let item = healthy
        .add_item(&owner(), &registry.id, "sku-quilt", 3)
        .await
        .unwrap();

    let record = flaky
        .claim(
            &Caller::user("ana"),
            &registry.id,
            &item.id,
            ClaimRequest::new(1, guest("Ana"), ClaimKind::Reserved),
        )
        .await
        .unwrap();
    assert!(!record.settled);
    assert_eq!(record.item.claimed_quantity, 1);

    let ana = IdentityRef::new("ana");
    let before = inner.load(&registry.id).await.unwrap().unwrap();
    assert!(!before.has_contributor(&ana));

    let report = healthy
        .settlement(&Caller::anonymous(), &registry.id)
        .await
        .unwrap();
    assert!(report.settled);
    assert_eq!(report.pending_follow_ups, 0);

    let after = inner.load(&registry.id).await.unwrap().unwrap();
    assert!(after.has_contributor(&ana));
    assert_eq!(after.contributors.len(), 1);
}
