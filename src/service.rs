// Copyright 2025 Cowboy AI, LLC.

//! Registry operations as seen by callers
//!
//! Every operation takes the [`Caller`] and applies the [`AccessGate`] before
//! touching the store. Claims go through the [`ReservationEngine`]; everything
//! else is an item- or header-scoped store write.

use crate::access::AccessGate;
use crate::completion::CompletionEvaluator;
use crate::config::EngineConfig;
use crate::engine::{ClaimRecord, ReservationEngine};
use crate::entity::{LineItemId, RegistryId};
use crate::errors::{RegistryError, RegistryResult};
use crate::events::{EventPublisher, RegistryEvent};
use crate::identity::{Caller, IdentityRef, OwnerDirectory};
use crate::registry::{
    BuyerInfo, ClaimKind, ClaimRequest, ItemState, LineItem, Registry, RegistryDraft,
    RegistryPatch, RegistryStatus,
};
use crate::settlement::SettlementReport;
use crate::state_machine::StateTransition;
use crate::store::{QuantityUpdate, RegistryStore};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Checkout purchase of a registry gift
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    /// Item bought
    pub item_id: LineItemId,
    /// Quantity bought
    pub quantity: u32,
    /// Buyer name
    pub buyer_name: String,
    /// Buyer email
    pub buyer_email: String,
    /// Buyer phone
    #[serde(default)]
    pub buyer_phone: Option<String>,
    /// Payment method reported by checkout
    #[serde(default)]
    pub payment_method: Option<String>,
    /// Gift message
    #[serde(default)]
    pub note: Option<String>,
}

/// Result of the legacy item state setter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyStateOutcome {
    /// The item afterwards
    pub item: LineItem,
    /// Derived state of the item afterwards
    pub state: ItemState,
    /// Claim submitted on the caller's behalf, if any
    pub claim: Option<ClaimRecord>,
}

/// Public listing entry; carries no items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySummary {
    /// Registry identifier
    pub id: RegistryId,
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// Expected date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    /// Owning identity
    pub owner_id: IdentityRef,
    /// Owner display name, when the directory knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    /// Status
    pub status: RegistryStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Registry counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StatusCounts {
    /// Every registry
    pub total: usize,
    /// Active registries
    pub active: usize,
    /// Completed registries
    pub completed: usize,
    /// Inactive registries
    pub inactive: usize,
}

impl StatusCounts {
    fn add(&mut self, status: RegistryStatus) {
        self.total += 1;
        match status {
            RegistryStatus::Active => self.active += 1,
            RegistryStatus::Completed => self.completed += 1,
            RegistryStatus::Inactive => self.inactive += 1,
        }
    }
}

/// Administrator statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    /// All registries
    #[serde(flatten)]
    pub all: StatusCounts,
    /// Registries created in the current UTC calendar month
    pub this_month: StatusCounts,
}

/// Caller-facing registry operations
#[derive(Clone)]
pub struct RegistryService {
    store: Arc<dyn RegistryStore>,
    engine: ReservationEngine,
    completion: CompletionEvaluator,
    publisher: Arc<dyn EventPublisher>,
    owners: Arc<dyn OwnerDirectory>,
}

impl RegistryService {
    /// Wire a service over a store
    pub fn new(
        store: Arc<dyn RegistryStore>,
        publisher: Arc<dyn EventPublisher>,
        owners: Arc<dyn OwnerDirectory>,
        config: EngineConfig,
    ) -> Self {
        let engine = ReservationEngine::new(store.clone(), publisher.clone(), config);
        let completion = CompletionEvaluator::new(store.clone(), publisher.clone());
        Self {
            store,
            engine,
            completion,
            publisher,
            owners,
        }
    }

    /// The reservation engine behind this service
    pub fn engine(&self) -> &ReservationEngine {
        &self.engine
    }

    /// The store behind this service
    pub fn store(&self) -> Arc<dyn RegistryStore> {
        self.store.clone()
    }

    async fn load(&self, registry_id: &RegistryId) -> RegistryResult<Registry> {
        self.store
            .load(registry_id)
            .await?
            .ok_or(RegistryError::RegistryNotFound(*registry_id))
    }

    async fn load_readable(&self, caller: &Caller, registry_id: &RegistryId) -> RegistryResult<Registry> {
        let registry = self.load(registry_id).await?;
        AccessGate::authorize_read(&registry, caller)?;
        Ok(registry)
    }

    async fn load_writable(&self, caller: &Caller, registry_id: &RegistryId) -> RegistryResult<Registry> {
        let registry = self.load(registry_id).await?;
        AccessGate::authorize_write(&registry, caller)?;
        Ok(registry)
    }

    fn require_active(registry: &Registry) -> RegistryResult<()> {
        if registry.status.accepts_claims() {
            return Ok(());
        }
        Err(RegistryError::RegistryNotActive {
            status: registry.status,
        })
    }

    /// Create a registry owned by the caller
    pub async fn create_registry(&self, caller: &Caller, draft: RegistryDraft) -> RegistryResult<Registry> {
        let owner = caller.identity.clone().ok_or(RegistryError::Unauthenticated)?;
        let registry = Registry::new(owner, draft)?;
        self.store.create_registry(registry.clone()).await?;
        info!(registry_id = %registry.id, owner_id = %registry.owner_id, "registry created");
        Ok(registry)
    }

    /// Read a registry with its items
    pub async fn get_registry(&self, caller: &Caller, registry_id: &RegistryId) -> RegistryResult<Registry> {
        self.load_readable(caller, registry_id).await
    }

    /// Edit metadata and optionally apply an owner status action
    pub async fn update_registry(
        &self,
        caller: &Caller,
        registry_id: &RegistryId,
        patch: RegistryPatch,
    ) -> RegistryResult<Registry> {
        let registry = self.load_writable(caller, registry_id).await?;
        patch.validate_against(&registry)?;

        if let Some(target) = patch.status {
            if target != registry.status {
                self.change_status(&registry, target).await?;
            }
        }
        let has_metadata = patch.title.is_some()
            || patch.description.is_some()
            || patch.due_date.is_some()
            || patch.is_public.is_some();
        if has_metadata {
            return Ok(self.store.update_metadata(registry_id, &patch).await?);
        }
        self.load(registry_id).await
    }

    async fn change_status(&self, registry: &Registry, target: RegistryStatus) -> RegistryResult<()> {
        let transition = StateTransition::checked(registry.status, target)
            .ok_or(RegistryError::InvalidStatusTransition {
                from: registry.status,
                to: target,
            })?;
        let moved = self
            .store
            .transition_status(&registry.id, transition.from, transition.to)
            .await?;
        if !moved {
            return Err(RegistryError::validation(
                "registry status changed concurrently, reload and retry",
            ));
        }
        info!(registry_id = %registry.id, from = %transition.from, to = %transition.to, "registry status changed");
        let event = RegistryEvent::RegistryStatusChanged {
            registry_id: registry.id,
            from: transition.from,
            to: transition.to,
            at: transition.timestamp,
        };
        if let Err(e) = self.publisher.publish(vec![event]).await {
            warn!(registry_id = %registry.id, error = %e, "failed to publish status change");
        }
        Ok(())
    }

    /// Delete a registry with everything it owns
    pub async fn delete_registry(&self, caller: &Caller, registry_id: &RegistryId) -> RegistryResult<()> {
        self.load_writable(caller, registry_id).await?;
        if !self.store.delete_registry(registry_id).await? {
            return Err(RegistryError::RegistryNotFound(*registry_id));
        }
        info!(registry_id = %registry_id, "registry deleted");
        Ok(())
    }

    /// Add a line item to an active registry
    pub async fn add_item(
        &self,
        caller: &Caller,
        registry_id: &RegistryId,
        product_ref: &str,
        requested_quantity: u32,
    ) -> RegistryResult<LineItem> {
        let registry = self.load_writable(caller, registry_id).await?;
        Self::require_active(&registry)?;
        let item = LineItem::new(product_ref, requested_quantity)?;
        self.store.add_item(registry_id, item.clone()).await?;
        info!(registry_id = %registry_id, item_id = %item.id, requested_quantity, "item added");
        Ok(item)
    }

    /// Change an item's requested quantity; never below what is claimed
    pub async fn set_requested_quantity(
        &self,
        caller: &Caller,
        registry_id: &RegistryId,
        item_id: &LineItemId,
        requested_quantity: u32,
    ) -> RegistryResult<LineItem> {
        self.load_writable(caller, registry_id).await?;
        if requested_quantity == 0 {
            return Err(RegistryError::validation(
                "requested quantity must be greater than zero",
            ));
        }
        match self
            .store
            .set_requested_quantity(registry_id, item_id, requested_quantity)
            .await?
        {
            QuantityUpdate::Updated(item) => {
                self.reconcile_quietly(registry_id).await;
                Ok(item)
            }
            QuantityUpdate::BelowClaimed { claimed } => Err(RegistryError::validation(format!(
                "requested quantity {requested_quantity} is below the {claimed} already claimed"
            ))),
        }
    }

    /// Remove a line item and its claims from an active registry
    pub async fn remove_item(
        &self,
        caller: &Caller,
        registry_id: &RegistryId,
        item_id: &LineItemId,
    ) -> RegistryResult<LineItem> {
        let registry = self.load_writable(caller, registry_id).await?;
        Self::require_active(&registry)?;
        let item = self.store.remove_item(registry_id, item_id).await?;
        info!(registry_id = %registry_id, item_id = %item_id, claims = item.claims.len(), "item removed");
        self.reconcile_quietly(registry_id).await;
        Ok(item)
    }

    async fn reconcile_quietly(&self, registry_id: &RegistryId) {
        if let Err(e) = self.completion.reconcile(registry_id).await {
            warn!(registry_id = %registry_id, error = %e, "completion check after item edit failed");
        }
    }

    /// Submit a claim on behalf of the caller
    ///
    /// The buyer identity always comes from the caller; whatever the request
    /// carries is replaced.
    pub async fn claim(
        &self,
        caller: &Caller,
        registry_id: &RegistryId,
        item_id: &LineItemId,
        mut request: ClaimRequest,
    ) -> RegistryResult<ClaimRecord> {
        self.load_readable(caller, registry_id).await?;
        request.buyer.identity = caller.identity.clone();
        self.engine.submit(registry_id, item_id, request).await
    }

    /// Purchase endpoint: a `Purchased` claim for the caller
    pub async fn purchase(
        &self,
        caller: &Caller,
        registry_id: &RegistryId,
        purchase: PurchaseRequest,
    ) -> RegistryResult<ClaimRecord> {
        let mut buyer = BuyerInfo::guest(purchase.buyer_name, purchase.buyer_email);
        buyer.phone = purchase.buyer_phone;
        buyer.note = purchase.note;
        let mut request = ClaimRequest::new(purchase.quantity, buyer, ClaimKind::Purchased);
        request.payment_method = purchase.payment_method;
        self.claim(caller, registry_id, &purchase.item_id, request).await
    }

    /// Legacy numeric state setter
    ///
    /// `1` (reserved) and `2` (purchased) claim the item's whole remaining
    /// quantity for the buyer in `user_data`. `0` (pending) is accepted only
    /// when nothing is claimed; claims are never reverted.
    pub async fn set_item_state(
        &self,
        caller: &Caller,
        registry_id: &RegistryId,
        item_id: &LineItemId,
        code: u8,
        user_data: Option<BuyerInfo>,
    ) -> RegistryResult<LegacyStateOutcome> {
        let registry = self.load_readable(caller, registry_id).await?;
        let item = registry
            .item(*item_id)
            .cloned()
            .ok_or(RegistryError::ItemNotFound {
                registry_id: *registry_id,
                item_id: *item_id,
            })?;
        let target = ItemState::from_legacy_code(code)
            .ok_or_else(|| RegistryError::validation(format!("unknown item state {code}")))?;

        let kind = match target {
            ItemState::Pending => {
                if item.claimed_quantity > 0 {
                    return Err(RegistryError::validation(
                        "claims cannot be reverted to pending",
                    ));
                }
                return Ok(LegacyStateOutcome {
                    state: item.state(),
                    item,
                    claim: None,
                });
            }
            ItemState::Reserved | ItemState::Mixed => ClaimKind::Reserved,
            ItemState::Purchased => ClaimKind::Purchased,
        };

        let buyer = user_data
            .ok_or_else(|| RegistryError::InvalidBuyerInfo("userData is required".to_string()))?;
        let remaining = item.remaining();
        if remaining == 0 {
            Self::require_active(&registry)?;
            return Err(RegistryError::InsufficientCapacity {
                requested: 1,
                remaining: 0,
            });
        }
        let record = self
            .claim(caller, registry_id, item_id, ClaimRequest::new(remaining, buyer, kind))
            .await?;
        Ok(LegacyStateOutcome {
            state: record.item.state(),
            item: record.item.clone(),
            claim: Some(record),
        })
    }

    /// Public, active registries with owner names; no items
    pub async fn list_public(&self) -> RegistryResult<Vec<RegistrySummary>> {
        let registries = self.store.list().await?;
        let mut summaries = Vec::new();
        for registry in registries
            .into_iter()
            .filter(|r| r.is_public && r.status == RegistryStatus::Active)
        {
            let owner_name = self.owners.display_name(&registry.owner_id).await;
            summaries.push(RegistrySummary {
                id: registry.id,
                title: registry.title,
                description: registry.description,
                due_date: registry.due_date,
                owner_id: registry.owner_id,
                owner_name,
                status: registry.status,
                created_at: registry.created_at,
            });
        }
        Ok(summaries)
    }

    /// Counts by status, overall and for the current month (admin only)
    pub async fn stats(&self, caller: &Caller) -> RegistryResult<RegistryStats> {
        self.stats_at(caller, Utc::now()).await
    }

    /// Counts by status with "this month" taken from `now`
    pub async fn stats_at(&self, caller: &Caller, now: DateTime<Utc>) -> RegistryResult<RegistryStats> {
        AccessGate::authorize_admin(caller)?;
        let mut stats = RegistryStats::default();
        for registry in self.store.list().await? {
            stats.all.add(registry.status);
            if registry.created_at.year() == now.year() && registry.created_at.month() == now.month() {
                stats.this_month.add(registry.status);
            }
        }
        Ok(stats)
    }

    /// Retry outstanding follow-ups and report whether the registry is settled
    pub async fn settlement(&self, caller: &Caller, registry_id: &RegistryId) -> RegistryResult<SettlementReport> {
        self.load_readable(caller, registry_id).await?;
        self.engine.settlement().settle(registry_id).await
    }
}
