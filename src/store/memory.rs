// Copyright 2025 Cowboy AI, LLC.

//! In-memory registry store
//!
//! Each registry lives in a cell with three independently locked parts: the
//! header, the item table (each item behind its own mutex) and the
//! contributor set. Locks are always taken in the order
//! header, item table, item, contributors.

use super::{CapacitySnapshot, CommitOutcome, QuantityUpdate, RegistryStore, StoreError};
use crate::entity::{ClaimId, LineItemId, RegistryId};
use crate::identity::IdentityRef;
use crate::registry::{
    Claim, Contributor, FulfillmentStatus, LineItem, Registry, RegistryHeader, RegistryPatch,
    RegistryStatus,
};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

struct RegistryCell {
    header: RwLock<RegistryHeader>,
    items: RwLock<IndexMap<LineItemId, Arc<Mutex<LineItem>>>>,
    contributors: Mutex<IndexMap<IdentityRef, Contributor>>,
}

impl RegistryCell {
    fn new(registry: Registry) -> Self {
        let (header, items, contributors) = registry.into_parts();
        Self {
            header: RwLock::new(header),
            items: RwLock::new(
                items
                    .into_iter()
                    .map(|item| (item.id, Arc::new(Mutex::new(item))))
                    .collect(),
            ),
            contributors: Mutex::new(
                contributors
                    .into_iter()
                    .map(|c| (c.identity.clone(), c))
                    .collect(),
            ),
        }
    }

    async fn snapshot(&self) -> Registry {
        let header = self.header.read().await.clone();
        let items = {
            let table = self.items.read().await;
            let mut items = Vec::with_capacity(table.len());
            for item in table.values() {
                items.push(item.lock().await.clone());
            }
            items
        };
        let contributors = self.contributors.lock().await.values().cloned().collect();
        header.assemble(items, contributors)
    }
}

/// Registry store kept in process memory
#[derive(Clone, Default)]
pub struct InMemoryRegistryStore {
    registries: Arc<RwLock<HashMap<RegistryId, Arc<RegistryCell>>>>,
}

impl InMemoryRegistryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    async fn cell(&self, registry_id: &RegistryId) -> Result<Arc<RegistryCell>, StoreError> {
        self.registries
            .read()
            .await
            .get(registry_id)
            .cloned()
            .ok_or(StoreError::RegistryNotFound(*registry_id))
    }
}

fn item_not_found(registry_id: &RegistryId, item_id: &LineItemId) -> StoreError {
    StoreError::ItemNotFound {
        registry_id: *registry_id,
        item_id: *item_id,
    }
}

#[async_trait]
impl RegistryStore for InMemoryRegistryStore {
    async fn create_registry(&self, registry: Registry) -> Result<(), StoreError> {
        let mut registries = self.registries.write().await;
        if registries.contains_key(&registry.id) {
            return Err(StoreError::AlreadyExists(format!("registry {}", registry.id)));
        }
        registries.insert(registry.id, Arc::new(RegistryCell::new(registry)));
        Ok(())
    }

    async fn load(&self, registry_id: &RegistryId) -> Result<Option<Registry>, StoreError> {
        let cell = self.registries.read().await.get(registry_id).cloned();
        match cell {
            Some(cell) => Ok(Some(cell.snapshot().await)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Registry>, StoreError> {
        let cells: Vec<_> = self.registries.read().await.values().cloned().collect();
        let mut registries = Vec::with_capacity(cells.len());
        for cell in cells {
            registries.push(cell.snapshot().await);
        }
        registries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(registries)
    }

    async fn delete_registry(&self, registry_id: &RegistryId) -> Result<bool, StoreError> {
        Ok(self.registries.write().await.remove(registry_id).is_some())
    }

    async fn update_metadata(
        &self,
        registry_id: &RegistryId,
        patch: &RegistryPatch,
    ) -> Result<Registry, StoreError> {
        let cell = self.cell(registry_id).await?;
        {
            let mut header = cell.header.write().await;
            patch.apply_metadata(&mut header);
            header.touch();
        }
        Ok(cell.snapshot().await)
    }

    async fn transition_status(
        &self,
        registry_id: &RegistryId,
        from: RegistryStatus,
        to: RegistryStatus,
    ) -> Result<bool, StoreError> {
        let cell = self.cell(registry_id).await?;
        let mut header = cell.header.write().await;
        if header.status != from {
            return Ok(false);
        }
        header.status = to;
        header.touch();
        Ok(true)
    }

    async fn add_item(&self, registry_id: &RegistryId, item: LineItem) -> Result<(), StoreError> {
        let cell = self.cell(registry_id).await?;
        let mut items = cell.items.write().await;
        if items.contains_key(&item.id) {
            return Err(StoreError::AlreadyExists(format!("item {}", item.id)));
        }
        items.insert(item.id, Arc::new(Mutex::new(item)));
        Ok(())
    }

    async fn remove_item(
        &self,
        registry_id: &RegistryId,
        item_id: &LineItemId,
    ) -> Result<LineItem, StoreError> {
        let cell = self.cell(registry_id).await?;
        let removed = cell
            .items
            .write()
            .await
            .shift_remove(item_id)
            .ok_or_else(|| item_not_found(registry_id, item_id))?;
        let item = removed.lock().await.clone();
        Ok(item)
    }

    async fn set_requested_quantity(
        &self,
        registry_id: &RegistryId,
        item_id: &LineItemId,
        requested: u32,
    ) -> Result<QuantityUpdate, StoreError> {
        let cell = self.cell(registry_id).await?;
        let items = cell.items.read().await;
        let mut item = items
            .get(item_id)
            .ok_or_else(|| item_not_found(registry_id, item_id))?
            .lock()
            .await;
        if requested < item.claimed_quantity {
            return Ok(QuantityUpdate::BelowClaimed {
                claimed: item.claimed_quantity,
            });
        }
        item.requested_quantity = requested;
        Ok(QuantityUpdate::Updated(item.clone()))
    }

    async fn item_capacity(
        &self,
        registry_id: &RegistryId,
        item_id: &LineItemId,
    ) -> Result<CapacitySnapshot, StoreError> {
        let cell = self.cell(registry_id).await?;
        let status = cell.header.read().await.status;
        let items = cell.items.read().await;
        let item = items
            .get(item_id)
            .ok_or_else(|| item_not_found(registry_id, item_id))?
            .lock()
            .await;
        Ok(CapacitySnapshot {
            capacity: item.capacity(),
            status,
        })
    }

    async fn commit_claim(
        &self,
        registry_id: &RegistryId,
        item_id: &LineItemId,
        claim: Claim,
    ) -> Result<CommitOutcome, StoreError> {
        let cell = self.cell(registry_id).await?;
        // Held shared for the whole commit so the status cannot change under it.
        let header = cell.header.read().await;
        if !header.status.accepts_claims() {
            return Ok(CommitOutcome::NotActive(header.status));
        }
        // Held shared so the item cannot be removed while the claim is appended.
        let items = cell.items.read().await;
        let mut item = items
            .get(item_id)
            .ok_or_else(|| item_not_found(registry_id, item_id))?
            .lock()
            .await;

        let current = item.capacity();
        if claim.quantity > current.remaining() {
            return Ok(CommitOutcome::Insufficient { current });
        }
        item.claimed_quantity += claim.quantity;
        item.claims.push(claim);
        Ok(CommitOutcome::Committed(item.clone()))
    }

    async fn add_contributor(
        &self,
        registry_id: &RegistryId,
        contributor: Contributor,
    ) -> Result<bool, StoreError> {
        let cell = self.cell(registry_id).await?;
        let mut contributors = cell.contributors.lock().await;
        if contributors.contains_key(&contributor.identity) {
            return Ok(false);
        }
        contributors.insert(contributor.identity.clone(), contributor);
        Ok(true)
    }

    async fn set_claim_fulfillment(
        &self,
        registry_id: &RegistryId,
        item_id: &LineItemId,
        claim_id: &ClaimId,
        status: FulfillmentStatus,
    ) -> Result<Claim, StoreError> {
        let cell = self.cell(registry_id).await?;
        let items = cell.items.read().await;
        let mut item = items
            .get(item_id)
            .ok_or_else(|| item_not_found(registry_id, item_id))?
            .lock()
            .await;
        let claim = item
            .claims
            .iter_mut()
            .find(|c| &c.id == claim_id)
            .ok_or(StoreError::ClaimNotFound(*claim_id))?;
        claim.fulfillment_status = status;
        Ok(claim.clone())
    }
}
