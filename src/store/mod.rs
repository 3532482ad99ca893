// Copyright 2025 Cowboy AI, LLC.

//! Durable persistence of registry aggregates
//!
//! A registry owns its line items, claims and contributors. Stores keep that
//! ownership (deleting a registry deletes everything under it) but never write
//! the aggregate back as a whole: every mutating operation targets the
//! registry header, a single item, or the contributor set, so concurrent
//! writers on different parts never overwrite each other.
//!
//! The capacity-critical primitive is [`RegistryStore::commit_claim`], an
//! item-scoped guarded append: it appends a claim only if the registry is
//! active and `claimed + quantity <= requested` holds at the moment of the
//! write, evaluated in the same atomic step as the append. Backends whose
//! writes are optimistic report a lost race as [`CommitOutcome::Stale`] and
//! leave the retry to the caller.

mod memory;
mod nats_kv;

pub use memory::InMemoryRegistryStore;
pub use nats_kv::NatsKvRegistryStore;

use crate::entity::{ClaimId, LineItemId, RegistryId};
use crate::errors::RegistryError;
use crate::registry::{
    Claim, Contributor, FulfillmentStatus, ItemCapacity, LineItem, Registry, RegistryPatch,
    RegistryStatus,
};
use async_trait::async_trait;
use thiserror::Error;
use tracing::error;

/// Store errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Registry does not exist
    #[error("Registry not found: {0}")]
    RegistryNotFound(RegistryId),

    /// Item does not exist within the registry
    #[error("Item not found: {item_id} in registry {registry_id}")]
    ItemNotFound {
        /// Registry searched
        registry_id: RegistryId,
        /// Item searched for
        item_id: LineItemId,
    },

    /// Claim does not exist on the item
    #[error("Claim not found: {0}")]
    ClaimNotFound(ClaimId),

    /// Record already present
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Stored bytes could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Backend failure
    #[error("Storage error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RegistryNotFound(id) => RegistryError::RegistryNotFound(id),
            StoreError::ItemNotFound {
                registry_id,
                item_id,
            } => RegistryError::ItemNotFound {
                registry_id,
                item_id,
            },
            StoreError::ClaimNotFound(id) => RegistryError::ClaimNotFound(id),
            StoreError::AlreadyExists(what) => {
                RegistryError::validation(format!("already exists: {what}"))
            }
            StoreError::Serialization(_) | StoreError::Backend(_) => {
                error!(error = %err, "registry store failure");
                RegistryError::Internal("storage unavailable".to_string())
            }
        }
    }
}

/// Capacity of one item plus the status of its registry, read together
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacitySnapshot {
    /// Requested/claimed counts
    pub capacity: ItemCapacity,
    /// Registry status at read time
    pub status: RegistryStatus,
}

/// Result of a conditional claim commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The claim was appended; the item as it is after the commit
    Committed(LineItem),
    /// A concurrent write to the item won; nothing was appended
    Stale {
        /// Counts at commit time
        current: ItemCapacity,
    },
    /// The claim does not fit in the remaining capacity
    Insufficient {
        /// Counts at commit time
        current: ItemCapacity,
    },
    /// The registry no longer accepts claims
    NotActive(RegistryStatus),
}

/// Result of an owner edit of an item's requested quantity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuantityUpdate {
    /// The new quantity was stored; the item after the edit
    Updated(LineItem),
    /// The new quantity is lower than what is already claimed
    BelowClaimed {
        /// Quantity already claimed
        claimed: u32,
    },
}

/// Persistence of registry aggregates
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Store a new registry with its initial items
    async fn create_registry(&self, registry: Registry) -> Result<(), StoreError>;

    /// Load a full snapshot of a registry
    async fn load(&self, registry_id: &RegistryId) -> Result<Option<Registry>, StoreError>;

    /// Snapshots of every registry
    async fn list(&self) -> Result<Vec<Registry>, StoreError>;

    /// Delete a registry with its items, claims and contributors
    async fn delete_registry(&self, registry_id: &RegistryId) -> Result<bool, StoreError>;

    /// Apply metadata fields of a patch to the header
    async fn update_metadata(
        &self,
        registry_id: &RegistryId,
        patch: &RegistryPatch,
    ) -> Result<Registry, StoreError>;

    /// Move the status from `from` to `to`; `false` if the status is no longer `from`
    async fn transition_status(
        &self,
        registry_id: &RegistryId,
        from: RegistryStatus,
        to: RegistryStatus,
    ) -> Result<bool, StoreError>;

    /// Append a line item
    async fn add_item(&self, registry_id: &RegistryId, item: LineItem) -> Result<(), StoreError>;

    /// Remove a line item with its claims
    async fn remove_item(
        &self,
        registry_id: &RegistryId,
        item_id: &LineItemId,
    ) -> Result<LineItem, StoreError>;

    /// Change an item's requested quantity, never below its claimed quantity
    async fn set_requested_quantity(
        &self,
        registry_id: &RegistryId,
        item_id: &LineItemId,
        requested: u32,
    ) -> Result<QuantityUpdate, StoreError>;

    /// Read an item's counts and the registry status
    async fn item_capacity(
        &self,
        registry_id: &RegistryId,
        item_id: &LineItemId,
    ) -> Result<CapacitySnapshot, StoreError>;

    /// Append `claim` if the registry is active and the claim fits
    async fn commit_claim(
        &self,
        registry_id: &RegistryId,
        item_id: &LineItemId,
        claim: Claim,
    ) -> Result<CommitOutcome, StoreError>;

    /// Add to the contributor set; `false` if the identity was already present
    async fn add_contributor(
        &self,
        registry_id: &RegistryId,
        contributor: Contributor,
    ) -> Result<bool, StoreError>;

    /// Record the outcome of the order backing a claim
    async fn set_claim_fulfillment(
        &self,
        registry_id: &RegistryId,
        item_id: &LineItemId,
        claim_id: &ClaimId,
        status: FulfillmentStatus,
    ) -> Result<Claim, StoreError>;
}
