// Copyright 2025 Cowboy AI, LLC.

//! Line items: one desired product with a requested quantity

use super::claim::{Claim, ClaimKind};
use crate::entity::LineItemId;
use crate::errors::{RegistryError, RegistryResult};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A desired product within a registry
///
/// `claimed_quantity == sum(claims[].quantity)` and
/// `claimed_quantity <= requested_quantity` hold for every stored item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    /// Item identifier
    pub id: LineItemId,
    /// Opaque reference into the external product catalog
    pub product_ref: String,
    /// Quantity the owner asked for
    pub requested_quantity: u32,
    /// Quantity already claimed
    pub claimed_quantity: u32,
    /// Claims in commit order
    pub claims: Vec<Claim>,
    /// When the item was added
    pub added_at: DateTime<Utc>,
}

impl LineItem {
    /// Create an unclaimed item
    pub fn new(product_ref: impl Into<String>, requested_quantity: u32) -> RegistryResult<Self> {
        let product_ref = product_ref.into();
        if product_ref.trim().is_empty() {
            return Err(RegistryError::validation("product reference is required"));
        }
        if requested_quantity == 0 {
            return Err(RegistryError::validation(
                "requested quantity must be greater than zero",
            ));
        }
        Ok(Self {
            id: LineItemId::new(),
            product_ref,
            requested_quantity,
            claimed_quantity: 0,
            claims: Vec::new(),
            added_at: Utc::now(),
        })
    }

    /// Quantity still open for claims
    pub fn remaining(&self) -> u32 {
        self.requested_quantity.saturating_sub(self.claimed_quantity)
    }

    /// Whether nothing is left to claim
    pub fn is_fully_claimed(&self) -> bool {
        self.claimed_quantity >= self.requested_quantity
    }

    /// Derived legacy state of the item
    pub fn state(&self) -> ItemState {
        let reserved = self.claims.iter().any(|c| c.kind == ClaimKind::Reserved);
        let purchased = self.claims.iter().any(|c| c.kind == ClaimKind::Purchased);
        match (reserved, purchased) {
            (false, false) => ItemState::Pending,
            (true, false) => ItemState::Reserved,
            (false, true) => ItemState::Purchased,
            (true, true) => ItemState::Mixed,
        }
    }

    /// Capacity view used by the reservation engine
    pub fn capacity(&self) -> ItemCapacity {
        ItemCapacity {
            requested: self.requested_quantity,
            claimed: self.claimed_quantity,
        }
    }

    /// Check the quantity invariants
    pub fn check_invariants(&self) -> RegistryResult<()> {
        let sum: u64 = self.claims.iter().map(|c| u64::from(c.quantity)).sum();
        if sum != u64::from(self.claimed_quantity) {
            return Err(RegistryError::Internal(format!(
                "item {} claimed quantity {} does not match claims total {}",
                self.id, self.claimed_quantity, sum
            )));
        }
        if self.claimed_quantity > self.requested_quantity {
            return Err(RegistryError::Internal(format!(
                "item {} over-claimed: {} of {}",
                self.id, self.claimed_quantity, self.requested_quantity
            )));
        }
        Ok(())
    }
}

/// Requested and claimed counts of an item at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCapacity {
    /// Quantity the owner asked for
    pub requested: u32,
    /// Quantity already claimed
    pub claimed: u32,
}

impl ItemCapacity {
    /// Quantity still open for claims
    pub fn remaining(&self) -> u32 {
        self.requested.saturating_sub(self.claimed)
    }
}

/// Read-only projection of an item's claims into the legacy single-state model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    /// Nothing claimed
    Pending,
    /// Only reservations
    Reserved,
    /// Only purchases
    Purchased,
    /// Both reservations and purchases
    Mixed,
}

impl ItemState {
    /// Numeric code of the legacy state endpoint (`0=Pending,1=Reserved,2=Purchased`)
    pub fn legacy_code(&self) -> u8 {
        match self {
            ItemState::Pending => 0,
            ItemState::Reserved | ItemState::Mixed => 1,
            ItemState::Purchased => 2,
        }
    }

    /// Parse a legacy numeric code
    pub fn from_legacy_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ItemState::Pending),
            1 => Some(ItemState::Reserved),
            2 => Some(ItemState::Purchased),
            _ => None,
        }
    }
}
