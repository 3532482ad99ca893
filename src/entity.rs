// Copyright 2025 Cowboy AI, LLC.

//! Typed identifiers and the aggregate root contract

use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use uuid::Uuid;

/// A typed entity ID using phantom types for type safety
///
/// The phantom parameter keeps registry, item, claim and order ids from
/// being mixed up at compile time. On the wire the id is a bare UUID string.
///
/// # Examples
///
/// ```rust
/// use cim_domain_registry::{EntityId, RegistryId, LineItemId};
///
/// let registry_id = RegistryId::new();
/// let item_id = LineItemId::new();
///
/// // Different types - won't compile if mixed up:
/// // let _: RegistryId = item_id; // ERROR!
///
/// let parsed: RegistryId = registry_id.to_string().parse().unwrap();
/// assert_eq!(parsed, registry_id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId<T> {
    id: Uuid,
    #[serde(skip)]
    _phantom: PhantomData<T>,
}

impl<T> EntityId<T> {
    /// Create a new random entity ID
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            _phantom: PhantomData,
        }
    }

    /// Create an entity ID from a UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self {
            id,
            _phantom: PhantomData,
        }
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.id
    }
}

impl<T> fmt::Display for EntityId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl<T> Default for EntityId<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromStr for EntityId<T> {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self::from_uuid)
    }
}

impl<T> JsonSchema for EntityId<T> {
    fn schema_name() -> String {
        "EntityId".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        <Uuid as JsonSchema>::json_schema(gen)
    }

    fn is_referenceable() -> bool {
        false
    }
}

impl<T> From<EntityId<T>> for Uuid {
    fn from(id: EntityId<T>) -> Self {
        id.id
    }
}

// Marker types for entity IDs
/// Marker for gift registries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegistryMarker;

/// Marker for registry line items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineItemMarker;

/// Marker for claims placed against a line item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClaimMarker;

/// Marker for external checkout orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderMarker;

/// Registry identifier
pub type RegistryId = EntityId<RegistryMarker>;
/// Line item identifier, unique within its registry
pub type LineItemId = EntityId<LineItemMarker>;
/// Claim identifier
pub type ClaimId = EntityId<ClaimMarker>;
/// External order identifier
pub type OrderId = EntityId<OrderMarker>;
