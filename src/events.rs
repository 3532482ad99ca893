// Copyright 2025 Cowboy AI, LLC.

//! Domain events emitted by the registry engine
//!
//! Events are facts: a claim was committed, a contributor was recorded, a
//! registry completed. They are handed to an [`EventPublisher`], the seam
//! through which notification delivery (out of this crate) is triggered.

use crate::entity::{ClaimId, LineItemId, OrderId, RegistryId};
use crate::identity::IdentityRef;
use crate::registry::{ClaimKind, RegistryStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Base trait for all domain events
pub trait DomainEvent: Send + Sync + std::fmt::Debug {
    /// Get the aggregate ID this event relates to
    fn aggregate_id(&self) -> Uuid;

    /// Get the event type name
    fn event_type(&self) -> &'static str;

    /// Get the schema version
    fn version(&self) -> &'static str {
        "v1"
    }
}

/// Events of the registry aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RegistryEvent {
    /// A claim passed the capacity check and was stored
    #[serde(rename_all = "camelCase")]
    ClaimCommitted {
        /// Registry claimed against
        registry_id: RegistryId,
        /// Item claimed
        item_id: LineItemId,
        /// New claim
        claim_id: ClaimId,
        /// Claimed quantity
        quantity: u32,
        /// Reservation or purchase
        kind: ClaimKind,
        /// Item's claimed quantity after the commit
        claimed_quantity: u32,
        /// When the commit happened
        at: DateTime<Utc>,
    },
    /// A new identity joined the contributor set
    #[serde(rename_all = "camelCase")]
    ContributorRecorded {
        /// Registry contributed to
        registry_id: RegistryId,
        /// New contributor
        identity: IdentityRef,
        /// When it was recorded
        at: DateTime<Utc>,
    },
    /// Every item is fully claimed; the owner should be notified
    #[serde(rename_all = "camelCase")]
    RegistryCompleted {
        /// Completed registry
        registry_id: RegistryId,
        /// Owner to notify
        owner_id: IdentityRef,
        /// When completion was detected
        at: DateTime<Utc>,
    },
    /// Explicit owner/admin status action
    #[serde(rename_all = "camelCase")]
    RegistryStatusChanged {
        /// Affected registry
        registry_id: RegistryId,
        /// Status before
        from: RegistryStatus,
        /// Status after
        to: RegistryStatus,
        /// When it changed
        at: DateTime<Utc>,
    },
    /// An order's gift line could not be claimed and needs follow-up
    #[serde(rename_all = "camelCase")]
    GiftLinkFailed {
        /// Registry targeted by the order
        registry_id: RegistryId,
        /// Item targeted by the order
        item_id: LineItemId,
        /// The order that stands regardless
        order_id: OrderId,
        /// Why the claim failed
        reason: String,
        /// When the failure was recorded
        at: DateTime<Utc>,
    },
}

impl RegistryEvent {
    /// Registry the event belongs to
    pub fn registry_id(&self) -> RegistryId {
        match self {
            RegistryEvent::ClaimCommitted { registry_id, .. }
            | RegistryEvent::ContributorRecorded { registry_id, .. }
            | RegistryEvent::RegistryCompleted { registry_id, .. }
            | RegistryEvent::RegistryStatusChanged { registry_id, .. }
            | RegistryEvent::GiftLinkFailed { registry_id, .. } => *registry_id,
        }
    }
}

impl DomainEvent for RegistryEvent {
    fn aggregate_id(&self) -> Uuid {
        self.registry_id().into()
    }

    fn event_type(&self) -> &'static str {
        match self {
            RegistryEvent::ClaimCommitted { .. } => "ClaimCommitted",
            RegistryEvent::ContributorRecorded { .. } => "ContributorRecorded",
            RegistryEvent::RegistryCompleted { .. } => "RegistryCompleted",
            RegistryEvent::RegistryStatusChanged { .. } => "RegistryStatusChanged",
            RegistryEvent::GiftLinkFailed { .. } => "GiftLinkFailed",
        }
    }
}

/// Event publisher trait for handlers to emit events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish domain events
    async fn publish(&self, events: Vec<RegistryEvent>) -> Result<(), String>;
}

/// Publisher that keeps every event in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventPublisher {
    published: Arc<RwLock<Vec<RegistryEvent>>>,
}

impl InMemoryEventPublisher {
    /// Create an empty publisher
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event published so far
    pub async fn published(&self) -> Vec<RegistryEvent> {
        self.published.read().await.clone()
    }

    /// Count published events of a type
    pub async fn count_of(&self, event_type: &str) -> usize {
        self.published
            .read()
            .await
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventPublisher {
    async fn publish(&self, events: Vec<RegistryEvent>) -> Result<(), String> {
        self.published.write().await.extend(events);
        Ok(())
    }
}
