// Copyright 2025 Cowboy AI, LLC.

//! Derived registry completion

use crate::entity::RegistryId;
use crate::errors::{RegistryError, RegistryResult};
use crate::events::{EventPublisher, RegistryEvent};
use crate::registry::RegistryStatus;
use crate::store::RegistryStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Re-derives registry completion from item state
///
/// A registry is complete when it has at least one item and every item is
/// fully claimed. Reconciling moves an active, complete registry to
/// `Completed` exactly once and publishes [`RegistryEvent::RegistryCompleted`]
/// for the owner notification. It never moves a registry back to `Active`.
#[derive(Clone)]
pub struct CompletionEvaluator {
    store: Arc<dyn RegistryStore>,
    publisher: Arc<dyn EventPublisher>,
}

impl CompletionEvaluator {
    /// Create an evaluator over a store
    pub fn new(store: Arc<dyn RegistryStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { store, publisher }
    }

    /// Recompute completion and return the registry status afterwards
    #[tracing::instrument(skip(self, registry_id), fields(registry_id = %registry_id))]
    pub async fn reconcile(&self, registry_id: &RegistryId) -> RegistryResult<RegistryStatus> {
        let registry = self
            .store
            .load(registry_id)
            .await?
            .ok_or(RegistryError::RegistryNotFound(*registry_id))?;

        if registry.status != RegistryStatus::Active || !registry.is_fully_claimed() {
            debug!(status = %registry.status, "no completion change");
            return Ok(registry.status);
        }

        let moved = self
            .store
            .transition_status(registry_id, RegistryStatus::Active, RegistryStatus::Completed)
            .await?;
        if !moved {
            // Someone else changed the status first; report what they left.
            let status = self
                .store
                .load(registry_id)
                .await?
                .map(|r| r.status)
                .ok_or(RegistryError::RegistryNotFound(*registry_id))?;
            debug!(status = %status, "status changed concurrently");
            return Ok(status);
        }

        info!(owner_id = %registry.owner_id, "registry completed");
        let event = RegistryEvent::RegistryCompleted {
            registry_id: *registry_id,
            owner_id: registry.owner_id.clone(),
            at: Utc::now(),
        };
        if let Err(e) = self.publisher.publish(vec![event]).await {
            warn!(error = %e, "failed to publish completion event");
        }
        Ok(RegistryStatus::Completed)
    }
}
