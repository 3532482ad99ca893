// Copyright 2025 Cowboy AI, LLC.

//! Deduplicated contributor records

use crate::entity::RegistryId;
use crate::errors::RegistryResult;
use crate::events::{EventPublisher, RegistryEvent};
use crate::identity::IdentityRef;
use crate::registry::Contributor;
use crate::store::RegistryStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Records which identities have contributed to a registry
///
/// Recording is a set-add on the store's contributor set. It never touches
/// item capacity, so it runs outside any claim commit.
#[derive(Clone)]
pub struct ContributorLedger {
    store: Arc<dyn RegistryStore>,
    publisher: Arc<dyn EventPublisher>,
}

impl ContributorLedger {
    /// Create a ledger over a store
    pub fn new(store: Arc<dyn RegistryStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { store, publisher }
    }

    /// Record `identity` as a contributor; returns whether it was new
    ///
    /// Guests (`None`) and identities already present are no-ops.
    pub async fn record_contribution(
        &self,
        registry_id: &RegistryId,
        identity: Option<&IdentityRef>,
    ) -> RegistryResult<bool> {
        let Some(identity) = identity else {
            return Ok(false);
        };
        let contributor = Contributor {
            identity: identity.clone(),
            first_contributed_at: Utc::now(),
        };
        let added = self.store.add_contributor(registry_id, contributor).await?;
        if !added {
            debug!(registry_id = %registry_id, identity = %identity, "contributor already recorded");
            return Ok(false);
        }

        let event = RegistryEvent::ContributorRecorded {
            registry_id: *registry_id,
            identity: identity.clone(),
            at: Utc::now(),
        };
        if let Err(e) = self.publisher.publish(vec![event]).await {
            warn!(registry_id = %registry_id, error = %e, "failed to publish contributor event");
        }
        Ok(true)
    }
}
