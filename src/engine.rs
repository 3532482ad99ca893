// Copyright 2025 Cowboy AI, LLC.

//! Reservation engine
//!
//! Commits claims against a line item's remaining capacity. Capacity is
//! checked twice: once on a fresh read, to fail fast and report the remaining
//! quantity, and again inside the store's guarded append, which is the check
//! that actually protects the invariant. When the store reports that a
//! concurrent write won the race, the engine re-reads and retries a bounded
//! number of times before giving up with [`ClaimError::Contention`].

use crate::completion::CompletionEvaluator;
use crate::config::EngineConfig;
use crate::entity::{LineItemId, RegistryId};
use crate::errors::{ClaimError, RegistryError};
use crate::events::{EventPublisher, RegistryEvent};
use crate::identity::IdentityRef;
use crate::ledger::ContributorLedger;
use crate::registry::{BuyerInfo, Claim, ClaimKind, ClaimRequest, LineItem, RegistryStatus};
use crate::settlement::SettlementTracker;
use crate::store::{CommitOutcome, RegistryStore};
use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a committed claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRecord {
    /// Registry claimed against
    pub registry_id: RegistryId,
    /// The item right after the commit
    pub item: LineItem,
    /// The committed claim
    pub claim: Claim,
    /// Whether every item of the registry is now fully claimed
    pub is_list_complete: bool,
    /// Registry status after completion was re-evaluated
    pub registry_status: RegistryStatus,
    /// Whether every follow-up of this claim has run
    pub settled: bool,
}

/// Validates and commits claims
#[derive(Clone)]
pub struct ReservationEngine {
    store: Arc<dyn RegistryStore>,
    publisher: Arc<dyn EventPublisher>,
    settlement: SettlementTracker,
    config: EngineConfig,
}

impl ReservationEngine {
    /// Create an engine with its ledger, evaluator and settlement tracker
    pub fn new(
        store: Arc<dyn RegistryStore>,
        publisher: Arc<dyn EventPublisher>,
        config: EngineConfig,
    ) -> Self {
        let ledger = ContributorLedger::new(store.clone(), publisher.clone());
        let completion = CompletionEvaluator::new(store.clone(), publisher.clone());
        let settlement = SettlementTracker::new(store.clone(), ledger, completion);
        Self {
            store,
            publisher,
            settlement,
            config,
        }
    }

    /// Settlement tracker fed by this engine
    pub fn settlement(&self) -> &SettlementTracker {
        &self.settlement
    }

    /// Engine settings
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Claim `quantity` of an item for a buyer
    pub async fn submit_claim(
        &self,
        registry_id: &RegistryId,
        item_id: &LineItemId,
        quantity: u32,
        buyer: BuyerInfo,
        kind: ClaimKind,
    ) -> Result<ClaimRecord, ClaimError> {
        self.submit(registry_id, item_id, ClaimRequest::new(quantity, buyer, kind))
            .await
    }

    /// Commit a claim request
    #[tracing::instrument(
        skip(self, registry_id, item_id, request),
        fields(registry_id = %registry_id, item_id = %item_id, quantity = request.quantity)
    )]
    pub async fn submit(
        &self,
        registry_id: &RegistryId,
        item_id: &LineItemId,
        request: ClaimRequest,
    ) -> Result<ClaimRecord, ClaimError> {
        request.validate()?;
        let quantity = request.quantity;
        let contributor = request.buyer.identity.clone();
        let claim = request.into_claim();
        let attempts = self.config.attempts();

        for attempt in 1..=attempts {
            let snapshot = self.store.item_capacity(registry_id, item_id).await?;
            if !snapshot.status.accepts_claims() {
                return Err(RegistryError::RegistryNotActive {
                    status: snapshot.status,
                });
            }
            let remaining = snapshot.capacity.remaining();
            if remaining < quantity {
                debug!(remaining, "not enough remaining quantity");
                return Err(RegistryError::InsufficientCapacity {
                    requested: quantity,
                    remaining,
                });
            }

            match self
                .store
                .commit_claim(registry_id, item_id, claim.clone())
                .await?
            {
                CommitOutcome::Committed(item) => {
                    info!(attempt, claimed = item.claimed_quantity, "claim committed");
                    return Ok(self
                        .after_commit(registry_id, item, claim, contributor)
                        .await);
                }
                CommitOutcome::Insufficient { current } => {
                    return Err(RegistryError::InsufficientCapacity {
                        requested: quantity,
                        remaining: current.remaining(),
                    });
                }
                CommitOutcome::NotActive(status) => {
                    return Err(RegistryError::RegistryNotActive { status });
                }
                CommitOutcome::Stale { current } => {
                    if current.remaining() < quantity {
                        return Err(RegistryError::InsufficientCapacity {
                            requested: quantity,
                            remaining: current.remaining(),
                        });
                    }
                    debug!(attempt, claimed = current.claimed, "claim lost a concurrent write");
                    if attempt < attempts {
                        tokio::time::sleep(self.config.backoff(attempt)).await;
                    }
                }
            }
        }

        warn!(attempts, "claim not committed, retry budget exhausted");
        Err(RegistryError::Contention { attempts })
    }

    async fn after_commit(
        &self,
        registry_id: &RegistryId,
        item: LineItem,
        claim: Claim,
        contributor: Option<IdentityRef>,
    ) -> ClaimRecord {
        let event = RegistryEvent::ClaimCommitted {
            registry_id: *registry_id,
            item_id: item.id,
            claim_id: claim.id,
            quantity: claim.quantity,
            kind: claim.kind,
            claimed_quantity: item.claimed_quantity,
            at: Utc::now(),
        };
        if let Err(e) = self.publisher.publish(vec![event]).await {
            warn!(error = %e, "failed to publish claim event");
        }

        // The claim stands even if a follow-up fails; settle() finishes it later.
        let (registry_status, settled) = match self
            .settlement
            .follow_up(registry_id, contributor.as_ref())
            .await
        {
            Ok(status) => (
                status,
                self.settlement
                    .is_settled(registry_id)
                    .await
                    .unwrap_or(false),
            ),
            Err(_) => {
                let status = self
                    .store
                    .item_capacity(registry_id, &item.id)
                    .await
                    .map(|snapshot| snapshot.status)
                    .unwrap_or(RegistryStatus::Active);
                (status, false)
            }
        };

        ClaimRecord {
            registry_id: *registry_id,
            item,
            claim,
            is_list_complete: registry_status == RegistryStatus::Completed,
            registry_status,
            settled,
        }
    }
}
