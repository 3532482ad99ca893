// Copyright 2025 Cowboy AI, LLC.

//! Settlement of claim follow-ups
//!
//! After a claim commits, the contributor ledger and the completion evaluator
//! must both run at least once. What is still owed is read from the stored
//! registry rather than kept in memory: every authenticated claimer missing
//! from the contributor set, and an active registry whose items are all fully
//! claimed. Any worker can therefore tell whether a registry is settled and
//! finish the follow-ups another worker left behind, through
//! [`SettlementTracker::settle`] or a periodic [`SettlementTracker::sweep`].

use crate::completion::CompletionEvaluator;
use crate::entity::RegistryId;
use crate::errors::{RegistryError, RegistryResult};
use crate::identity::IdentityRef;
use crate::ledger::ContributorLedger;
use crate::registry::{Registry, RegistryStatus};
use crate::store::RegistryStore;
use indexmap::IndexSet;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Follow-ups a stored registry still owes
#[derive(Debug, Default, PartialEq, Eq)]
struct Outstanding {
    contributors: IndexSet<IdentityRef>,
    completion: bool,
}

impl Outstanding {
    fn of(registry: &Registry) -> Self {
        let contributors = registry
            .items
            .iter()
            .flat_map(|item| item.claims.iter())
            .filter_map(|claim| claim.buyer_identity.as_ref())
            .filter(|identity| !registry.has_contributor(identity))
            .cloned()
            .collect();
        Self {
            contributors,
            completion: registry.status == RegistryStatus::Active && registry.is_fully_claimed(),
        }
    }

    fn count(&self) -> usize {
        self.contributors.len() + usize::from(self.completion)
    }
}

/// Outcome of settling a registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReport {
    /// Registry settled
    pub registry_id: RegistryId,
    /// Status after reconciliation
    pub status: RegistryStatus,
    /// Whether no follow-up is outstanding
    pub settled: bool,
    /// Follow-ups still outstanding
    pub pending_follow_ups: usize,
}

/// Runs and retries claim follow-ups per registry
#[derive(Clone)]
pub struct SettlementTracker {
    store: Arc<dyn RegistryStore>,
    ledger: ContributorLedger,
    completion: CompletionEvaluator,
}

impl SettlementTracker {
    /// Create a tracker running the given follow-ups
    pub fn new(
        store: Arc<dyn RegistryStore>,
        ledger: ContributorLedger,
        completion: CompletionEvaluator,
    ) -> Self {
        Self {
            store,
            ledger,
            completion,
        }
    }

    async fn load(&self, registry_id: &RegistryId) -> RegistryResult<Registry> {
        self.store
            .load(registry_id)
            .await?
            .ok_or(RegistryError::RegistryNotFound(*registry_id))
    }

    /// Run the follow-ups of one committed claim
    ///
    /// Returns the status after reconciliation. On failure the error is
    /// returned; the claim itself stands and the stored state still shows the
    /// follow-up as owed.
    pub async fn follow_up(
        &self,
        registry_id: &RegistryId,
        contributor: Option<&IdentityRef>,
    ) -> RegistryResult<RegistryStatus> {
        let ledger = self.ledger.record_contribution(registry_id, contributor).await;
        let reconciled = self.completion.reconcile(registry_id).await;

        if let Err(e) = &ledger {
            warn!(registry_id = %registry_id, error = %e, "contributor follow-up failed");
        }
        if let Err(e) = &reconciled {
            warn!(registry_id = %registry_id, error = %e, "completion follow-up failed");
        }
        ledger?;
        reconciled
    }

    /// Whether the stored registry owes no follow-up
    pub async fn is_settled(&self, registry_id: &RegistryId) -> RegistryResult<bool> {
        let registry = self.load(registry_id).await?;
        Ok(Outstanding::of(&registry).count() == 0)
    }

    /// Run whatever follow-ups the stored registry still owes
    #[tracing::instrument(skip(self, registry_id), fields(registry_id = %registry_id))]
    pub async fn settle(&self, registry_id: &RegistryId) -> RegistryResult<SettlementReport> {
        let registry = self.load(registry_id).await?;
        let owed = Outstanding::of(&registry);

        let mut unrecorded = 0;
        for identity in &owed.contributors {
            match self.ledger.record_contribution(registry_id, Some(identity)).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => return Err(e),
                Err(e) => {
                    warn!(identity = %identity, error = %e, "contributor retry failed");
                    unrecorded += 1;
                }
            }
        }
        let status = self.completion.reconcile(registry_id).await?;

        debug!(status = %status, owed = owed.count(), unrecorded, "settled registry");
        Ok(SettlementReport {
            registry_id: *registry_id,
            status,
            settled: unrecorded == 0,
            pending_follow_ups: unrecorded,
        })
    }

    /// Settle every registry whose stored state owes a follow-up
    pub async fn sweep(&self) -> RegistryResult<Vec<SettlementReport>> {
        let targets: Vec<RegistryId> = self
            .store
            .list()
            .await?
            .iter()
            .filter(|registry| Outstanding::of(registry).count() > 0)
            .map(|registry| registry.id)
            .collect();

        let mut reports = Vec::with_capacity(targets.len());
        for registry_id in targets {
            match self.settle(&registry_id).await {
                Ok(report) => reports.push(report),
                Err(e) if e.is_not_found() => {
                    debug!(registry_id = %registry_id, "registry deleted before settling");
                }
                Err(e) => warn!(registry_id = %registry_id, error = %e, "sweep could not settle"),
            }
        }
        info!(registries = reports.len(), "settlement sweep finished");
        Ok(reports)
    }
}
