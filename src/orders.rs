// Copyright 2025 Cowboy AI, LLC.

//! Linking checkout orders to registry claims
//!
//! Orders are owned by the external checkout system and are already durable
//! when their gift lines are linked here. Linking never fails an order: a gift
//! line whose claim cannot be committed is flagged for manual follow-up and
//! recorded in a [`FollowUpLog`] for operators.

use crate::engine::{ClaimRecord, ReservationEngine};
use crate::entity::{ClaimId, LineItemId, OrderId, RegistryId};
use crate::errors::{ClaimError, ErrorKind, RegistryError, RegistryResult};
use crate::events::{EventPublisher, RegistryEvent};
use crate::registry::{BuyerInfo, Claim, ClaimKind, ClaimRequest, FulfillmentStatus, RegistryStatus};
use crate::store::RegistryStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// One order line that is a gift for a registry item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftLine {
    /// Target registry
    pub registry_id: RegistryId,
    /// Target item
    pub item_id: LineItemId,
    /// Quantity bought
    pub quantity: u32,
    /// Claim committed for this line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_id: Option<ClaimId>,
    /// Why the line needs manual follow-up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up: Option<String>,
}

impl GiftLine {
    /// Unlinked gift line
    pub fn new(registry_id: RegistryId, item_id: LineItemId, quantity: u32) -> Self {
        Self {
            registry_id,
            item_id,
            quantity,
            claim_id: None,
            follow_up: None,
        }
    }

    /// Whether the line still needs a human
    pub fn needs_follow_up(&self) -> bool {
        self.follow_up.is_some()
    }
}

/// The slice of a checkout order this crate cares about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Order identifier
    pub id: OrderId,
    /// Buyer as entered at checkout
    pub buyer: BuyerInfo,
    /// Payment method reported by checkout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    /// Gift lines of the order
    pub gift_lines: Vec<GiftLine>,
    /// When the order was placed
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// New order with no gift lines
    pub fn new(buyer: BuyerInfo) -> Self {
        Self {
            id: OrderId::new(),
            buyer,
            payment_method: None,
            gift_lines: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Add a gift line
    pub fn with_gift(mut self, registry_id: RegistryId, item_id: LineItemId, quantity: u32) -> Self {
        self.gift_lines.push(GiftLine::new(registry_id, item_id, quantity));
        self
    }

    /// Set the payment method
    pub fn paid_with(mut self, method: impl Into<String>) -> Self {
        self.payment_method = Some(method.into());
        self
    }
}

/// Access to orders held by checkout
#[async_trait]
pub trait OrderBook: Send + Sync {
    /// Load an order
    async fn get_order(&self, order_id: &OrderId) -> RegistryResult<Option<Order>>;

    /// Record the claim committed for a gift line
    async fn attach_gift_claim(
        &self,
        order_id: &OrderId,
        line: usize,
        claim_id: ClaimId,
    ) -> RegistryResult<()>;

    /// Mark a gift line for manual follow-up
    async fn flag_gift_follow_up(
        &self,
        order_id: &OrderId,
        line: usize,
        reason: String,
    ) -> RegistryResult<()>;
}

/// Order book kept in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderBook {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderBook {
    /// Create an empty order book
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an order as checkout would
    pub async fn insert(&self, order: Order) {
        self.orders.write().await.insert(order.id, order);
    }

    async fn with_line<F>(&self, order_id: &OrderId, line: usize, f: F) -> RegistryResult<()>
    where
        F: FnOnce(&mut GiftLine),
    {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| RegistryError::validation(format!("unknown order {order_id}")))?;
        let gift = order.gift_lines.get_mut(line).ok_or_else(|| {
            RegistryError::validation(format!("order {order_id} has no gift line {line}"))
        })?;
        f(gift);
        Ok(())
    }
}

#[async_trait]
impl OrderBook for InMemoryOrderBook {
    async fn get_order(&self, order_id: &OrderId) -> RegistryResult<Option<Order>> {
        Ok(self.orders.read().await.get(order_id).cloned())
    }

    async fn attach_gift_claim(
        &self,
        order_id: &OrderId,
        line: usize,
        claim_id: ClaimId,
    ) -> RegistryResult<()> {
        self.with_line(order_id, line, |gift| {
            gift.claim_id = Some(claim_id);
            gift.follow_up = None;
        })
        .await
    }

    async fn flag_gift_follow_up(
        &self,
        order_id: &OrderId,
        line: usize,
        reason: String,
    ) -> RegistryResult<()> {
        self.with_line(order_id, line, |gift| gift.follow_up = Some(reason))
            .await
    }
}

/// A gift line that could not be linked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUp {
    /// Order that stands regardless
    pub order_id: OrderId,
    /// Registry targeted
    pub registry_id: RegistryId,
    /// Item targeted
    pub item_id: LineItemId,
    /// Quantity that could not be claimed
    pub quantity: u32,
    /// Error code of the failure
    pub code: String,
    /// Human readable reason
    pub reason: String,
    /// When it was recorded
    pub recorded_at: DateTime<Utc>,
}

/// Operator queue of failed gift links
#[derive(Debug, Clone, Default)]
pub struct FollowUpLog {
    entries: Arc<RwLock<Vec<FollowUp>>>,
}

impl FollowUpLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub async fn record(&self, follow_up: FollowUp) {
        self.entries.write().await.push(follow_up);
    }

    /// All entries in recording order
    pub async fn entries(&self) -> Vec<FollowUp> {
        self.entries.read().await.clone()
    }

    /// Entries for one order
    pub async fn for_order(&self, order_id: &OrderId) -> Vec<FollowUp> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|f| &f.order_id == order_id)
            .cloned()
            .collect()
    }
}

/// Outcome of linking one gift line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GiftLinkOutcome {
    /// The claim was committed
    Linked(ClaimRecord),
    /// The line was flagged for follow-up
    NeedsFollowUp(ClaimError),
}

/// Bridges checkout orders to the reservation engine
#[derive(Clone)]
pub struct OrderLinkageAdapter {
    engine: ReservationEngine,
    store: Arc<dyn RegistryStore>,
    orders: Arc<dyn OrderBook>,
    publisher: Arc<dyn EventPublisher>,
    follow_ups: FollowUpLog,
}

impl OrderLinkageAdapter {
    /// Create an adapter
    pub fn new(
        engine: ReservationEngine,
        store: Arc<dyn RegistryStore>,
        orders: Arc<dyn OrderBook>,
        publisher: Arc<dyn EventPublisher>,
        follow_ups: FollowUpLog,
    ) -> Self {
        Self {
            engine,
            store,
            orders,
            publisher,
            follow_ups,
        }
    }

    /// Operator follow-up log
    pub fn follow_ups(&self) -> &FollowUpLog {
        &self.follow_ups
    }

    /// Claim a purchased gift for a committed order
    ///
    /// The error is returned for the caller's information only; the order is
    /// never affected. Failures are flagged on the matching gift line. A gift
    /// this order already claimed is returned as is.
    pub async fn link_order_gift(
        &self,
        order_id: &OrderId,
        registry_id: &RegistryId,
        item_id: &LineItemId,
        quantity: u32,
        buyer: BuyerInfo,
    ) -> Result<ClaimRecord, ClaimError> {
        let order = self.orders.get_order(order_id).await.ok().flatten();
        let line = order.as_ref().and_then(|o| {
            let targets = |g: &GiftLine| &g.registry_id == registry_id && &g.item_id == item_id;
            o.gift_lines
                .iter()
                .position(|g| targets(g) && g.claim_id.is_none())
                .or_else(|| o.gift_lines.iter().position(targets))
        });
        self.link(order_id, order.as_ref(), line, registry_id, item_id, quantity, buyer)
            .await
    }

    /// Link every gift line of an order; never fails
    ///
    /// Safe to repeat: lines that already hold a claim are not claimed again.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id, lines = order.gift_lines.len()))]
    pub async fn link_order_gifts(&self, order: &Order) -> Vec<GiftLinkOutcome> {
        let mut outcomes = Vec::with_capacity(order.gift_lines.len());
        for (line, gift) in order.gift_lines.iter().enumerate() {
            let outcome = self
                .link(
                    &order.id,
                    Some(order),
                    Some(line),
                    &gift.registry_id,
                    &gift.item_id,
                    gift.quantity,
                    order.buyer.clone(),
                )
                .await;
            outcomes.push(match outcome {
                Ok(record) => GiftLinkOutcome::Linked(record),
                Err(e) => GiftLinkOutcome::NeedsFollowUp(e),
            });
        }
        outcomes
    }

    /// Propagate the final order outcome to the claims it placed
    pub async fn record_order_outcome(
        &self,
        order_id: &OrderId,
        completed: bool,
    ) -> RegistryResult<Vec<Claim>> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| RegistryError::validation(format!("unknown order {order_id}")))?;
        let status = if completed {
            FulfillmentStatus::Completed
        } else {
            FulfillmentStatus::Cancelled
        };

        let mut updated = Vec::new();
        for gift in &order.gift_lines {
            let Some(claim_id) = gift.claim_id else {
                continue;
            };
            let claim = self
                .store
                .set_claim_fulfillment(&gift.registry_id, &gift.item_id, &claim_id, status)
                .await?;
            updated.push(claim);
        }
        info!(order_id = %order_id, claims = updated.len(), status = ?status, "recorded order outcome");
        Ok(updated)
    }

    /// The claim this order already placed for a gift line, if any
    ///
    /// A line holding a claim id resolves to that claim. Otherwise a claim on
    /// the item carrying this order's id and not attached to any other line
    /// counts, which covers a commit whose attachment to the order was lost.
    async fn placed_claim(
        &self,
        order_id: &OrderId,
        order: Option<&Order>,
        line: Option<usize>,
        registry_id: &RegistryId,
        item_id: &LineItemId,
    ) -> RegistryResult<Option<ClaimRecord>> {
        let attached = order
            .zip(line)
            .and_then(|(o, line)| o.gift_lines.get(line))
            .and_then(|g| g.claim_id);
        let taken: Vec<ClaimId> = order
            .map(|o| o.gift_lines.iter().filter_map(|g| g.claim_id).collect())
            .unwrap_or_default();

        let Some(registry) = self.store.load(registry_id).await? else {
            return Ok(None);
        };
        let Some(item) = registry.item(*item_id) else {
            return Ok(None);
        };
        let claim = item.claims.iter().find(|c| match attached {
            Some(claim_id) => c.id == claim_id,
            None => c.order_id == Some(*order_id) && !taken.contains(&c.id),
        });
        let Some(claim) = claim.cloned() else {
            return Ok(None);
        };

        let settled = self
            .engine
            .settlement()
            .is_settled(registry_id)
            .await
            .unwrap_or(false);
        Ok(Some(ClaimRecord {
            registry_id: *registry_id,
            item: item.clone(),
            claim,
            is_list_complete: registry.status == RegistryStatus::Completed,
            registry_status: registry.status,
            settled,
        }))
    }

    #[allow(clippy::too_many_arguments)]
    async fn link(
        &self,
        order_id: &OrderId,
        order: Option<&Order>,
        line: Option<usize>,
        registry_id: &RegistryId,
        item_id: &LineItemId,
        quantity: u32,
        buyer: BuyerInfo,
    ) -> Result<ClaimRecord, ClaimError> {
        let attached = order
            .zip(line)
            .and_then(|(o, line)| o.gift_lines.get(line))
            .and_then(|g| g.claim_id);

        let record = match self
            .placed_claim(order_id, order, line, registry_id, item_id)
            .await
        {
            Ok(Some(record)) => {
                debug!(order_id = %order_id, claim_id = %record.claim.id, "gift already claimed by this order");
                record
            }
            Ok(None) => {
                let mut request =
                    ClaimRequest::new(quantity, buyer, ClaimKind::Purchased).for_order(*order_id);
                request.payment_method = order.and_then(|o| o.payment_method.clone());
                match self.engine.submit(registry_id, item_id, request).await {
                    Ok(record) => record,
                    Err(err) => {
                        self.flag(order_id, line, registry_id, item_id, quantity, &err)
                            .await;
                        return Err(err);
                    }
                }
            }
            Err(err) => {
                self.flag(order_id, line, registry_id, item_id, quantity, &err)
                    .await;
                return Err(err);
            }
        };

        if let Some(line) = line {
            if attached != Some(record.claim.id) {
                if let Err(e) = self.orders.attach_gift_claim(order_id, line, record.claim.id).await {
                    warn!(order_id = %order_id, error = %e, "could not attach claim to order");
                }
            }
        }
        Ok(record)
    }

    async fn flag(
        &self,
        order_id: &OrderId,
        line: Option<usize>,
        registry_id: &RegistryId,
        item_id: &LineItemId,
        quantity: u32,
        err: &ClaimError,
    ) {
        warn!(
            order_id = %order_id,
            registry_id = %registry_id,
            item_id = %item_id,
            error = %err,
            "gift line needs manual follow-up"
        );
        let reason = match err.kind() {
            ErrorKind::Internal => "gift could not be recorded".to_string(),
            _ => err.to_string(),
        };

        if let Some(line) = line {
            if let Err(e) = self
                .orders
                .flag_gift_follow_up(order_id, line, reason.clone())
                .await
            {
                warn!(order_id = %order_id, error = %e, "could not flag order gift line");
            }
        }
        self.follow_ups
            .record(FollowUp {
                order_id: *order_id,
                registry_id: *registry_id,
                item_id: *item_id,
                quantity,
                code: err.kind().code().to_string(),
                reason: reason.clone(),
                recorded_at: Utc::now(),
            })
            .await;

        let event = RegistryEvent::GiftLinkFailed {
            registry_id: *registry_id,
            item_id: *item_id,
            order_id: *order_id,
            reason,
            at: Utc::now(),
        };
        if let Err(e) = self.publisher.publish(vec![event]).await {
            warn!(order_id = %order_id, error = %e, "failed to publish gift link failure");
        }
    }
}
