// Copyright 2025 Cowboy AI, LLC.

//! Claims: a single buyer's commitment against a line item

use crate::entity::{ClaimId, OrderId};
use crate::errors::{RegistryError, RegistryResult};
use crate::identity::IdentityRef;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Whether the buyer reserved the gift or already paid for it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ClaimKind {
    /// Promised, to be bought outside the platform
    Reserved,
    /// Bought through checkout
    Purchased,
}

/// Outcome of the external order backing a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FulfillmentStatus {
    /// No outcome reported yet
    Pending,
    /// The order went through
    Completed,
    /// The order was cancelled
    Cancelled,
}

/// Who is claiming
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BuyerInfo {
    /// Display name of the buyer
    pub name: String,
    /// Contact address
    pub email: String,
    /// Optional phone number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Present when the buyer is authenticated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityRef>,
    /// Gift message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl BuyerInfo {
    /// Guest buyer with a name and email
    pub fn guest(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: None,
            identity: None,
            note: None,
        }
    }

    /// Attach an authenticated identity
    pub fn with_identity(mut self, identity: impl Into<IdentityRef>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Attach a phone number
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Attach a gift message
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Require a name and a plausible email address
    pub fn validate(&self) -> RegistryResult<()> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::InvalidBuyerInfo(
                "buyer name is required".to_string(),
            ));
        }
        let email = self.email.trim();
        let valid_email = match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.is_empty()
                    && !domain.contains('@')
                    && !email.chars().any(char::is_whitespace)
            }
            None => false,
        };
        if !valid_email {
            return Err(RegistryError::InvalidBuyerInfo(format!(
                "invalid buyer email: {:?}",
                self.email
            )));
        }
        Ok(())
    }
}

/// An append-only commitment of some quantity of a line item
///
/// Only `fulfillment_status` changes after creation, following the outcome
/// of the external order that backs the claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    /// Claim identifier
    pub id: ClaimId,
    /// Buyer name at claim time
    pub buyer_name: String,
    /// Buyer email at claim time
    pub buyer_email: String,
    /// Buyer phone, if given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_phone: Option<String>,
    /// Authenticated buyer identity, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_identity: Option<IdentityRef>,
    /// Claimed quantity, always positive
    pub quantity: u32,
    /// Reservation or purchase
    pub kind: ClaimKind,
    /// Gift message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Outcome of the backing order
    pub fulfillment_status: FulfillmentStatus,
    /// Order that placed the claim, for checkout purchases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    /// Payment method reported by checkout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
}

/// Input to the reservation engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRequest {
    /// Quantity to claim
    pub quantity: u32,
    /// Who is claiming
    pub buyer: BuyerInfo,
    /// Reservation or purchase
    pub kind: ClaimKind,
    /// Backing order, when placed through checkout
    pub order_id: Option<OrderId>,
    /// Payment method reported by checkout
    pub payment_method: Option<String>,
}

impl ClaimRequest {
    /// A plain claim with no order attached
    pub fn new(quantity: u32, buyer: BuyerInfo, kind: ClaimKind) -> Self {
        Self {
            quantity,
            buyer,
            kind,
            order_id: None,
            payment_method: None,
        }
    }

    /// Attach the order placing the claim
    pub fn for_order(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    /// Attach the payment method
    pub fn with_payment_method(mut self, method: impl Into<String>) -> Self {
        self.payment_method = Some(method.into());
        self
    }

    /// Check preconditions that do not need the store
    pub fn validate(&self) -> RegistryResult<()> {
        if self.quantity == 0 {
            return Err(RegistryError::validation("quantity must be greater than zero"));
        }
        self.buyer.validate()
    }

    /// Materialize the claim record to append
    pub fn into_claim(self) -> Claim {
        Claim {
            id: ClaimId::new(),
            buyer_name: self.buyer.name.trim().to_string(),
            buyer_email: self.buyer.email.trim().to_string(),
            buyer_phone: self.buyer.phone,
            buyer_identity: self.buyer.identity,
            quantity: self.quantity,
            kind: self.kind,
            note: self.buyer.note,
            created_at: Utc::now(),
            fulfillment_status: FulfillmentStatus::Pending,
            order_id: self.order_id,
            payment_method: self.payment_method,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Ana", "ana@example.com" => true ; "valid guest")]
    #[test_case("", "ana@example.com" => false ; "missing name")]
    #[test_case("   ", "ana@example.com" => false ; "blank name")]
    #[test_case("Ana", "" => false ; "missing email")]
    #[test_case("Ana", "ana.example.com" => false ; "no at sign")]
    #[test_case("Ana", "@example.com" => false ; "empty local part")]
    #[test_case("Ana", "ana@" => false ; "empty domain")]
    #[test_case("Ana", "a na@example.com" => false ; "whitespace")]
    fn test_buyer_validation(name: &str, email: &str) -> bool {
        BuyerInfo::guest(name, email).validate().is_ok()
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let req = ClaimRequest::new(0, BuyerInfo::guest("Ana", "ana@example.com"), ClaimKind::Reserved);
        assert!(req.validate().unwrap_err().is_validation_error());
    }

    #[test]
    fn test_into_claim_starts_pending() {
        let buyer = BuyerInfo::guest(" Ana ", "ana@example.com")
            .with_identity("ana")
            .with_note("Congrats!");
        let claim = ClaimRequest::new(2, buyer, ClaimKind::Purchased)
            .with_payment_method("card")
            .into_claim();

        assert_eq!(claim.buyer_name, "Ana");
        assert_eq!(claim.quantity, 2);
        assert_eq!(claim.kind, ClaimKind::Purchased);
        assert_eq!(claim.fulfillment_status, FulfillmentStatus::Pending);
        assert_eq!(claim.buyer_identity, Some(IdentityRef::new("ana")));
        assert_eq!(claim.note.as_deref(), Some("Congrats!"));
        assert_eq!(claim.payment_method.as_deref(), Some("card"));
    }

    #[test]
    fn test_claim_wire_field_names() {
        let claim = ClaimRequest::new(1, BuyerInfo::guest("Ana", "ana@example.com"), ClaimKind::Reserved)
            .into_claim();
        let json = serde_json::to_value(&claim).unwrap();
        assert_eq!(json["buyerName"], "Ana");
        assert_eq!(json["buyerEmail"], "ana@example.com");
        assert_eq!(json["kind"], "reserved");
        assert_eq!(json["fulfillmentStatus"], "pending");
        assert!(json.get("buyerPhone").is_none());
    }
}
