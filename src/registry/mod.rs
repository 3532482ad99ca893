// Copyright 2025 Cowboy AI, LLC.

//! Registry aggregate: registry, line items, claims and status

pub mod aggregate;
pub mod claim;
pub mod line_item;
pub mod status;

pub use aggregate::{Contributor, Registry, RegistryDraft, RegistryHeader, RegistryPatch};
pub use claim::{BuyerInfo, Claim, ClaimKind, ClaimRequest, FulfillmentStatus};
pub use line_item::{ItemCapacity, ItemState, LineItem};
pub use status::RegistryStatus;
