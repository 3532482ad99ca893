// Copyright 2025 Cowboy AI, LLC.

//! # CIM Domain Registry
//!
//! Shared gift registry domain for the Composable Information Machine.
//!
//! Owners publish a registry of wanted items with requested quantities; any
//! number of gift givers reserve or buy portions of those quantities at the
//! same time. The crate guarantees that concurrent claims never push an
//! item's claimed quantity above what was requested:
//!
//! - **Registry aggregate**: registry, line items, claims and status
//! - **Store**: item-scoped guarded append, in memory or on NATS JetStream KV
//! - **Reservation engine**: validate, commit, retry on contention
//! - **Contributor ledger**: distinct authenticated contributors
//! - **Completion evaluator**: idempotent Active to Completed move
//! - **Settlement**: follow-up tracking after each commit
//! - **Order linkage**: checkout gift lines to claims
//! - **Service and HTTP API**: caller-facing operations with access control
//!
//! ## Design Principles
//!
//! 1. **Type Safety**: Use phantom types for identifiers
//! 2. **Narrow Writes**: Claims touch one item record, never the whole registry
//! 3. **Controlled State**: Status changes follow an explicit transition graph
//! 4. **Event-Driven**: Every commit and status change emits a domain event

#![warn(missing_docs)]

mod access;
mod completion;
mod engine;
mod entity;
mod errors;
mod events;
mod identity;
mod ledger;
mod orders;
mod service;
mod settlement;

pub mod api;
pub mod config;
pub mod registry;
pub mod state_machine;
pub mod store;

pub use access::AccessGate;
pub use completion::CompletionEvaluator;
pub use config::{ConfigError, EngineConfig, NatsStoreConfig, RegistryConfig, MAX_CLAIM_ATTEMPTS};
pub use engine::{ClaimRecord, ReservationEngine};
pub use entity::{
    ClaimId, ClaimMarker, EntityId, LineItemId, LineItemMarker, OrderId,
    OrderMarker, RegistryId, RegistryMarker,
};
pub use errors::{ClaimError, ErrorKind, RegistryError, RegistryResult};
pub use events::{DomainEvent, EventPublisher, InMemoryEventPublisher, RegistryEvent};
pub use identity::{Caller, IdentityRef, InMemoryOwnerDirectory, OwnerDirectory};
pub use ledger::ContributorLedger;
pub use orders::{
    FollowUp, FollowUpLog, GiftLine, GiftLinkOutcome, InMemoryOrderBook, Order, OrderBook,
    OrderLinkageAdapter,
};
pub use registry::{
    BuyerInfo, Claim, ClaimKind, ClaimRequest, Contributor, FulfillmentStatus, ItemCapacity,
    ItemState, LineItem, Registry, RegistryDraft, RegistryHeader, RegistryPatch, RegistryStatus,
};
pub use service::{
    LegacyStateOutcome, PurchaseRequest, RegistryService, RegistryStats, RegistrySummary,
    StatusCounts,
};
pub use settlement::{SettlementReport, SettlementTracker};
pub use state_machine::{State, StateTransition, StateTransitions};
pub use store::{
    CapacitySnapshot, CommitOutcome, InMemoryRegistryStore, NatsKvRegistryStore, QuantityUpdate,
    RegistryStore, StoreError,
};
