// Copyright 2025 Cowboy AI, LLC.

//! Error types for registry operations

use crate::entity::{ClaimId, LineItemId, RegistryId};
use crate::registry::RegistryStatus;
use thiserror::Error;

/// Errors surfaced to callers of the registry engine
///
/// Every failure carries a kind (see [`ErrorKind`]) and a human readable
/// message. Storage internals never leak through this type: backend failures
/// are logged where they happen and arrive here as [`RegistryError::Internal`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Malformed or missing input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Buyer information is incomplete or malformed
    #[error("Invalid buyer info: {0}")]
    InvalidBuyerInfo(String),

    /// Registry does not exist
    #[error("Registry not found: {0}")]
    RegistryNotFound(RegistryId),

    /// Line item does not exist within the registry
    #[error("Item not found: {item_id} in registry {registry_id}")]
    ItemNotFound {
        /// Registry that was searched
        registry_id: RegistryId,
        /// Item that was searched for
        item_id: LineItemId,
    },

    /// Claim does not exist on the line item
    #[error("Claim not found: {0}")]
    ClaimNotFound(ClaimId),

    /// The caller must identify itself
    #[error("Authentication required")]
    Unauthenticated,

    /// The caller is identified but not allowed
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Not enough remaining quantity on the line item
    #[error("Insufficient capacity: requested {requested}, only {remaining} remaining")]
    InsufficientCapacity {
        /// Quantity the caller asked for
        requested: u32,
        /// Quantity still available when the claim was evaluated
        remaining: u32,
    },

    /// Concurrent claims kept invalidating this one
    #[error("Contention: claim not committed after {attempts} attempts, retry the claim")]
    Contention {
        /// Number of attempts made
        attempts: u32,
    },

    /// The registry no longer accepts claims
    #[error("Registry is not active (status: {status})")]
    RegistryNotActive {
        /// Current registry status
        status: RegistryStatus,
    },

    /// Requested status change is not a legal transition
    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition {
        /// Current status
        from: RegistryStatus,
        /// Requested status
        to: RegistryStatus,
    },

    /// Something failed below the domain layer
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error type returned by claim-submitting operations
pub type ClaimError = RegistryError;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Coarse classification of [`RegistryError`] used for transport mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed/missing input, recoverable by the caller
    Validation,
    /// Registry, item or claim absent
    NotFound,
    /// Caller is not allowed, or not identified
    Authorization,
    /// Expected, user-facing capacity shortfall
    InsufficientCapacity,
    /// Transient; retry the whole claim
    Contention,
    /// Terminal; no retry will help
    RegistryNotActive,
    /// Unexpected failure
    Internal,
}

impl ErrorKind {
    /// Stable machine readable code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Authorization => "authorization_error",
            ErrorKind::InsufficientCapacity => "insufficient_capacity",
            ErrorKind::Contention => "contention",
            ErrorKind::RegistryNotActive => "registry_not_active",
            ErrorKind::Internal => "internal_error",
        }
    }
}

impl RegistryError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        RegistryError::Validation(msg.into())
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::Validation(_)
            | RegistryError::InvalidBuyerInfo(_)
            | RegistryError::InvalidStatusTransition { .. } => ErrorKind::Validation,
            RegistryError::RegistryNotFound(_)
            | RegistryError::ItemNotFound { .. }
            | RegistryError::ClaimNotFound(_) => ErrorKind::NotFound,
            RegistryError::Unauthenticated | RegistryError::Forbidden(_) => {
                ErrorKind::Authorization
            }
            RegistryError::InsufficientCapacity { .. } => ErrorKind::InsufficientCapacity,
            RegistryError::Contention { .. } => ErrorKind::Contention,
            RegistryError::RegistryNotActive { .. } => ErrorKind::RegistryNotActive,
            RegistryError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Check if this is a validation error
    pub fn is_validation_error(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// Check if retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::Contention { .. })
    }

    /// Remaining quantity, for capacity failures
    pub fn remaining(&self) -> Option<u32> {
        match self {
            RegistryError::InsufficientCapacity { remaining, .. } => Some(*remaining),
            _ => None,
        }
    }
}
