// Copyright 2025 Cowboy AI, LLC.

//! Registry status state machine

use crate::state_machine::{State, StateTransitions};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a registry
///
/// Serialized with the literal lowercase strings the owning UI uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RegistryStatus {
    /// Accepting claims
    Active,
    /// Every line item is fully claimed
    Completed,
    /// Switched off by its owner
    Inactive,
}

impl RegistryStatus {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryStatus::Active => "active",
            RegistryStatus::Completed => "completed",
            RegistryStatus::Inactive => "inactive",
        }
    }

    /// Whether claims may be committed in this status
    pub fn accepts_claims(&self) -> bool {
        matches!(self, RegistryStatus::Active)
    }

    /// Whether an owner or admin may request this status directly
    ///
    /// `Completed` is derived from item state and only ever set by the
    /// completion evaluator.
    pub fn is_owner_settable(&self) -> bool {
        !matches!(self, RegistryStatus::Completed)
    }
}

impl fmt::Display for RegistryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl State for RegistryStatus {
    fn name(&self) -> &'static str {
        match self {
            RegistryStatus::Active => "Active",
            RegistryStatus::Completed => "Completed",
            RegistryStatus::Inactive => "Inactive",
        }
    }
}

impl StateTransitions for RegistryStatus {
    fn valid_transitions(&self) -> Vec<Self> {
        use RegistryStatus::*;
        match self {
            Active => vec![Completed, Inactive],
            // Completed -> Active is the owner's explicit reopen
            Completed => vec![Active, Inactive],
            Inactive => vec![Active],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;
    use RegistryStatus::*;

    #[test_case(Active, Completed => true)]
    #[test_case(Active, Inactive => true)]
    #[test_case(Completed, Active => true)]
    #[test_case(Completed, Inactive => true)]
    #[test_case(Inactive, Active => true)]
    #[test_case(Inactive, Completed => false)]
    #[test_case(Active, Active => false)]
    #[test_case(Completed, Completed => false)]
    fn test_transition_graph(from: RegistryStatus, to: RegistryStatus) -> bool {
        from.can_transition_to(&to)
    }

    #[test]
    fn test_wire_strings() {
        assert_eq!(serde_json::to_string(&Active).unwrap(), "\"active\"");
        assert_eq!(
            serde_json::from_str::<RegistryStatus>("\"completed\"").unwrap(),
            Completed
        );
        assert_eq!(Inactive.to_string(), "inactive");
    }

    #[test]
    fn test_only_active_accepts_claims() {
        assert!(Active.accepts_claims());
        assert!(!Completed.accepts_claims());
        assert!(!Inactive.accepts_claims());
        assert!(!Completed.is_owner_settable());
    }
}
