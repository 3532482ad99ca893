// Copyright 2025 Cowboy AI, LLC.

//! State machine traits for aggregate status fields
//!
//! Aggregate status enums implement [`State`] and [`StateTransitions`] so that
//! every status change is checked against an explicit transition graph before
//! it reaches the store. A [`StateTransition`] records each accepted move.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Trait for types that can be used as states in a state machine
pub trait State: Debug + Clone + PartialEq + Eq + Send + Sync {
    /// Get the name of this state for logging/debugging
    fn name(&self) -> &'static str;
}

/// Transition graph over a [`State`]
///
/// # Examples
///
/// ```rust
/// use cim_domain_registry::state_machine::{State, StateTransitions};
///
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// enum Door {
///     Open,
///     Closed,
/// }
///
/// impl State for Door {
///     fn name(&self) -> &'static str {
///         match self {
///             Door::Open => "Open",
///             Door::Closed => "Closed",
///         }
///     }
/// }
///
/// impl StateTransitions for Door {
///     fn valid_transitions(&self) -> Vec<Self> {
///         match self {
///             Door::Open => vec![Door::Closed],
///             Door::Closed => vec![Door::Open],
///         }
///     }
/// }
///
/// assert!(Door::Open.can_transition_to(&Door::Closed));
/// assert!(!Door::Open.can_transition_to(&Door::Open));
/// ```
pub trait StateTransitions: State {
    /// Get all valid target states from this state
    fn valid_transitions(&self) -> Vec<Self>;

    /// Check if a transition to the target state is valid
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }
}

/// Record of a state transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition<S> {
    /// The state before the transition
    pub from: S,
    /// The state after the transition
    pub to: S,
    /// When the transition occurred
    pub timestamp: DateTime<Utc>,
}

impl<S: StateTransitions> StateTransition<S> {
    /// Build a transition record if the move is legal
    pub fn checked(from: S, to: S) -> Option<Self> {
        if from.can_transition_to(&to) {
            Some(Self {
                from,
                to,
                timestamp: Utc::now(),
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Light {
        Red,
        Green,
        Off,
    }

    impl State for Light {
        fn name(&self) -> &'static str {
            match self {
                Light::Red => "Red",
                Light::Green => "Green",
                Light::Off => "Off",
            }
        }
    }

    impl StateTransitions for Light {
        fn valid_transitions(&self) -> Vec<Self> {
            match self {
                Light::Red => vec![Light::Green, Light::Off],
                Light::Green => vec![Light::Red, Light::Off],
                Light::Off => vec![],
            }
        }
    }

    #[test]
    fn test_checked_transition_accepts_edges() {
        let t = StateTransition::checked(Light::Red, Light::Green).unwrap();
        assert_eq!(t.from, Light::Red);
        assert_eq!(t.to, Light::Green);
    }

    #[test]
    fn test_checked_transition_rejects_non_edges() {
        assert!(StateTransition::checked(Light::Off, Light::Red).is_none());
        assert!(Light::Off.valid_transitions().is_empty());
    }
}
