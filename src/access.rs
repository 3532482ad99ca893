// Copyright 2025 Cowboy AI, LLC.

//! Read and write authorization for registries

use crate::errors::{RegistryError, RegistryResult};
use crate::identity::Caller;
use crate::registry::Registry;

/// Decides who may read and modify a registry
///
/// Public registries are readable by anyone, private ones only by their
/// owner or an administrator. Writes (metadata, items, deletion, status) are
/// always owner or admin only. Submitting a claim needs only read access.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessGate;

impl AccessGate {
    /// Whether `caller` may read `registry`
    pub fn can_read(registry: &Registry, caller: &Caller) -> bool {
        registry.is_public || Self::can_write(registry, caller)
    }

    /// Whether `caller` may modify `registry`
    pub fn can_write(registry: &Registry, caller: &Caller) -> bool {
        caller.is_admin || caller.is(&registry.owner_id)
    }

    /// Read access, as an error for the caller
    pub fn authorize_read(registry: &Registry, caller: &Caller) -> RegistryResult<()> {
        if Self::can_read(registry, caller) {
            return Ok(());
        }
        Err(Self::denied(caller, "registry is private"))
    }

    /// Write access, as an error for the caller
    pub fn authorize_write(registry: &Registry, caller: &Caller) -> RegistryResult<()> {
        if Self::can_write(registry, caller) {
            return Ok(());
        }
        Err(Self::denied(caller, "only the owner or an administrator may modify this registry"))
    }

    /// Administrator-only operations
    pub fn authorize_admin(caller: &Caller) -> RegistryResult<()> {
        if caller.is_admin {
            return Ok(());
        }
        Err(Self::denied(caller, "administrator access required"))
    }

    fn denied(caller: &Caller, reason: &str) -> RegistryError {
        if caller.is_authenticated() {
            RegistryError::Forbidden(reason.to_string())
        } else {
            RegistryError::Unauthenticated
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityRef;
    use crate::registry::RegistryDraft;
    use test_case::test_case;

    fn registry(public: bool) -> Registry {
        let draft = RegistryDraft::titled("List");
        let draft = if public { draft.public() } else { draft };
        Registry::new(IdentityRef::new("owner"), draft).unwrap()
    }

    #[test_case(true, Caller::anonymous() => true ; "public anonymous")]
    #[test_case(true, Caller::user("stranger") => true ; "public stranger")]
    #[test_case(false, Caller::anonymous() => false ; "private anonymous")]
    #[test_case(false, Caller::user("stranger") => false ; "private stranger")]
    #[test_case(false, Caller::user("owner") => true ; "private owner")]
    #[test_case(false, Caller::admin("root") => true ; "private admin")]
    fn test_can_read(public: bool, caller: Caller) -> bool {
        AccessGate::can_read(&registry(public), &caller)
    }

    #[test_case(Caller::anonymous() => false ; "anonymous")]
    #[test_case(Caller::user("stranger") => false ; "stranger")]
    #[test_case(Caller::user("owner") => true ; "owner")]
    #[test_case(Caller::admin("root") => true ; "admin")]
    fn test_can_write_public_registry(caller: Caller) -> bool {
        AccessGate::can_write(&registry(true), &caller)
    }

    #[test]
    fn test_denial_distinguishes_anonymous() {
        let private = registry(false);
        assert_eq!(
            AccessGate::authorize_read(&private, &Caller::anonymous()),
            Err(RegistryError::Unauthenticated)
        );
        assert!(matches!(
            AccessGate::authorize_read(&private, &Caller::user("stranger")),
            Err(RegistryError::Forbidden(_))
        ));
        assert!(AccessGate::authorize_read(&private, &Caller::user("owner")).is_ok());
    }

    #[test]
    fn test_admin_only() {
        assert!(AccessGate::authorize_admin(&Caller::admin("root")).is_ok());
        assert!(matches!(
            AccessGate::authorize_admin(&Caller::user("owner")),
            Err(RegistryError::Forbidden(_))
        ));
    }
}
