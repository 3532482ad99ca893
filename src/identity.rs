// Copyright 2025 Cowboy AI, LLC.

//! Caller identities issued by the external authentication system

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Opaque reference to an authenticated identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct IdentityRef(String);

impl IdentityRef {
    /// Wrap an identity string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identity string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdentityRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Who is making a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    /// Authenticated identity; `None` for guests
    pub identity: Option<IdentityRef>,
    /// Administrator privilege
    pub is_admin: bool,
}

impl Caller {
    /// An unauthenticated guest
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// An authenticated, non-admin user
    pub fn user(identity: impl Into<IdentityRef>) -> Self {
        Self {
            identity: Some(identity.into()),
            is_admin: false,
        }
    }

    /// An authenticated administrator
    pub fn admin(identity: impl Into<IdentityRef>) -> Self {
        Self {
            identity: Some(identity.into()),
            is_admin: true,
        }
    }

    /// Whether the caller carries an identity
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// Whether the caller is exactly `identity`
    pub fn is(&self, identity: &IdentityRef) -> bool {
        self.identity.as_ref() == Some(identity)
    }
}

/// Lookup of display names for registry owners
#[async_trait]
pub trait OwnerDirectory: Send + Sync {
    /// Display name of an identity, if known
    async fn display_name(&self, identity: &IdentityRef) -> Option<String>;
}

/// In-memory owner directory
#[derive(Debug, Clone, Default)]
pub struct InMemoryOwnerDirectory {
    names: Arc<RwLock<HashMap<IdentityRef, String>>>,
}

impl InMemoryOwnerDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a display name
    pub async fn insert(&self, identity: impl Into<IdentityRef>, name: impl Into<String>) {
        self.names.write().await.insert(identity.into(), name.into());
    }
}

#[async_trait]
impl OwnerDirectory for InMemoryOwnerDirectory {
    async fn display_name(&self, identity: &IdentityRef) -> Option<String> {
        self.names.read().await.get(identity).cloned()
    }
}
