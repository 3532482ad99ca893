// Copyright 2025 Cowboy AI, LLC.

//! The registry aggregate root

use super::line_item::LineItem;
use super::status::RegistryStatus;
use crate::entity::{LineItemId, RegistryId};
use crate::errors::{RegistryError, RegistryResult};
use crate::identity::IdentityRef;
use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// An identity that placed at least one claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Contributor {
    /// The contributing identity
    pub identity: IdentityRef,
    /// Time of its first recorded contribution
    pub first_contributed_at: DateTime<Utc>,
}

/// A gift registry with its line items, claims and contributors
///
/// Items and claims have no existence outside the registry: deleting the
/// registry deletes them. Values of this type are snapshots read from a
/// [`RegistryStore`](crate::store::RegistryStore); mutation happens through
/// the store's item-scoped operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    /// Registry identifier
    pub id: RegistryId,
    /// Owning identity
    pub owner_id: IdentityRef,
    /// Title shown to contributors
    pub title: String,
    /// Free-form description
    pub description: String,
    /// Expected date (birth, wedding...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    /// Readable by anyone when true
    pub is_public: bool,
    /// Lifecycle status
    pub status: RegistryStatus,
    /// Line items in display order
    pub items: Vec<LineItem>,
    /// Deduplicated contributors in first-contribution order
    pub contributors: Vec<Contributor>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last metadata or status change
    pub updated_at: DateTime<Utc>,
    /// Header version, bumped on every metadata or status write
    pub version: u64,
}

impl Registry {
    /// Create an active, empty registry
    pub fn new(owner_id: IdentityRef, draft: RegistryDraft) -> RegistryResult<Self> {
        draft.validate()?;
        let now = Utc::now();
        Ok(Self {
            id: RegistryId::new(),
            owner_id,
            title: draft.title.trim().to_string(),
            description: draft.description,
            due_date: draft.due_date,
            is_public: draft.is_public,
            status: RegistryStatus::Active,
            items: Vec::new(),
            contributors: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    /// Find a line item by id
    pub fn item(&self, item_id: LineItemId) -> Option<&LineItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    /// Whether at least one item exists and every item is fully claimed
    pub fn is_fully_claimed(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(LineItem::is_fully_claimed)
    }

    /// Whether `identity` is recorded as a contributor
    pub fn has_contributor(&self, identity: &IdentityRef) -> bool {
        self.contributors.iter().any(|c| &c.identity == identity)
    }
}

/// The registry's own fields, stored apart from its items and contributors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryHeader {
    /// Registry identifier
    pub id: RegistryId,
    /// Owning identity
    pub owner_id: IdentityRef,
    /// Title shown to contributors
    pub title: String,
    /// Free-form description
    pub description: String,
    /// Expected date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    /// Readable by anyone when true
    pub is_public: bool,
    /// Lifecycle status
    pub status: RegistryStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last metadata or status change
    pub updated_at: DateTime<Utc>,
    /// Header version
    pub version: u64,
}

impl RegistryHeader {
    /// Rebuild the full aggregate from its parts
    pub fn assemble(self, items: Vec<LineItem>, contributors: Vec<Contributor>) -> Registry {
        Registry {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title,
            description: self.description,
            due_date: self.due_date,
            is_public: self.is_public,
            status: self.status,
            items,
            contributors,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        }
    }

    /// Record a write: bump the version and the update time
    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

impl Registry {
    /// Split into header, items and contributors
    pub fn into_parts(self) -> (RegistryHeader, Vec<LineItem>, Vec<Contributor>) {
        let header = RegistryHeader {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title,
            description: self.description,
            due_date: self.due_date,
            is_public: self.is_public,
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        };
        (header, self.items, self.contributors)
    }
}

/// Fields supplied when creating a registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistryDraft {
    /// Title shown to contributors
    pub title: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Expected date
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    /// Readable by anyone when true
    #[serde(default)]
    pub is_public: bool,
}

impl RegistryDraft {
    /// Draft with just a title
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Make the registry public
    pub fn public(mut self) -> Self {
        self.is_public = true;
        self
    }

    fn validate(&self) -> RegistryResult<()> {
        if self.title.trim().is_empty() {
            return Err(RegistryError::validation("title is required"));
        }
        Ok(())
    }
}

/// Owner/admin metadata edit
///
/// `owner_id` is accepted on the wire only to reject attempts to change it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistryPatch {
    /// New title
    #[serde(default)]
    pub title: Option<String>,
    /// New description
    #[serde(default)]
    pub description: Option<String>,
    /// New due date
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    /// New visibility
    #[serde(default)]
    pub is_public: Option<bool>,
    /// Must be absent or equal to the current owner
    #[serde(default)]
    pub owner_id: Option<IdentityRef>,
    /// Explicit owner status action (activate, deactivate, reopen)
    #[serde(default)]
    pub status: Option<RegistryStatus>,
}

impl RegistryPatch {
    /// Validate the patch against the current registry
    pub fn validate_against(&self, registry: &Registry) -> RegistryResult<()> {
        if let Some(owner) = &self.owner_id {
            if owner != &registry.owner_id {
                return Err(RegistryError::validation("registry owner cannot be changed"));
            }
        }
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(RegistryError::validation("title cannot be empty"));
            }
        }
        if let Some(status) = self.status {
            if !status.is_owner_settable() {
                return Err(RegistryError::validation(
                    "completed status is derived from claims and cannot be set directly",
                ));
            }
        }
        Ok(())
    }

    /// Apply metadata fields (not status) to a registry header
    pub fn apply_metadata(&self, registry: &mut RegistryHeader) {
        if let Some(title) = &self.title {
            registry.title = title.trim().to_string();
        }
        if let Some(description) = &self.description {
            registry.description = description.clone();
        }
        if let Some(due_date) = self.due_date {
            registry.due_date = Some(due_date);
        }
        if let Some(is_public) = self.is_public {
            registry.is_public = is_public;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::new(IdentityRef::new("owner"), RegistryDraft::titled("Baby Lou")).unwrap()
    }

    #[test]
    fn test_new_registry_is_active_and_empty() {
        let r = registry();
        assert_eq!(r.status, RegistryStatus::Active);
        assert!(r.items.is_empty());
        assert_eq!(r.version, 0);
    }

    #[test]
    fn test_blank_title_rejected() {
        let err = Registry::new(IdentityRef::new("owner"), RegistryDraft::titled("  ")).unwrap_err();
        assert!(err.is_validation_error());
    }

    #[test]
    fn test_empty_registry_is_never_fully_claimed() {
        assert!(!registry().is_fully_claimed());
    }

    #[test]
    fn test_fully_claimed_requires_every_item() {
        let mut r = registry();
        let mut a = LineItem::new("sku-a", 1).unwrap();
        a.claimed_quantity = 1;
        let b = LineItem::new("sku-b", 2).unwrap();
        r.items = vec![a, b];
        assert!(!r.is_fully_claimed());

        r.items[1].claimed_quantity = 2;
        assert!(r.is_fully_claimed());
    }

    #[test]
    fn test_patch_rejects_owner_change() {
        let r = registry();
        let patch = RegistryPatch {
            owner_id: Some(IdentityRef::new("mallory")),
            ..RegistryPatch::default()
        };
        assert!(patch.validate_against(&r).is_err());

        let same_owner = RegistryPatch {
            owner_id: Some(IdentityRef::new("owner")),
            ..RegistryPatch::default()
        };
        assert!(same_owner.validate_against(&r).is_ok());
    }

    #[test]
    fn test_patch_rejects_completed_status() {
        let patch = RegistryPatch {
            status: Some(RegistryStatus::Completed),
            ..RegistryPatch::default()
        };
        assert!(patch.validate_against(&registry()).is_err());
    }

    #[test]
    fn test_patch_applies_metadata() {
        let (mut header, _, _) = registry().into_parts();
        let patch = RegistryPatch {
            title: Some(" New title ".into()),
            is_public: Some(true),
            ..RegistryPatch::default()
        };
        patch.apply_metadata(&mut header);
        assert_eq!(header.title, "New title");
        assert!(header.is_public);
    }

    #[test]
    fn test_parts_round_trip() {
        let mut r = registry();
        r.items.push(LineItem::new("sku-a", 2).unwrap());
        let expected = r.clone();

        let (mut header, items, contributors) = r.into_parts();
        assert_eq!(header.clone().assemble(items.clone(), contributors.clone()), expected);

        header.touch();
        assert_eq!(header.version, 1);
    }
}
