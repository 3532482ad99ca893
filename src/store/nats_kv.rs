// Copyright 2025 Cowboy AI, LLC.

//! NATS JetStream KV registry store
//!
//! Each registry is spread over several keys so that writers on different
//! parts never rewrite each other's data:
//!
//! - `registry.{id}.meta`: the [`RegistryHeader`]
//! - `registry.{id}.item.{item_id}`: one [`LineItem`] with its claims
//! - `registry.{id}.contributor.{hex(identity)}`: one [`Contributor`]
//!
//! Claims are committed with a revision-conditional update of the item key.
//! The registry status is read from the header key immediately before that
//! update; a status change racing a commit on another key can therefore let
//! one in-flight claim through.

use super::{CapacitySnapshot, CommitOutcome, QuantityUpdate, RegistryStore, StoreError};
use crate::config::NatsStoreConfig;
use crate::entity::{ClaimId, LineItemId, RegistryId};
use crate::identity::IdentityRef;
use crate::registry::{
    Claim, Contributor, FulfillmentStatus, LineItem, Registry, RegistryHeader, RegistryPatch,
    RegistryStatus,
};
use async_nats::jetstream::{self, kv};
use async_nats::Client;
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Display;
use tracing::{debug, info};

/// Retries of a read-modify-write on a single key before giving up
const KEY_UPDATE_ATTEMPTS: usize = 8;

/// Registry store backed by a JetStream key-value bucket
#[derive(Clone)]
pub struct NatsKvRegistryStore {
    kv: kv::Store,
    config: NatsStoreConfig,
}

impl NatsKvRegistryStore {
    /// Open the configured bucket, creating it when missing
    pub async fn new(client: Client, config: NatsStoreConfig) -> Result<Self, StoreError> {
        let js = jetstream::new(client);
        let kv = match js.get_key_value(&config.bucket).await {
            Ok(store) => store,
            Err(_) => js
                .create_key_value(kv::Config {
                    bucket: config.bucket.clone(),
                    history: config.history,
                    storage: jetstream::stream::StorageType::File,
                    ..Default::default()
                })
                .await
                .map_err(backend)?,
        };
        info!(bucket = %config.bucket, "opened registry bucket");
        Ok(Self { kv, config })
    }

    /// Bucket name in use
    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<(T, u64)>, StoreError> {
        let entry = self.kv.entry(key).await.map_err(backend)?;
        match entry {
            Some(entry) if matches!(entry.operation, kv::Operation::Put) => {
                let value = serde_json::from_slice(&entry.value)?;
                Ok(Some((value, entry.revision)))
            }
            _ => Ok(None),
        }
    }

    async fn header(&self, registry_id: &RegistryId) -> Result<(RegistryHeader, u64), StoreError> {
        self.read(&meta_key(registry_id))
            .await?
            .ok_or(StoreError::RegistryNotFound(*registry_id))
    }

    async fn item(
        &self,
        registry_id: &RegistryId,
        item_id: &LineItemId,
    ) -> Result<(LineItem, u64), StoreError> {
        self.read(&item_key(registry_id, item_id))
            .await?
            .ok_or(StoreError::ItemNotFound {
                registry_id: *registry_id,
                item_id: *item_id,
            })
    }

    /// Write `value` only if the key is still at `revision`; `false` on conflict
    async fn update_at<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        revision: u64,
    ) -> Result<bool, StoreError> {
        let bytes = encode(value)?;
        match self.kv.update(key, bytes, revision).await {
            Ok(_) => Ok(true),
            Err(err) => {
                let current = self.kv.entry(key).await.map_err(backend)?;
                match current {
                    Some(entry) if entry.revision == revision => Err(backend(err)),
                    _ => {
                        debug!(key, revision, "conditional update lost the race");
                        Ok(false)
                    }
                }
            }
        }
    }

    /// Write `value` only if the key holds nothing; `false` if it already exists
    async fn create_once<T: Serialize>(&self, key: &str, value: &T) -> Result<bool, StoreError> {
        let bytes = encode(value)?;
        match self.kv.create(key, bytes).await {
            Ok(_) => Ok(true),
            Err(err) => {
                let current = self.kv.entry(key).await.map_err(backend)?;
                match current {
                    Some(entry) if matches!(entry.operation, kv::Operation::Put) => Ok(false),
                    _ => Err(backend(err)),
                }
            }
        }
    }

    async fn registry_keys(&self, registry_id: &RegistryId) -> Result<Vec<String>, StoreError> {
        let prefix = format!("registry.{registry_id}.");
        let keys: Vec<String> = self
            .kv
            .keys()
            .await
            .map_err(backend)?
            .try_collect()
            .await
            .map_err(backend)?;
        Ok(keys.into_iter().filter(|k| k.starts_with(&prefix)).collect())
    }

    async fn assemble(&self, header: RegistryHeader) -> Result<Registry, StoreError> {
        let item_prefix = format!("registry.{}.item.", header.id);
        let contributor_prefix = format!("registry.{}.contributor.", header.id);
        let mut items = Vec::new();
        let mut contributors = Vec::new();
        for key in self.registry_keys(&header.id).await? {
            if key.starts_with(&item_prefix) {
                if let Some((item, _)) = self.read::<LineItem>(&key).await? {
                    items.push(item);
                }
            } else if key.starts_with(&contributor_prefix) {
                if let Some((contributor, _)) = self.read::<Contributor>(&key).await? {
                    contributors.push(contributor);
                }
            }
        }
        items.sort_by(|a, b| {
            a.added_at
                .cmp(&b.added_at)
                .then_with(|| a.id.as_uuid().cmp(b.id.as_uuid()))
        });
        contributors.sort_by(|a, b| a.first_contributed_at.cmp(&b.first_contributed_at));
        Ok(header.assemble(items, contributors))
    }
}

fn backend(err: impl Display) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Bytes, StoreError> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}

fn meta_key(registry_id: &RegistryId) -> String {
    format!("registry.{registry_id}.meta")
}

fn item_key(registry_id: &RegistryId, item_id: &LineItemId) -> String {
    format!("registry.{registry_id}.item.{item_id}")
}

fn contributor_key(registry_id: &RegistryId, identity: &IdentityRef) -> String {
    let encoded: String = identity
        .as_str()
        .bytes()
        .map(|b| format!("{b:02x}"))
        .collect();
    format!("registry.{registry_id}.contributor.{encoded}")
}

fn contended(key: &str) -> StoreError {
    StoreError::Backend(format!("too many concurrent updates on {key}"))
}

#[async_trait]
impl RegistryStore for NatsKvRegistryStore {
    async fn create_registry(&self, registry: Registry) -> Result<(), StoreError> {
        let registry_id = registry.id;
        let (header, items, contributors) = registry.into_parts();
        if !self.create_once(&meta_key(&registry_id), &header).await? {
            return Err(StoreError::AlreadyExists(format!("registry {registry_id}")));
        }
        for item in items {
            self.kv
                .put(item_key(&registry_id, &item.id), encode(&item)?)
                .await
                .map_err(backend)?;
        }
        for contributor in contributors {
            self.kv
                .put(
                    contributor_key(&registry_id, &contributor.identity),
                    encode(&contributor)?,
                )
                .await
                .map_err(backend)?;
        }
        Ok(())
    }

    async fn load(&self, registry_id: &RegistryId) -> Result<Option<Registry>, StoreError> {
        match self.read::<RegistryHeader>(&meta_key(registry_id)).await? {
            Some((header, _)) => Ok(Some(self.assemble(header).await?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Registry>, StoreError> {
        let keys: Vec<String> = self
            .kv
            .keys()
            .await
            .map_err(backend)?
            .try_collect()
            .await
            .map_err(backend)?;
        let mut registries = Vec::new();
        for key in keys.iter().filter(|k| k.starts_with("registry.") && k.ends_with(".meta")) {
            if let Some((header, _)) = self.read::<RegistryHeader>(key).await? {
                registries.push(self.assemble(header).await?);
            }
        }
        registries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(registries)
    }

    async fn delete_registry(&self, registry_id: &RegistryId) -> Result<bool, StoreError> {
        let existed = self
            .read::<RegistryHeader>(&meta_key(registry_id))
            .await?
            .is_some();
        for key in self.registry_keys(registry_id).await? {
            self.kv.purge(&key).await.map_err(backend)?;
        }
        Ok(existed)
    }

    async fn update_metadata(
        &self,
        registry_id: &RegistryId,
        patch: &RegistryPatch,
    ) -> Result<Registry, StoreError> {
        let key = meta_key(registry_id);
        for _ in 0..KEY_UPDATE_ATTEMPTS {
            let (mut header, revision) = self.header(registry_id).await?;
            patch.apply_metadata(&mut header);
            header.touch();
            if self.update_at(&key, &header, revision).await? {
                return self.assemble(header).await;
            }
        }
        Err(contended(&key))
    }

    async fn transition_status(
        &self,
        registry_id: &RegistryId,
        from: RegistryStatus,
        to: RegistryStatus,
    ) -> Result<bool, StoreError> {
        let key = meta_key(registry_id);
        for _ in 0..KEY_UPDATE_ATTEMPTS {
            let (mut header, revision) = self.header(registry_id).await?;
            if header.status != from {
                return Ok(false);
            }
            header.status = to;
            header.touch();
            if self.update_at(&key, &header, revision).await? {
                return Ok(true);
            }
        }
        Err(contended(&key))
    }

    async fn add_item(&self, registry_id: &RegistryId, item: LineItem) -> Result<(), StoreError> {
        self.header(registry_id).await?;
        if !self.create_once(&item_key(registry_id, &item.id), &item).await? {
            return Err(StoreError::AlreadyExists(format!("item {}", item.id)));
        }
        Ok(())
    }

    async fn remove_item(
        &self,
        registry_id: &RegistryId,
        item_id: &LineItemId,
    ) -> Result<LineItem, StoreError> {
        let (item, _) = self.item(registry_id, item_id).await?;
        self.kv
            .purge(item_key(registry_id, item_id))
            .await
            .map_err(backend)?;
        Ok(item)
    }

    async fn set_requested_quantity(
        &self,
        registry_id: &RegistryId,
        item_id: &LineItemId,
        requested: u32,
    ) -> Result<QuantityUpdate, StoreError> {
        let key = item_key(registry_id, item_id);
        for _ in 0..KEY_UPDATE_ATTEMPTS {
            let (mut item, revision) = self.item(registry_id, item_id).await?;
            if requested < item.claimed_quantity {
                return Ok(QuantityUpdate::BelowClaimed {
                    claimed: item.claimed_quantity,
                });
            }
            item.requested_quantity = requested;
            if self.update_at(&key, &item, revision).await? {
                return Ok(QuantityUpdate::Updated(item));
            }
        }
        Err(contended(&key))
    }

    async fn item_capacity(
        &self,
        registry_id: &RegistryId,
        item_id: &LineItemId,
    ) -> Result<CapacitySnapshot, StoreError> {
        let (header, _) = self.header(registry_id).await?;
        let (item, _) = self.item(registry_id, item_id).await?;
        Ok(CapacitySnapshot {
            capacity: item.capacity(),
            status: header.status,
        })
    }

    async fn commit_claim(
        &self,
        registry_id: &RegistryId,
        item_id: &LineItemId,
        claim: Claim,
    ) -> Result<CommitOutcome, StoreError> {
        let (header, _) = self.header(registry_id).await?;
        if !header.status.accepts_claims() {
            return Ok(CommitOutcome::NotActive(header.status));
        }
        let (mut item, revision) = self.item(registry_id, item_id).await?;
        let current = item.capacity();
        if claim.quantity > current.remaining() {
            return Ok(CommitOutcome::Insufficient { current });
        }
        item.claimed_quantity += claim.quantity;
        item.claims.push(claim);
        let key = item_key(registry_id, item_id);
        if self.update_at(&key, &item, revision).await? {
            return Ok(CommitOutcome::Committed(item));
        }
        // Another writer moved the revision; report what it left behind.
        match self.read::<LineItem>(&key).await? {
            Some((latest, _)) => Ok(CommitOutcome::Stale {
                current: latest.capacity(),
            }),
            None => Err(StoreError::ItemNotFound {
                registry_id: *registry_id,
                item_id: *item_id,
            }),
        }
    }

    async fn add_contributor(
        &self,
        registry_id: &RegistryId,
        contributor: Contributor,
    ) -> Result<bool, StoreError> {
        self.header(registry_id).await?;
        let key = contributor_key(registry_id, &contributor.identity);
        self.create_once(&key, &contributor).await
    }

    async fn set_claim_fulfillment(
        &self,
        registry_id: &RegistryId,
        item_id: &LineItemId,
        claim_id: &ClaimId,
        status: FulfillmentStatus,
    ) -> Result<Claim, StoreError> {
        let key = item_key(registry_id, item_id);
        for _ in 0..KEY_UPDATE_ATTEMPTS {
            let (mut item, revision) = self.item(registry_id, item_id).await?;
            let claim = item
                .claims
                .iter_mut()
                .find(|c| &c.id == claim_id)
                .ok_or(StoreError::ClaimNotFound(*claim_id))?;
            claim.fulfillment_status = status;
            let updated = claim.clone();
            if self.update_at(&key, &item, revision).await? {
                return Ok(updated);
            }
        }
        Err(contended(&key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let registry_id = RegistryId::new();
        let item_id = LineItemId::new();
        assert_eq!(meta_key(&registry_id), format!("registry.{registry_id}.meta"));
        assert_eq!(
            item_key(&registry_id, &item_id),
            format!("registry.{registry_id}.item.{item_id}")
        );
    }

    #[test]
    fn test_contributor_key_is_hex_encoded() {
        let registry_id = RegistryId::new();
        let key = contributor_key(&registry_id, &IdentityRef::new("a.b@c"));
        assert_eq!(key, format!("registry.{registry_id}.contributor.612e624063"));
    }
}
