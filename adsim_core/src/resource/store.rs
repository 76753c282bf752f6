//! Pluggable storage behind the repository.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::types::{Resource, ResourceType};
use crate::error::StoreError;

/// In-place edit applied under the store's per-key lock.
pub type Mutation = Box<dyn FnOnce(&mut Resource) + Send>;

/// Trait to abstract resource persistence. Implementations know nothing
/// about platforms; they key records by type and identifier.
#[async_trait]
pub trait ResourceStore: Send + Sync + 'static {
    /// Insert a new record. Fails with [`StoreError::Conflict`] if the key
    /// is taken.
    async fn create(&self, resource: Resource) -> Result<(), StoreError>;

    async fn find(&self, resource_type: ResourceType, id: &str) -> Result<Option<Resource>, StoreError>;

    /// Apply `mutation` atomically and return the updated record, or `None`
    /// when there is nothing to update.
    async fn update(
        &self,
        resource_type: ResourceType,
        id: &str,
        mutation: Mutation,
    ) -> Result<Option<Resource>, StoreError>;

    /// All records of a type within a scope, in allocation order.
    async fn list(&self, resource_type: ResourceType, scope: &str) -> Result<Vec<Resource>, StoreError>;

    /// Drop every record.
    async fn clear(&self) -> Result<(), StoreError>;
}

/// DashMap-backed store for the lifetime of the process.
#[derive(Clone, Default)]
pub struct InMemoryResourceStore {
    records: Arc<DashMap<(ResourceType, String), Resource>>,
}

impl InMemoryResourceStore {
    /// Creates an empty in-memory resource store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn create(&self, resource: Resource) -> Result<(), StoreError> {
        match self.records.entry((resource.resource_type, resource.id.clone())) {
            Entry::Occupied(_) => Err(StoreError::Conflict(resource.id)),
            Entry::Vacant(slot) => {
                slot.insert(resource);
                Ok(())
            }
        }
    }

    async fn find(&self, resource_type: ResourceType, id: &str) -> Result<Option<Resource>, StoreError> {
        Ok(self
            .records
            .get(&(resource_type, id.to_string()))
            .map(|entry| entry.value().clone()))
    }

    async fn update(
        &self,
        resource_type: ResourceType,
        id: &str,
        mutation: Mutation,
    ) -> Result<Option<Resource>, StoreError> {
        let Some(mut entry) = self.records.get_mut(&(resource_type, id.to_string())) else {
            return Ok(None);
        };
        mutation(entry.value_mut());
        Ok(Some(entry.value().clone()))
    }

    async fn list(&self, resource_type: ResourceType, scope: &str) -> Result<Vec<Resource>, StoreError> {
        let mut items: Vec<Resource> = self
            .records
            .iter()
            .filter(|entry| entry.key().0 == resource_type && entry.value().scope == scope)
            .map(|entry| entry.value().clone())
            .collect();
        items.sort_by_key(|resource| resource.seq);
        Ok(items)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.records.clear();
        Ok(())
    }
}
