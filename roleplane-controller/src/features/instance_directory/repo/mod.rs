use crate::shared::error::{ControllerError, ControllerResult};
use async_trait::async_trait;
use roleplane_core::RoleInstance;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// In-place change applied to a stored instance.
pub type InstanceUpdate =
    Box<dyn for<'r> FnOnce(&'r mut RoleInstance) -> ControllerResult<()> + Send + 'static>;

/// Repository trait for role instance storage
#[async_trait]
pub trait InstanceRepository: Send + Sync {
    /// Store an instance under its uuid. Replaces any previous entry.
    async fn insert(&self, instance: RoleInstance) -> ControllerResult<()>;

    async fn get(&self, uuid: &str) -> ControllerResult<Option<RoleInstance>>;

    /// Apply `update` to the stored instance and return the updated copy.
    async fn update(
        &self,
        uuid: &str,
        update: InstanceUpdate,
    ) -> ControllerResult<RoleInstance>;

    async fn remove(&self, uuid: &str) -> ControllerResult<Option<RoleInstance>>;

    /// All instances, oldest first.
    async fn list(&self) -> ControllerResult<Vec<RoleInstance>>;
}

#[derive(Default)]
struct Entries {
    next_seq: u64,
    by_uuid: HashMap<String, (u64, RoleInstance)>,
}

/// In-memory implementation of the instance repository
#[derive(Clone, Default)]
pub struct InMemoryInstanceRepository {
    storage: Arc<RwLock<Entries>>,
}

impl InMemoryInstanceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_poisoned<T>(_: T) -> ControllerError {
    ControllerError::StorageError("Lock poisoned".to_string())
}

#[async_trait]
impl InstanceRepository for InMemoryInstanceRepository {
    async fn insert(&self, instance: RoleInstance) -> ControllerResult<()> {
        let uuid = instance
            .uuid()
            .ok_or_else(|| ControllerError::StorageError("Instance has no uuid".to_string()))?
            .to_string();

        let mut storage = self.storage.write().map_err(lock_poisoned)?;
        let seq = storage.next_seq;
        storage.next_seq += 1;
        storage.by_uuid.insert(uuid, (seq, instance));
        Ok(())
    }

    async fn get(&self, uuid: &str) -> ControllerResult<Option<RoleInstance>> {
        let storage = self.storage.read().map_err(lock_poisoned)?;
        Ok(storage.by_uuid.get(uuid).map(|(_, instance)| instance.clone()))
    }

    async fn update(
        &self,
        uuid: &str,
        update: InstanceUpdate,
    ) -> ControllerResult<RoleInstance> {
        let mut storage = self.storage.write().map_err(lock_poisoned)?;
        let (_, instance) = storage
            .by_uuid
            .get_mut(uuid)
            .ok_or_else(|| ControllerError::InstanceNotFound(uuid.to_string()))?;

        // Work on a copy so a rejected update leaves the entry untouched.
        let mut updated = instance.clone();
        update(&mut updated)?;
        *instance = updated.clone();
        Ok(updated)
    }

    async fn remove(&self, uuid: &str) -> ControllerResult<Option<RoleInstance>> {
        let mut storage = self.storage.write().map_err(lock_poisoned)?;
        Ok(storage.by_uuid.remove(uuid).map(|(_, instance)| instance))
    }

    async fn list(&self) -> ControllerResult<Vec<RoleInstance>> {
        let storage = self.storage.read().map_err(lock_poisoned)?;
        let mut entries: Vec<_> = storage.by_uuid.values().collect();
        entries.sort_by_key(|(seq, _)| *seq);
        Ok(entries.into_iter().map(|(_, instance)| instance.clone()).collect())
    }
}
