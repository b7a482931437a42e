//! `memory://` store: process-local objects, for dry runs and tests.

use super::locator::validate_name;
use super::{RemoteStore, StoreError, StoreResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Cloning shares the same objects.
#[derive(Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, name: &str) -> Option<Bytes> {
        self.objects.read().await.get(name).cloned()
    }

    pub async fn insert(&self, name: impl Into<String>, data: Bytes) {
        self.objects.write().await.insert(name.into(), data);
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.objects.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    fn describe(&self) -> String {
        "memory://".to_string()
    }

    fn atomic_replace(&self) -> bool {
        true
    }

    async fn write(&self, name: &str, data: Bytes, overwrite: bool) -> StoreResult<u64> {
        validate_name(name)?;
        let mut objects = self.objects.write().await;
        if !overwrite && objects.contains_key(name) {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        let len = data.len() as u64;
        objects.insert(name.to_string(), data);
        Ok(len)
    }

    async fn read(&self, name: &str) -> StoreResult<Bytes> {
        self.get(name)
            .await
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn delete_if_exists(&self, name: &str) -> StoreResult<()> {
        self.objects.write().await.remove(name);
        Ok(())
    }

    async fn rename_or_replace(&self, from: &str, to: &str) -> StoreResult<()> {
        validate_name(to)?;
        let mut objects = self.objects.write().await;
        let data = objects
            .remove(from)
            .ok_or_else(|| StoreError::NotFound(from.to_string()))?;
        objects.insert(to.to_string(), data);
        Ok(())
    }
}
