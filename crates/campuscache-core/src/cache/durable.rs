//! Durable key-value backends for the persistent cache tier.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::error::StorageError;

/// An asynchronous, string-keyed persistent store.
///
/// Removing an absent key is not an error.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError>;

    async fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    async fn all_keys(&self) -> Result<Vec<String>, StorageError>;

    async fn multi_remove(&self, keys: &[String]) -> Result<(), StorageError>;
}

/// Volatile backend. Survives nothing, but satisfies the durable contract,
/// which makes it the store of choice for tests and `--ephemeral` runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned map is still a usable map
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.lock().remove(key);
        Ok(())
    }

    async fn all_keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.lock().keys().cloned().collect())
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<(), StorageError> {
        let mut items = self.lock();
        for key in keys {
            items.remove(key);
        }
        Ok(())
    }
}
