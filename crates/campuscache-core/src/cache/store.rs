//! Two-tier cache store: a shared in-memory map in front of a durable
//! backend, with TTL validity, lazy eviction and stale-while-revalidate
//! preloading.
//!
//! The store is best-effort, not linearizable. Check-then-act paths (lazy
//! eviction in `get`, the hit check in `preload`) are not atomic across the
//! awaited durable I/O, so two concurrent writers to one key race and the
//! last durable write to finish wins. Removal is idempotent, which is all
//! the racing eviction path needs.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::durable::DurableStore;
use super::entry::{now_millis, CacheEntry};
use super::error::{CacheError, CacheResult};
use super::keys::ttl;

/// Prefix on every durable key owned by the cache.
pub const DEFAULT_NAMESPACE: &str = "cache_";

#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub namespace: String,
    pub default_ttl: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            default_ttl: ttl::MEDIUM,
        }
    }
}

/// Handle to the cache. Clone is cheap; all clones share both tiers.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<Inner>,
}

struct Inner {
    memory: RwLock<HashMap<String, CacheEntry<Value>>>,
    durable: Arc<dyn DurableStore>,
    options: CacheOptions,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("durable", &self.inner.durable.name())
            .field("namespace", &self.inner.options.namespace)
            .field("memory_entries", &self.memory_len())
            .finish()
    }
}

type BoxFetcher = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<Value>> + Send>;

/// One resource in a `preload_batch` call.
pub struct PreloadRequest {
    pub key: String,
    pub ttl: Option<Duration>,
    fetcher: BoxFetcher,
}

impl PreloadRequest {
    pub fn new<T, E, F, Fut>(key: impl Into<String>, fetcher: F, ttl: Option<Duration>) -> Self
    where
        T: Serialize + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let fetcher: BoxFetcher = Box::new(move || {
            async move {
                let data = fetcher().await.map_err(Into::<anyhow::Error>::into)?;
                Ok::<Value, anyhow::Error>(serde_json::to_value(data)?)
            }
            .boxed()
        });
        Self {
            key: key.into(),
            ttl,
            fetcher,
        }
    }
}

impl std::fmt::Debug for PreloadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreloadRequest")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Outcome of a `preload_batch` call. Failures are reported, never raised.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub loaded: usize,
    pub failed: Vec<String>,
}

impl BatchReport {
    pub fn all_loaded(&self) -> bool {
        self.failed.is_empty()
    }
}

impl CacheStore {
    pub fn new(durable: Arc<dyn DurableStore>) -> Self {
        Self::with_options(durable, CacheOptions::default())
    }

    pub fn with_options(durable: Arc<dyn DurableStore>, options: CacheOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                memory: RwLock::new(HashMap::new()),
                durable,
                options,
            }),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.inner.options.namespace
    }

    pub fn default_ttl(&self) -> Duration {
        self.inner.options.default_ttl
    }

    fn durable_key(&self, key: &str) -> String {
        format!("{}{}", self.inner.options.namespace, key)
    }

    fn memory(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry<Value>>> {
        self.inner.memory.read().unwrap_or_else(|e| e.into_inner())
    }

    fn memory_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry<Value>>> {
        self.inner.memory.write().unwrap_or_else(|e| e.into_inner())
    }

    // ===== Degradation-reporting operations =====

    /// Write `data` under `key`. The memory tier is updated before the
    /// durable write is attempted, so an `Err` here still leaves the value
    /// readable for the rest of the process.
    pub async fn try_set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        data: &T,
        ttl: Duration,
    ) -> CacheResult<()> {
        let value = serde_json::to_value(data).map_err(|source| CacheError::Serialize {
            key: key.to_string(),
            source,
        })?;
        let entry = CacheEntry::new(value, ttl);
        let serialized = serde_json::to_string(&entry).map_err(|source| CacheError::Serialize {
            key: key.to_string(),
            source,
        })?;

        self.memory_mut().insert(key.to_string(), entry);

        self.inner
            .durable
            .set_item(&self.durable_key(key), serialized)
            .await
            .map_err(|source| CacheError::Write {
                key: key.to_string(),
                source,
            })
    }

    /// Find a valid entry, promoting durable hits into memory and evicting
    /// expired ones from both tiers.
    pub async fn try_peek(&self, key: &str) -> CacheResult<Option<CacheEntry<Value>>> {
        let now = now_millis();
        {
            let mut memory = self.memory_mut();
            match memory.get(key).map(|entry| entry.is_valid_at(now)) {
                Some(true) => {
                    debug!(key, "Cache hit (memory)");
                    return Ok(memory.get(key).cloned());
                }
                Some(false) => {
                    memory.remove(key);
                }
                None => {}
            }
        }

        let durable_key = self.durable_key(key);
        let raw = self
            .inner
            .durable
            .get_item(&durable_key)
            .await
            .map_err(|source| CacheError::Read {
                key: key.to_string(),
                source,
            })?;
        let Some(raw) = raw else {
            debug!(key, "Cache miss");
            return Ok(None);
        };

        let entry: CacheEntry<Value> =
            serde_json::from_str(&raw).map_err(|source| CacheError::Corrupt {
                key: key.to_string(),
                source,
            })?;

        if entry.is_valid_at(now_millis()) {
            let mut memory = self.memory_mut();
            // A concurrent writer may have stored something newer while we read
            if let Some(current) = memory.get(key) {
                if current.is_valid() && current.written_at >= entry.written_at {
                    debug!(key, "Cache hit (memory, written during durable read)");
                    return Ok(Some(current.clone()));
                }
            }
            debug!(key, "Cache hit (durable), promoting to memory");
            memory.insert(key.to_string(), entry.clone());
            return Ok(Some(entry));
        }

        debug!(key, "Cache entry expired, evicting");
        {
            // Keep a fresh value a concurrent writer stored while we were reading
            let mut memory = self.memory_mut();
            if memory.get(key).is_some_and(|e| !e.is_valid()) {
                memory.remove(key);
            }
        }
        self.inner
            .durable
            .remove_item(&durable_key)
            .await
            .map_err(|source| CacheError::Delete {
                key: key.to_string(),
                source,
            })?;
        Ok(None)
    }

    pub async fn try_get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        match self.try_peek(key).await? {
            Some(entry) => serde_json::from_value(entry.data)
                .map(Some)
                .map_err(|source| CacheError::Corrupt {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    pub async fn try_remove(&self, key: &str) -> CacheResult<()> {
        self.memory_mut().remove(key);
        self.inner
            .durable
            .remove_item(&self.durable_key(key))
            .await
            .map_err(|source| CacheError::Delete {
                key: key.to_string(),
                source,
            })
    }

    /// Drop every memory entry and every durable key under the namespace.
    /// Durable keys outside the namespace are left alone.
    pub async fn try_clear(&self) -> CacheResult<()> {
        self.memory_mut().clear();

        let namespace = &self.inner.options.namespace;
        let keys: Vec<String> = self
            .inner
            .durable
            .all_keys()
            .await
            .map_err(CacheError::Clear)?
            .into_iter()
            .filter(|k| k.starts_with(namespace.as_str()))
            .collect();

        debug!(count = keys.len(), "Clearing durable cache keys");
        self.inner
            .durable
            .multi_remove(&keys)
            .await
            .map_err(CacheError::Clear)
    }

    // ===== Never-failing operations =====

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, data: &T) {
        self.set_with_ttl(key, data, self.default_ttl()).await;
    }

    pub async fn set_with_ttl<T: Serialize + ?Sized>(&self, key: &str, data: &T, ttl: Duration) {
        if let Err(e) = self.try_set(key, data, ttl).await {
            warn!(key, error = %e, "Cache write degraded");
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.try_get(key).await.unwrap_or_else(|e| {
            warn!(key, error = %e, "Cache read degraded, treating as miss");
            None
        })
    }

    /// Like `get`, but returns the raw entry with its timestamps.
    pub async fn peek(&self, key: &str) -> Option<CacheEntry<Value>> {
        self.try_peek(key).await.unwrap_or_else(|e| {
            warn!(key, error = %e, "Cache read degraded, treating as miss");
            None
        })
    }

    pub async fn remove(&self, key: &str) {
        if let Err(e) = self.try_remove(key).await {
            warn!(key, error = %e, "Cache remove degraded");
        }
    }

    pub async fn clear(&self) {
        if let Err(e) = self.try_clear().await {
            warn!(error = %e, "Cache clear degraded");
        }
    }

    // ===== Fetch patterns =====

    /// Stale-while-revalidate load.
    ///
    /// With a valid cached value, returns it at once and refreshes the key in
    /// a background task; refresh failures are only logged. Without one,
    /// awaits `fetcher`, caches the result and returns it. First-load fetch
    /// errors are returned to the caller and nothing is cached.
    pub async fn preload<T, E, F, Fut>(
        &self,
        key: &str,
        fetcher: F,
        ttl: Option<Duration>,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        E: std::fmt::Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let ttl = ttl.unwrap_or(self.default_ttl());

        if let Some(cached) = self.get::<T>(key).await {
            self.revalidate(key, fetcher, ttl);
            return Ok(cached);
        }

        let data = fetcher().await?;
        self.set_with_ttl(key, &data, ttl).await;
        Ok(data)
    }

    fn revalidate<T, E, F, Fut>(&self, key: &str, fetcher: F, ttl: Duration) -> JoinHandle<()>
    where
        T: Serialize + Send + Sync + 'static,
        E: std::fmt::Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let store = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            match fetcher().await {
                Ok(fresh) => {
                    store.set_with_ttl(&key, &fresh, ttl).await;
                    debug!(key = %key, "Background refresh stored");
                }
                Err(e) => debug!(key = %key, error = %e, "Background refresh failed"),
            }
        })
    }

    /// Run many `preload`s concurrently. A failing request never affects the
    /// others and never fails the batch.
    pub async fn preload_batch(&self, requests: Vec<PreloadRequest>) -> BatchReport {
        let loads = requests.into_iter().map(|request| {
            let store = self.clone();
            async move {
                let PreloadRequest { key, ttl, fetcher } = request;
                let outcome = store.preload::<Value, _, _, _>(&key, fetcher, ttl).await;
                (key, outcome)
            }
        });

        let mut report = BatchReport::default();
        for (key, outcome) in futures::future::join_all(loads).await {
            match outcome {
                Ok(_) => report.loaded += 1,
                Err(e) => {
                    debug!(key = %key, error = %e, "Batch preload entry failed");
                    report.failed.push(key);
                }
            }
        }
        report
    }

    /// Read-through load without background refresh: a hit is returned as
    /// is, a miss is fetched and cached.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        key: &str,
        fetcher: F,
        ttl: Option<Duration>,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get::<T>(key).await {
            return Ok(cached);
        }
        let data = fetcher().await?;
        self.set_with_ttl(key, &data, ttl.unwrap_or(self.default_ttl()))
            .await;
        Ok(data)
    }

    // ===== Memory tier =====

    pub fn memory_len(&self) -> usize {
        self.memory().len()
    }

    /// Drop a key from memory only; the durable copy stays.
    pub fn evict_memory(&self, key: &str) {
        self.memory_mut().remove(key);
    }

    /// Drop the whole memory tier, as a process restart would.
    pub fn clear_memory(&self) {
        self.memory_mut().clear();
    }
}
