//! The portal context: one cache, one API client and one retry policy,
//! built once at startup and handed to whatever needs portal data.
//!
//! Every loader follows the same path: serve from cache when possible,
//! otherwise call the API under the retry policy and cache the result.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use crate::api::{ApiError, PortalClient};
use crate::cache::{
    keys, ttl, BatchReport, CacheStore, DurableStore, FileStore, MemoryStore, PreloadRequest,
};
use crate::config::Config;
use crate::models::{Course, Event, Grade, News, NewUser, ScheduleEntry, UserProfile, UserUpdate};
use crate::retry::{retry_when, Liveness, RetryError, RetryPolicy};

pub type LoadResult<T> = std::result::Result<T, RetryError<ApiError>>;

#[derive(Clone, Debug)]
pub struct Portal {
    cache: CacheStore,
    client: PortalClient,
    retry: RetryPolicy,
}

impl Portal {
    pub fn new(cache: CacheStore, client: PortalClient, retry: RetryPolicy) -> Self {
        Self {
            cache,
            client,
            retry,
        }
    }

    /// Build the context with a file-backed cache in the configured directory.
    pub fn from_config(config: &Config) -> Result<Self> {
        let cache_dir = config.cache_dir()?;
        let store = FileStore::new(cache_dir.clone())
            .with_context(|| format!("Failed to open cache directory {}", cache_dir.display()))?;
        info!(dir = %cache_dir.display(), "Using file cache");
        Self::with_store(config, Arc::new(store))
    }

    /// Build the context with a cache that lives only as long as the process.
    pub fn ephemeral(config: &Config) -> Result<Self> {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(config: &Config, durable: Arc<dyn DurableStore>) -> Result<Self> {
        let mut client =
            PortalClient::new(config.api_base_url()).context("Failed to create API client")?;
        if let Some(ref token) = config.token {
            client.set_token(token.as_str());
        }
        let cache = CacheStore::with_options(durable, config.cache_options());
        Ok(Self::new(cache, client, config.retry_policy()))
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn client(&self) -> &PortalClient {
        &self.client
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// An API call wrapped in the retry policy, ready to hand to the cache.
    fn fetch_with_retry<T, F, Fut>(
        &self,
        liveness: &Liveness,
        call: F,
    ) -> impl Future<Output = LoadResult<T>> + Send + 'static
    where
        T: Send + 'static,
        F: Fn(PortalClient) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, ApiError>> + Send + 'static,
    {
        let client = self.client.clone();
        let policy = self.retry;
        let liveness = liveness.clone();
        async move {
            retry_when(&policy, &liveness, ApiError::is_retryable, move || {
                call(client.clone())
            })
            .await
        }
    }

    async fn load<T, F, Fut>(
        &self,
        key: &str,
        tier: Duration,
        liveness: &Liveness,
        call: F,
    ) -> LoadResult<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: Fn(PortalClient) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, ApiError>> + Send + 'static,
    {
        let fetch = self.fetch_with_retry(liveness, call);
        self.cache.preload(key, move || fetch, Some(tier)).await
    }

    fn request<T, F, Fut>(
        &self,
        key: impl Into<String>,
        tier: Duration,
        liveness: &Liveness,
        call: F,
    ) -> PreloadRequest
    where
        T: Serialize + Send + 'static,
        F: Fn(PortalClient) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, ApiError>> + Send + 'static,
    {
        let fetch = self.fetch_with_retry(liveness, call);
        PreloadRequest::new(key, move || fetch, Some(tier))
    }

    // ===== Loaders =====

    pub async fn news(&self, liveness: &Liveness) -> LoadResult<Vec<News>> {
        self.load(keys::NEWS, ttl::SHORT, liveness, |c| async move {
            c.fetch_news().await
        })
        .await
    }

    pub async fn events(&self, liveness: &Liveness) -> LoadResult<Vec<Event>> {
        self.load(keys::EVENTS, ttl::MEDIUM, liveness, |c| async move {
            c.fetch_events().await
        })
        .await
    }

    pub async fn schedule(
        &self,
        group_id: Option<i64>,
        liveness: &Liveness,
    ) -> LoadResult<Vec<ScheduleEntry>> {
        let key = match group_id {
            Some(group) => keys::schedule_for_group(group),
            None => keys::SCHEDULE.to_string(),
        };
        self.load(&key, ttl::LONG, liveness, move |c| async move {
            c.fetch_schedule(group_id).await
        })
        .await
    }

    pub async fn grades(&self, user_id: i64, liveness: &Liveness) -> LoadResult<Vec<Grade>> {
        self.load(&keys::grades(user_id), ttl::MEDIUM, liveness, move |c| async move {
            c.fetch_grades(user_id).await
        })
        .await
    }

    pub async fn courses(&self, user_id: i64, liveness: &Liveness) -> LoadResult<Vec<Course>> {
        self.load(&keys::courses(user_id), ttl::LONG, liveness, move |c| async move {
            c.fetch_courses(user_id).await
        })
        .await
    }

    pub async fn profile(&self, user_id: i64, liveness: &Liveness) -> LoadResult<UserProfile> {
        self.load(&keys::user_profile(user_id), ttl::DAY, liveness, move |c| async move {
            c.fetch_user_profile(user_id).await
        })
        .await
    }

    pub async fn users(&self, liveness: &Liveness) -> LoadResult<Vec<UserProfile>> {
        self.load(keys::USERS, ttl::SHORT, liveness, |c| async move {
            c.fetch_users().await
        })
        .await
    }

    /// Preload the standard resource set, plus the per-user resources when a
    /// user is given. Individual failures are reported, not raised.
    pub async fn warm(&self, user_id: Option<i64>, liveness: &Liveness) -> BatchReport {
        let mut requests = vec![
            self.request(keys::NEWS, ttl::SHORT, liveness, |c| async move {
                c.fetch_news().await
            }),
            self.request(keys::EVENTS, ttl::MEDIUM, liveness, |c| async move {
                c.fetch_events().await
            }),
            self.request(keys::SCHEDULE, ttl::LONG, liveness, |c| async move {
                c.fetch_schedule(None).await
            }),
        ];

        if let Some(user) = user_id {
            requests.extend([
                self.request(keys::grades(user), ttl::MEDIUM, liveness, move |c| async move {
                    c.fetch_grades(user).await
                }),
                self.request(keys::courses(user), ttl::LONG, liveness, move |c| async move {
                    c.fetch_courses(user).await
                }),
                self.request(keys::user_profile(user), ttl::DAY, liveness, move |c| async move {
                    c.fetch_user_profile(user).await
                }),
            ]);
        }

        let report = self.cache.preload_batch(requests).await;
        info!(loaded = report.loaded, failed = report.failed.len(), "Cache warm-up finished");
        report
    }

    // ===== User Management (admin) =====

    pub async fn create_user(
        &self,
        user: &NewUser,
        liveness: &Liveness,
    ) -> LoadResult<UserProfile> {
        let created = retry_when(&self.retry, liveness, ApiError::is_retryable, || {
            self.client.create_user(user)
        })
        .await?;
        self.cache.remove(keys::USERS).await;
        Ok(created)
    }

    pub async fn update_user(
        &self,
        user_id: i64,
        update: &UserUpdate,
        liveness: &Liveness,
    ) -> LoadResult<UserProfile> {
        let updated = retry_when(&self.retry, liveness, ApiError::is_retryable, || {
            self.client.update_user(user_id, update)
        })
        .await?;
        self.cache.remove(keys::USERS).await;
        self.cache
            .set_with_ttl(&keys::user_profile(user_id), &updated, ttl::DAY)
            .await;
        Ok(updated)
    }

    pub async fn delete_user(&self, user_id: i64, liveness: &Liveness) -> LoadResult<()> {
        retry_when(&self.retry, liveness, ApiError::is_retryable, || {
            self.client.delete_user(user_id)
        })
        .await?;
        self.cache.remove(keys::USERS).await;
        self.cache.remove(&keys::user_profile(user_id)).await;
        Ok(())
    }
}
