//! Campus portal client core.
//!
//! Offline-first access to the university portal: a two-tier TTL cache in
//! front of the REST API, and a cancellable retry executor for the calls
//! that fill it. Frontends build one [`Portal`] at startup and pass it down.

pub mod api;
pub mod cache;
pub mod config;
pub mod models;
pub mod portal;
pub mod retry;

pub use api::{ApiError, PortalClient};
pub use cache::{keys, ttl, BatchReport, CacheStore, DurableStore, FileStore, MemoryStore};
pub use config::Config;
pub use portal::Portal;
pub use retry::{retry, retry_when, Lifetime, Liveness, RetryError, RetryPolicy};
