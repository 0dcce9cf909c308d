//! Local caching for offline and fast-start data access.
//!
//! `CacheStore` keeps portal responses in two tiers: a process-wide memory
//! map and a durable backend (`FileStore` on disk, `MemoryStore` for tests).
//! Entries carry their own TTL and are treated as absent once it elapses.
//!
//! Collaborators pick keys from [`keys`] and TTLs from [`keys::ttl`].

pub mod durable;
pub mod entry;
pub mod error;
pub mod file;
pub mod keys;
pub mod store;

pub use durable::{DurableStore, MemoryStore};
pub use entry::CacheEntry;
pub use error::{CacheError, CacheResult, StorageError};
pub use file::FileStore;
pub use keys::ttl;
pub use store::{BatchReport, CacheOptions, CacheStore, PreloadRequest, DEFAULT_NAMESPACE};
