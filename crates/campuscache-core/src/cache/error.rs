use thiserror::Error;

/// Failure reported by a durable backend.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on durable store: {0}")]
    Io(#[from] std::io::Error),

    #[error("Durable store unavailable: {0}")]
    Unavailable(String),

    #[error("Durable store quota exceeded")]
    QuotaExceeded,
}

/// Why a cache operation degraded.
///
/// These never reach callers of the plain `get`/`set`/`remove`/`clear`
/// methods; they are logged there and turned into a miss or a no-op.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Durable read failed for {key}: {source}")]
    Read {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("Durable write failed for {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("Durable delete failed for {key}: {source}")]
    Delete {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("Durable clear failed: {0}")]
    Clear(#[source] StorageError),

    #[error("Failed to serialize entry for {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Corrupt entry for {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    /// The logical (un-namespaced) key involved, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            CacheError::Read { key, .. }
            | CacheError::Write { key, .. }
            | CacheError::Delete { key, .. }
            | CacheError::Serialize { key, .. }
            | CacheError::Corrupt { key, .. } => Some(key),
            CacheError::Clear(_) => None,
        }
    }
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;
