//! File-backed durable store.
//!
//! Each key lives in its own JSON file inside the cache directory. Keys are
//! escaped into file names (`%XX` for anything outside `[A-Za-z0-9_-]`) so
//! any string key round-trips through `all_keys`.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::durable::DurableStore;
use super::error::StorageError;

const FILE_EXTENSION: &str = ".json";
const TEMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn item_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}{}", encode_key(key), FILE_EXTENSION))
    }
}

#[async_trait]
impl DurableStore for FileStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        match tokio::fs::read_to_string(self.item_path(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError> {
        let dir = self.dir.clone();
        let path = self.item_path(key);
        tokio::task::spawn_blocking(move || write_atomic(&dir, &path, value.as_bytes()))
            .await
            .map_err(|e| StorageError::Unavailable(format!("Write task failed: {}", e)))?
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.item_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn all_keys(&self) -> Result<Vec<String>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(stem) = name.strip_suffix(FILE_EXTENSION) else {
                continue;
            };
            match decode_key(stem) {
                Some(key) => keys.push(key),
                None => debug!(file = name, "Skipping foreign file in cache directory"),
            }
        }
        Ok(keys)
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<(), StorageError> {
        for key in keys {
            self.remove_item(key).await?;
        }
        Ok(())
    }
}

/// Write into a fresh temp file in `dir`, then rename it over `path`.
/// Each write gets its own temp file, so concurrent writers to one key
/// never share a half-written file; the last rename wins.
fn write_atomic(dir: &Path, path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".")
        .suffix(TEMP_SUFFIX)
        .tempfile_in(dir)?;
    tmp.write_all(contents)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn decode_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = name.get(i + 1..i + 3)?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            }
            b if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' => {
                out.push(b);
                i += 1;
            }
            _ => return None,
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (FileStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::new(temp_dir.path().to_path_buf()).expect("Failed to create store");
        (store, temp_dir)
    }

    #[test]
    fn test_key_encoding_escapes_separators() {
        assert_eq!(encode_key("cache_news_list"), "cache_news_list");
        assert_eq!(encode_key("cache_a/b.c"), "cache_a%2Fb%2Ec");
        assert_eq!(decode_key("cache_a%2Fb%2Ec").as_deref(), Some("cache_a/b.c"));
        assert_eq!(decode_key("bad.name"), None);
        assert_eq!(decode_key("trunc%2"), None);
    }

    #[test]
    fn test_key_encoding_handles_unicode() {
        let key = "cache_новости";
        assert_eq!(decode_key(&encode_key(key)).as_deref(), Some(key));
    }

    #[tokio::test]
    async fn test_set_creates_file_in_cache_directory() {
        let (store, temp_dir) = create_test_store();

        store.set_item("cache_k", "{\"v\":1}".to_string()).await.unwrap();

        let path = temp_dir.path().join("cache_k.json");
        assert!(path.exists(), "Cache file should exist");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "{\"v\":1}");
    }

    #[tokio::test]
    async fn test_get_missing_key_is_none() {
        let (store, _temp_dir) = create_test_store();
        assert_eq!(store.get_item("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_recreates_deleted_directory() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested").join("cache");
        let store = FileStore::new(nested.clone()).unwrap();
        std::fs::remove_dir_all(&nested).unwrap();

        store.set_item("k", "v".to_string()).await.unwrap();

        assert_eq!(store.get_item("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_all_keys_ignores_foreign_files() {
        let (store, temp_dir) = create_test_store();
        store.set_item("cache_a", "1".to_string()).await.unwrap();
        store.set_item("other x", "2".to_string()).await.unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "hi").unwrap();
        std::fs::write(temp_dir.path().join("weird.name.json"), "{}").unwrap();

        let mut keys = store.all_keys().await.unwrap();
        keys.sort();

        assert_eq!(keys, vec!["cache_a", "other x"]);
    }

    #[tokio::test]
    async fn test_remove_and_multi_remove_are_idempotent() {
        let (store, _temp_dir) = create_test_store();
        store.set_item("a", "1".to_string()).await.unwrap();
        store.set_item("b", "2".to_string()).await.unwrap();

        store.remove_item("a").await.unwrap();
        store.remove_item("a").await.unwrap();
        store.multi_remove(&["b".to_string(), "c".to_string()]).await.unwrap();

        assert!(store.all_keys().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_to_one_key_all_succeed() {
        let (store, temp_dir) = create_test_store();
        let store = std::sync::Arc::new(store);
        let values: Vec<String> = (0..64).map(|i| format!("{{\"v\":{}}}", i)).collect();

        let writes: Vec<_> = values
            .iter()
            .cloned()
            .map(|value| {
                let store = store.clone();
                tokio::spawn(async move { store.set_item("cache_k", value).await })
            })
            .collect();
        for write in writes {
            write.await.unwrap().unwrap();
        }

        let stored = store.get_item("cache_k").await.unwrap().unwrap();
        assert!(values.contains(&stored), "torn or foreign value: {}", stored);
        let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(TEMP_SUFFIX))
            .collect();
        assert!(leftovers.is_empty());
        assert_eq!(store.all_keys().await.unwrap(), vec!["cache_k"]);
    }

    #[tokio::test]
    async fn test_overwrite_existing_item() {
        let (store, _temp_dir) = create_test_store();

        store.set_item("k", "first".to_string()).await.unwrap();
        store.set_item("k", "second".to_string()).await.unwrap();

        assert_eq!(store.get_item("k").await.unwrap().as_deref(), Some("second"));
    }
}
