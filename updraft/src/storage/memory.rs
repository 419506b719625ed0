use super::BlobStore;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// One `put_file` call as seen by a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRecord {
    pub key: String,
    pub overwrite: bool,
    pub wrote: bool,
}

/// In-process store that records every write. Used by tests and dry runs.
pub struct MemoryStore {
    base_url: String,
    files: Mutex<BTreeMap<String, Bytes>>,
    puts: Mutex<Vec<PutRecord>>,
    failing_prefix: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            files: Mutex::new(BTreeMap::new()),
            puts: Mutex::new(Vec::new()),
            failing_prefix: Mutex::new(None),
        }
    }

    pub async fn puts(&self) -> Vec<PutRecord> {
        self.puts.lock().await.clone()
    }

    pub async fn put_count(&self) -> usize {
        self.puts.lock().await.len()
    }

    pub async fn clear_records(&self) {
        self.puts.lock().await.clear();
    }

    pub async fn contents(&self, key: &str) -> Option<Bytes> {
        self.files.lock().await.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.files.lock().await.keys().cloned().collect()
    }

    /// Makes every write below `prefix` fail with a storage error.
    pub async fn fail_writes_under(&self, prefix: impl Into<String>) {
        *self.failing_prefix.lock().await = Some(prefix.into());
    }

    pub async fn heal_writes(&self) {
        *self.failing_prefix.lock().await = None;
    }

    fn is_below(key: &str, path: &str) -> bool {
        let path = path.trim_end_matches('/');
        path.is_empty()
            || key == path
            || key
                .strip_prefix(path)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn has_file(&self, key: &str) -> Result<bool> {
        Ok(self.files.lock().await.contains_key(key))
    }

    async fn get_file_size(&self, key: &str) -> Result<u64> {
        Ok(self
            .files
            .lock()
            .await
            .get(key)
            .map(|data| data.len() as u64)
            .unwrap_or(0))
    }

    async fn put_file(&self, key: &str, data: Bytes, overwrite: bool) -> Result<bool> {
        if let Some(prefix) = self.failing_prefix.lock().await.as_deref() {
            if key.starts_with(prefix) {
                return Err(Error::Storage(format!("injected failure writing {key}")));
            }
        }

        let mut files = self.files.lock().await;
        let wrote = overwrite || !files.contains_key(key);
        if wrote {
            files.insert(key.to_string(), data);
        }
        self.puts.lock().await.push(PutRecord {
            key: key.to_string(),
            overwrite,
            wrote,
        });
        Ok(wrote)
    }

    async fn get_file(&self, key: &str) -> Result<Bytes> {
        Ok(self
            .files
            .lock()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_files(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .files
            .lock()
            .await
            .keys()
            .filter(|key| Self::is_below(key, prefix))
            .cloned()
            .collect())
    }

    async fn delete_path(&self, key: &str) -> Result<()> {
        self.files
            .lock()
            .await
            .retain(|existing, _| !Self::is_below(existing, key));
        Ok(())
    }

    fn public_base_url(&self) -> String {
        self.base_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_without_overwrite_keeps_first_payload() {
        let store = MemoryStore::new("https://foo.bar");
        assert!(store.put_file("k", Bytes::from("one"), false).await.unwrap());
        assert!(!store.put_file("k", Bytes::from("two"), false).await.unwrap());
        assert_eq!(store.get_file("k").await.unwrap(), Bytes::from("one"));

        assert!(store.put_file("k", Bytes::from("three"), true).await.unwrap());
        assert_eq!(store.get_file("k").await.unwrap(), Bytes::from("three"));
        assert_eq!(store.put_count().await, 3);
    }

    #[tokio::test]
    async fn test_delete_path_is_component_aware() {
        let store = MemoryStore::new("https://foo.bar");
        for key in ["app/a", "app/b/c", "app10/a"] {
            store.put_file(key, Bytes::from("x"), false).await.unwrap();
        }
        assert_eq!(store.list_files("app").await.unwrap(), vec!["app/a", "app/b/c"]);

        store.delete_path("app").await.unwrap();
        assert_eq!(store.keys().await, vec!["app10/a"]);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryStore::new("https://foo.bar");
        store.fail_writes_under("broken/").await;
        assert!(store.put_file("broken/x", Bytes::new(), true).await.is_err());
        assert!(store.put_file("fine/x", Bytes::new(), true).await.is_ok());
    }
}
