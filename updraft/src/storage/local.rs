use super::BlobStore;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Filesystem-backed store, typically served by a static file server at
/// `static_url`.
pub struct LocalStore {
    root: PathBuf,
    static_url: String,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>, static_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            static_url: static_url.into(),
        }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for component in Path::new(key).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => return Err(Error::Invalid(format!("storage key escapes root: {key}"))),
            }
        }
        Ok(path)
    }

    async fn collect(&self, dir: PathBuf, out: &mut Vec<String>) -> Result<()> {
        let mut pending = vec![dir];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file() {
                    out.push(self.key_of(&entry.path()));
                }
            }
        }
        Ok(())
    }

    fn key_of(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[async_trait]
impl BlobStore for LocalStore {
    async fn has_file(&self, key: &str) -> Result<bool> {
        let path = self.resolve(key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_file_size(&self, key: &str) -> Result<u64> {
        let path = self.resolve(key)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(meta.len()),
            Ok(_) => Ok(0),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_file(&self, key: &str, data: Bytes, overwrite: bool) -> Result<bool> {
        let path = self.resolve(key)?;
        if !overwrite && self.has_file(key).await? {
            debug!(key = %key, "File exists, not overwriting");
            return Ok(false);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;

        debug!(key = %key, size = data.len(), overwrite, "Wrote file");
        Ok(true)
    }

    async fn get_file(&self, key: &str) -> Result<Bytes> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(content) => Ok(Bytes::from(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Bytes::new()),
            Err(e) if path.is_dir() => {
                debug!(key = %key, "Reading a directory yields nothing: {e}");
                Ok(Bytes::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_files(&self, prefix: &str) -> Result<Vec<String>> {
        let path = self.resolve(prefix)?;
        let meta = match fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        if meta.is_file() {
            return Ok(vec![self.key_of(&path)]);
        }

        let mut keys = Vec::new();
        self.collect(path, &mut keys).await?;
        keys.sort();
        Ok(keys)
    }

    async fn delete_path(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        let result = match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&path).await,
            Ok(_) => fs::remove_file(&path).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                debug!(key = %key, "Deleted path");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn public_base_url(&self) -> String {
        self.static_url.clone()
    }
}
