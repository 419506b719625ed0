//! Blob storage backends.
//!
//! Every backend exposes the same path-keyed surface. `put_file` reports
//! whether it actually wrote, which callers use to decide whether derived
//! feed state needs to be touched at all.

mod local;
mod memory;
mod s3;

pub use local::LocalStore;
pub use memory::{MemoryStore, PutRecord};
pub use self::s3::{S3Config, S3Store};

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn has_file(&self, key: &str) -> Result<bool>;

    /// Size in bytes, `0` when the key does not exist.
    async fn get_file_size(&self, key: &str) -> Result<u64>;

    /// Writes `data` when the key is absent, or always when `overwrite` is
    /// set. Returns whether a write happened.
    async fn put_file(&self, key: &str, data: Bytes, overwrite: bool) -> Result<bool>;

    /// Contents of `key`, empty when it does not exist.
    async fn get_file(&self, key: &str) -> Result<Bytes>;

    /// Every key below `prefix`, recursively.
    async fn list_files(&self, prefix: &str) -> Result<Vec<String>>;

    /// Deletes a single object, or everything below a path. Missing paths are
    /// not an error.
    async fn delete_path(&self, key: &str) -> Result<()>;

    fn public_base_url(&self) -> String;
}
