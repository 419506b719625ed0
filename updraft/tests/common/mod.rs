#![allow(dead_code)]

use bytes::Bytes;
use models::app::{App, Channel};
use models::file::{FileType, ReleaseFile};
use models::release::Version;
use std::sync::Arc;
use updraft::hashing;
use updraft::positioner::{Positioner, PositionerSettings};
use updraft::storage::{BlobStore, MemoryStore};

pub const BASE_URL: &str = "https://foo.bar";
pub const SLUG: &str = "fake_slug";
pub const CHANNEL: &str = "fake_channel_id";

pub fn app() -> App {
    App {
        id: 1,
        name: "Fake Slug".to_string(),
        slug: SLUG.to_string(),
        token: "token".to_string(),
        team: vec!["me".to_string()],
        channels: vec![],
    }
}

pub fn channel(versions: Vec<Version>) -> Channel {
    Channel {
        id: CHANNEL.to_string(),
        name: "stable".to_string(),
        versions,
    }
}

pub fn version(id: i32, name: &str, rollout: i32, files: Vec<ReleaseFile>) -> Version {
    Version {
        id,
        name: name.to_string(),
        dead: false,
        rollout,
        created_at: chrono::Utc::now(),
        files,
    }
}

pub fn dead(mut version: Version) -> Version {
    version.dead = true;
    version
}

/// File metadata with digests of `data`, as the upload layer would send it.
pub fn file(name: &str, platform: &str, arch: &str, data: &[u8]) -> ReleaseFile {
    let digests = hashing::digest(data);
    ReleaseFile {
        id: None,
        file_name: name.to_string(),
        platform: platform.to_string(),
        arch: arch.to_string(),
        file_type: FileType::classify(platform, name),
        sha1: digests.sha1,
        sha256: digests.sha256,
    }
}

pub fn store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new(BASE_URL))
}

pub fn positioner(store: &Arc<MemoryStore>) -> Positioner {
    let settings = PositionerSettings {
        write_release_index: false,
        ..PositionerSettings::default()
    };
    let store: Arc<dyn BlobStore> = store.clone();
    Positioner::new(store, settings)
}

pub fn key(platform: &str, arch: &str, file_name: &str) -> String {
    format!("{SLUG}/{CHANNEL}/{platform}/{arch}/{file_name}")
}

pub fn url(platform: &str, arch: &str, file_name: &str) -> String {
    format!("{BASE_URL}/{}", key(platform, arch, file_name))
}

pub async fn text(store: &MemoryStore, key: &str) -> String {
    let data = store.contents(key).await.unwrap_or_default();
    String::from_utf8(data.to_vec()).unwrap()
}

pub async fn seed(store: &MemoryStore, key: &str, data: &[u8]) {
    store
        .put_file(key, Bytes::copy_from_slice(data), true)
        .await
        .unwrap();
}
