//! Artifact placement and feed generation.
//!
//! All operations run under the per-application lock: the caller obtains a
//! token with [`Positioner::request_lock`] and passes it to every mutation.
//! Within one operation the writes happen in a fixed order: placement,
//! canonical manifest, the 101 percentile variants, then latest pointers.

mod darwin;
mod latest;
pub mod rollout;
pub mod route;
mod windows;

pub use darwin::{DarwinRelease, ReleasesJson, UpdateTo};
pub use latest::{is_promotable, latest_candidate};
pub use rollout::BucketPolicy;
pub use windows::ReleasesEntry;

use crate::lock::AppLock;
use crate::paths;
use crate::storage::BlobStore;
use crate::version_order;
use crate::Result;
use bytes::Bytes;
use darwin::DarwinAddition;
use models::app::{App, Channel};
use models::file::ReleaseFile;
use models::release::Version;
use route::{Arch, Feed, route};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionerSettings {
    /// Write a bookkeeping record under `_index/` for every placed artifact.
    pub write_release_index: bool,
    pub bucket_policy: BucketPolicy,
}

impl Default for PositionerSettings {
    fn default() -> Self {
        Self {
            write_release_index: true,
            bucket_policy: BucketPolicy::Strict,
        }
    }
}

/// A validated upload handed over by the transport layer.
#[derive(Debug, Clone)]
pub struct Upload<'a> {
    pub app: &'a App,
    pub channel: &'a Channel,
    pub version: &'a Version,
    pub file: &'a ReleaseFile,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Not a routable platform/arch/extension; nothing was written.
    Ignored,
    /// The artifact was already stored; feeds were left untouched.
    AlreadyPresent,
    Placed { key: String, promoted: bool },
}

#[derive(Serialize)]
struct IndexRecord<'a> {
    key: &'a str,
    sha1: &'a str,
    sha256: &'a str,
    size: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VersionsFileEntry<'a> {
    name: &'a str,
    rollout: i32,
    files: Vec<VersionsFileFile<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VersionsFileFile<'a> {
    file_name: &'a str,
    platform: &'a str,
    arch: &'a str,
    #[serde(rename = "type")]
    file_type: models::file::FileType,
}

pub struct Positioner {
    store: Arc<dyn BlobStore>,
    lock: AppLock,
    settings: PositionerSettings,
}

impl Positioner {
    pub fn new(store: Arc<dyn BlobStore>, settings: PositionerSettings) -> Self {
        Self {
            lock: AppLock::new(store.clone()),
            store,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    pub fn lock(&self) -> &AppLock {
        &self.lock
    }

    pub async fn request_lock(&self, app: &App) -> Result<Option<String>> {
        self.lock.request(&app.slug).await
    }

    pub async fn release_lock(&self, app: &App, token: &str) -> Result<bool> {
        self.lock.release(&app.slug, token).await
    }

    /// Places one artifact and regenerates the feeds it belongs to.
    #[tracing::instrument(skip_all, fields(
        app = %upload.app.slug,
        channel = %upload.channel.id,
        version = %upload.version.name,
        file = %upload.file.file_name,
    ))]
    pub async fn handle_upload(&self, token: &str, upload: Upload<'_>) -> Result<Placement> {
        let Upload {
            app,
            channel,
            version,
            file,
            data,
        } = upload;

        let Some(route) = route(&file.platform, &file.arch, &file.file_name) else {
            debug!(platform = %file.platform, arch = %file.arch, "Ignoring unroutable artifact");
            metrics::increment_counter!("updraft_uploads_ignored_total");
            return Ok(Placement::Ignored);
        };

        self.lock.verify(&app.slug, token).await?;

        let key = paths::artifact_key(
            &app.slug,
            &channel.id,
            route.platform.as_str(),
            route.arch.as_str(),
            &file.file_name,
        );
        if !self.store.put_file(&key, data.clone(), false).await? {
            info!(key = %key, "Artifact already present, leaving feeds untouched");
            return Ok(Placement::AlreadyPresent);
        }

        if self.settings.write_release_index {
            self.write_index_record(app, &channel.id, version, file, &key, data.len())
                .await?;
        }

        let versions = merged_versions(channel, version, file);
        match route.feed {
            Feed::Windows => {
                self.update_windows_feed(app, &channel.id, route.arch, &versions)
                    .await?;
            }
            Feed::Darwin => {
                let additions = if version.dead {
                    debug!("Version is dead, leaving it out of RELEASES.json");
                    Vec::new()
                } else {
                    vec![DarwinAddition {
                        version: version.name.clone(),
                        url: paths::public_url(&self.store.public_base_url(), &key),
                    }]
                };
                self.update_darwin_feed(app, &channel.id, route.arch, &versions, &additions)
                    .await?;
            }
            Feed::Installer => {}
        }

        let promoted = route.feed == Feed::Installer
            && latest::is_latest_installer(file)
            && is_promotable(version, &versions)
            && self
                .promote_file(app, &channel.id, &version.name, file, Some(data))
                .await?;

        metrics::increment_counter!("updraft_uploads_positioned_total");
        info!(key = %key, promoted, "Positioned artifact");
        Ok(Placement::Placed { key, promoted })
    }

    /// Rebuilds every feed of `channel` from the catalog view, refreshes the
    /// latest pointers and rewrites `versions.json`.
    #[tracing::instrument(skip_all, fields(app = %app.slug, channel = %channel.id))]
    pub async fn regenerate_channel(&self, token: &str, app: &App, channel: &Channel) -> Result<()> {
        self.lock.verify(&app.slug, token).await?;
        let versions = &channel.versions;
        let base_url = self.store.public_base_url();

        for arch in Arch::ALL {
            let has_feed = |feed: Feed| {
                versions.iter().flat_map(|v| &v.files).any(|f| {
                    route(&f.platform, &f.arch, &f.file_name)
                        .is_some_and(|r| r.feed == feed && r.arch == arch)
                })
            };

            let windows_key = paths::windows_manifest_key(&app.slug, &channel.id, arch.as_str());
            if has_feed(Feed::Windows) || self.store.has_file(&windows_key).await? {
                self.update_windows_feed(app, &channel.id, arch, versions).await?;
            }

            let darwin_key = paths::darwin_manifest_key(&app.slug, &channel.id, arch.as_str());
            if has_feed(Feed::Darwin) || self.store.has_file(&darwin_key).await? {
                let additions = darwin_additions(app, &channel.id, arch, versions, &base_url);
                self.update_darwin_feed(app, &channel.id, arch, versions, &additions)
                    .await?;
            }
        }

        let moved = self.promote_channel(app, &channel.id, versions).await?;
        self.put_versions_file(app, channel).await?;
        info!(latest_moved = moved, "Regenerated channel");
        Ok(())
    }

    /// Removes the entries of `retired` from the canonical manifests of
    /// `channel` before those versions leave the catalog. Packages that a
    /// surviving version also lists are kept. Variants are left to the
    /// regeneration that follows.
    #[tracing::instrument(skip_all, fields(app = %app.slug, channel = %channel.id, retired = retired.len()))]
    pub async fn retire_versions(
        &self,
        token: &str,
        app: &App,
        channel: &Channel,
        retired: &[Version],
    ) -> Result<()> {
        self.lock.verify(&app.slug, token).await?;
        let retired_names: HashSet<&str> = retired.iter().map(|v| v.name.as_str()).collect();
        let survivors: Vec<&Version> = channel
            .versions
            .iter()
            .filter(|v| !retired_names.contains(v.name.as_str()))
            .collect();

        for arch in Arch::ALL {
            self.retire_windows_entries(app, &channel.id, arch, retired, &survivors)
                .await?;
            self.retire_darwin_entries(app, &channel.id, arch, &retired_names)
                .await?;
        }
        Ok(())
    }

    /// Rewrites `{slug}/{channel}/versions.json`.
    pub async fn write_versions_file(&self, token: &str, app: &App, channel: &Channel) -> Result<()> {
        self.lock.verify(&app.slug, token).await?;
        self.put_versions_file(app, channel).await
    }

    async fn put_versions_file(&self, app: &App, channel: &Channel) -> Result<()> {
        let mut live: Vec<&Version> = channel.versions.iter().filter(|v| !v.dead).collect();
        version_order::sort_ascending(&mut live, |v| v.name.as_str());
        let entries: Vec<VersionsFileEntry> = live
            .into_iter()
            .map(|v| VersionsFileEntry {
                name: &v.name,
                rollout: v.rollout,
                files: v
                    .files
                    .iter()
                    .map(|f| VersionsFileFile {
                        file_name: &f.file_name,
                        platform: &f.platform,
                        arch: &f.arch,
                        file_type: f.file_type,
                    })
                    .collect(),
            })
            .collect();

        let key = paths::versions_file_key(&app.slug, &channel.id);
        self.store
            .put_file(&key, Bytes::from(serde_json::to_vec(&entries)?), true)
            .await?;
        Ok(())
    }

    async fn write_index_record(
        &self,
        app: &App,
        channel_id: &str,
        version: &Version,
        file: &ReleaseFile,
        key: &str,
        size: usize,
    ) -> Result<()> {
        let index_key = paths::index_key(
            &app.slug,
            channel_id,
            &version.name,
            &file.platform,
            &file.arch,
            &file.file_name,
        );
        let record = IndexRecord {
            key,
            sha1: &file.sha1,
            sha256: &file.sha256,
            size,
        };
        self.store
            .put_file(&index_key, Bytes::from(serde_json::to_vec(&record)?), false)
            .await?;
        Ok(())
    }

    async fn write_variants(&self, manifest_key: &str, render: impl Fn(u8) -> Bytes) -> Result<()> {
        for bucket in rollout::buckets() {
            self.store
                .put_file(&paths::variant_key(manifest_key, bucket), render(bucket), true)
                .await?;
        }
        Ok(())
    }
}

/// The channel's versions as they stand once `file` is registered on
/// `version`.
fn merged_versions(channel: &Channel, version: &Version, file: &ReleaseFile) -> Vec<Version> {
    let mut merged = version.clone();
    if let Some(existing) = channel.version(&version.name) {
        for known in &existing.files {
            if !merged.files.iter().any(|f| f.is_same_target(known)) {
                merged.files.push(known.clone());
            }
        }
    }
    if !merged.files.iter().any(|f| f.is_same_target(file)) {
        merged.files.push(file.clone());
    }

    channel
        .versions
        .iter()
        .filter(|v| v.name != version.name)
        .cloned()
        .chain(std::iter::once(merged))
        .collect()
}

fn darwin_additions(
    app: &App,
    channel_id: &str,
    arch: Arch,
    versions: &[Version],
    base_url: &str,
) -> Vec<DarwinAddition> {
    let mut ordered: Vec<&Version> = versions.iter().collect();
    version_order::sort_ascending(&mut ordered, |v| v.name.as_str());

    ordered
        .into_iter()
        .filter(|version| !version.dead)
        .filter_map(|version| {
            let archive = version.files.iter().find(|f| {
                route(&f.platform, &f.arch, &f.file_name)
                    .is_some_and(|r| r.feed == Feed::Darwin && r.arch == arch)
            })?;
            let key = paths::artifact_key(&app.slug, channel_id, "darwin", arch.as_str(), &archive.file_name);
            Some(DarwinAddition {
                version: version.name.clone(),
                url: paths::public_url(base_url, &key),
            })
        })
        .collect()
}
