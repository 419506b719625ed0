//! Version lifecycle on top of the catalog and the positioner.
//!
//! Drafts are staged encrypted under `_drafts/`, then released into a
//! version: registered in the catalog, decrypted and positioned. Every
//! operation that touches feeds holds the application lock for its whole
//! duration and releases it on the way out, also on failure.

use crate::catalog::{ReleaseCatalog, policy};
use crate::drafts::{DraftCipher, random_secret};
use crate::hashing;
use crate::paths;
use crate::positioner::{Placement, Positioner, Upload};
use crate::{Error, Result};
use bytes::Bytes;
use models::app::{App, Channel};
use models::draft::{NewTemporarySave, TemporarySave};
use models::file::{FileType, ReleaseFile};
use models::release::Version;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One artifact of a draft as handed over by the uploader.
#[derive(Debug, Clone)]
pub struct DraftFile {
    pub file_name: String,
    pub data: Bytes,
}

pub struct ReleaseManager {
    catalog: Arc<dyn ReleaseCatalog>,
    positioner: Positioner,
    default_rollout: i32,
}

impl ReleaseManager {
    pub fn new(
        catalog: Arc<dyn ReleaseCatalog>,
        positioner: Positioner,
        default_rollout: i32,
    ) -> Self {
        Self {
            catalog,
            positioner,
            default_rollout,
        }
    }

    pub fn catalog(&self) -> &Arc<dyn ReleaseCatalog> {
        &self.catalog
    }

    pub fn positioner(&self) -> &Positioner {
        &self.positioner
    }

    /// Encrypts `files` into the draft area and records the draft.
    #[tracing::instrument(skip(self, files), fields(files = files.len()))]
    pub async fn stage_draft(
        &self,
        app_id: i32,
        channel_id: &str,
        version: &str,
        platform: &str,
        arch: &str,
        files: Vec<DraftFile>,
    ) -> Result<TemporarySave> {
        if version.trim().is_empty() {
            return Err(Error::Invalid("version name is empty".to_string()));
        }
        if files.is_empty() {
            return Err(Error::Invalid("a draft needs at least one file".to_string()));
        }
        if let Some(bad) = files
            .iter()
            .find(|f| f.file_name.is_empty() || f.file_name.contains(['/', '\\']))
        {
            return Err(Error::Invalid(format!("invalid file name '{}'", bad.file_name)));
        }

        let (app, channel) = self.app_and_channel(app_id, channel_id).await?;
        let save_string = random_secret(16);
        let cipher_password = random_secret(32);
        let cipher = DraftCipher::from_password(&cipher_password)?;

        for file in &files {
            let key = paths::draft_key(&app.slug, &channel.id, &save_string, &file.file_name);
            let sealed = cipher.encrypt(&file.data)?;
            self.positioner
                .store()
                .put_file(&key, Bytes::from(sealed), true)
                .await?;
        }

        let draft = self
            .catalog
            .save_draft(app.id, &channel.id, NewTemporarySave {
                save_string,
                cipher_password,
                version: version.to_string(),
                platform: platform.to_string(),
                arch: arch.to_string(),
                filenames: files.into_iter().map(|f| f.file_name).collect(),
            })
            .await?;
        info!(draft = draft.id, "Staged draft");
        Ok(draft)
    }

    /// Promotes a draft into its version and positions every new file.
    /// Returns the names of the files that were newly registered.
    #[tracing::instrument(skip(self))]
    pub async fn release_draft(
        &self,
        app_id: i32,
        channel_id: &str,
        draft_id: i32,
    ) -> Result<Vec<String>> {
        let (app, channel) = self.app_and_channel(app_id, channel_id).await?;
        let draft = self
            .catalog
            .get_draft(app.id, &channel.id, draft_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("draft {draft_id}")))?;

        let token = self.acquire(&app).await?;
        let result = self.release_locked(&token, &app, &channel, &draft).await;
        self.finish(&app, &token, result).await
    }

    async fn release_locked(
        &self,
        token: &str,
        app: &App,
        channel: &Channel,
        draft: &TemporarySave,
    ) -> Result<Vec<String>> {
        let cipher = DraftCipher::from_password(&draft.cipher_password)?;
        let store = self.positioner.store();

        let mut contents = Vec::with_capacity(draft.filenames.len());
        for file_name in &draft.filenames {
            let key = paths::draft_key(&app.slug, &channel.id, &draft.save_string, file_name);
            let sealed = store.get_file(&key).await?;
            if sealed.is_empty() {
                return Err(Error::NotFound(format!("draft file {file_name}")));
            }
            contents.push((file_name, Bytes::from(cipher.decrypt(&sealed)?)));
        }

        if channel.version(&draft.version).is_none() {
            let rollout =
                policy::initial_rollout(!channel.versions.is_empty(), self.default_rollout);
            self.catalog
                .create_version(app.id, &channel.id, &draft.version, rollout)
                .await?;
            debug!(version = %draft.version, rollout, "Created version");
        }

        let files = contents
            .iter()
            .map(|(file_name, data)| {
                let digests = hashing::digest(data);
                ReleaseFile {
                    id: None,
                    file_name: file_name.to_string(),
                    platform: draft.platform.clone(),
                    arch: draft.arch.clone(),
                    file_type: FileType::classify(&draft.platform, file_name),
                    sha1: digests.sha1,
                    sha256: digests.sha256,
                }
            })
            .collect();
        let stored = self
            .catalog
            .add_files(app.id, &channel.id, &draft.version, files)
            .await?;

        let channel = self.reload_channel(app.id, &channel.id).await?;
        let version = channel
            .version(&draft.version)
            .ok_or_else(|| Error::NotFound(format!("version {}", draft.version)))?;

        // Includes files registered by an earlier attempt whose placement failed.
        let registered = version
            .files
            .iter()
            .filter(|f| f.platform == draft.platform && f.arch == draft.arch);
        for file in registered {
            let Some((_, data)) = contents.iter().find(|(name, _)| **name == file.file_name)
            else {
                continue;
            };
            let placement = self
                .positioner
                .handle_upload(token, Upload {
                    app,
                    channel: &channel,
                    version,
                    file,
                    data: data.clone(),
                })
                .await?;
            if placement == Placement::Ignored {
                warn!(file = %file.file_name, "Registered file has no update feed and was not stored");
            }
        }

        self.positioner
            .write_versions_file(token, app, &channel)
            .await?;

        store
            .delete_path(&paths::draft_prefix(&app.slug, &channel.id, &draft.save_string))
            .await?;
        self.catalog
            .delete_draft(app.id, &channel.id, draft.id)
            .await?;

        info!(version = %draft.version, files = stored.len(), "Released draft");
        Ok(stored.into_iter().map(|f| f.file_name).collect())
    }

    pub async fn delete_draft(&self, app_id: i32, channel_id: &str, draft_id: i32) -> Result<()> {
        let (app, channel) = self.app_and_channel(app_id, channel_id).await?;
        let draft = self
            .catalog
            .get_draft(app.id, &channel.id, draft_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("draft {draft_id}")))?;
        self.discard_draft(&app, &channel, &draft).await
    }

    /// Deletes every draft of the channel. Returns how many were removed.
    pub async fn delete_all_drafts(&self, app_id: i32, channel_id: &str) -> Result<usize> {
        let (app, channel) = self.app_and_channel(app_id, channel_id).await?;
        let drafts = self.catalog.list_drafts(app.id, &channel.id).await?;
        for draft in &drafts {
            self.discard_draft(&app, &channel, draft).await?;
        }
        info!(app = %app.slug, count = drafts.len(), "Deleted drafts");
        Ok(drafts.len())
    }

    async fn discard_draft(&self, app: &App, channel: &Channel, draft: &TemporarySave) -> Result<()> {
        self.positioner
            .store()
            .delete_path(&paths::draft_prefix(&app.slug, &channel.id, &draft.save_string))
            .await?;
        self.catalog.delete_draft(app.id, &channel.id, draft.id).await
    }

    pub async fn set_rollout(
        &self,
        app_id: i32,
        channel_id: &str,
        version: &str,
        rollout: i32,
    ) -> Result<Version> {
        let rollout = policy::validate_rollout(rollout)?;
        self.mutate_and_regenerate(app_id, channel_id, |catalog, app, channel| async move {
            catalog.set_rollout(app.id, &channel.id, version, rollout).await
        })
        .await
    }

    pub async fn set_dead(
        &self,
        app_id: i32,
        channel_id: &str,
        version: &str,
        dead: bool,
    ) -> Result<Version> {
        self.mutate_and_regenerate(app_id, channel_id, |catalog, app, channel| async move {
            catalog.set_dead(app.id, &channel.id, version, dead).await
        })
        .await
    }

    /// Marks every live version older than the three most recent as dead.
    pub async fn mark_old_versions_dead(&self, app_id: i32, channel_id: &str) -> Result<Vec<String>> {
        self.mutate_and_regenerate(app_id, channel_id, |catalog, app, channel| async move {
            let mut aged = Vec::new();
            for version in policy::versions_to_age(&channel.versions) {
                catalog
                    .set_dead(app.id, &channel.id, &version.name, true)
                    .await?;
                aged.push(version.name.clone());
            }
            Ok::<_, Error>(aged)
        })
        .await
    }

    /// Deletes dead versions outside the `keep` newest, along with their
    /// feed entries and index records. Returns the deleted versions.
    #[tracing::instrument(skip(self))]
    pub async fn delete_old_dead_versions(
        &self,
        app_id: i32,
        channel_id: &str,
        keep: usize,
    ) -> Result<Vec<Version>> {
        let (app, channel) = self.app_and_channel(app_id, channel_id).await?;
        let token = self.acquire(&app).await?;
        let result = self.delete_dead_locked(&token, &app, &channel, keep).await;
        self.finish(&app, &token, result).await
    }

    async fn delete_dead_locked(
        &self,
        token: &str,
        app: &App,
        channel: &Channel,
        keep: usize,
    ) -> Result<Vec<Version>> {
        let victims: Vec<Version> = policy::retention_victims(&channel.versions, keep)
            .into_iter()
            .cloned()
            .collect();
        if !victims.is_empty() {
            self.positioner
                .retire_versions(token, app, channel, &victims)
                .await?;
        }

        let store = self.positioner.store();
        for version in &victims {
            store
                .delete_path(&paths::index_version_prefix(&app.slug, &channel.id, &version.name))
                .await?;
            self.catalog
                .delete_version(app.id, &channel.id, &version.name)
                .await?;
            info!(version = %version.name, "Deleted dead version");
        }

        let channel = self.reload_channel(app.id, &channel.id).await?;
        self.positioner
            .regenerate_channel(token, app, &channel)
            .await?;
        Ok(victims)
    }

    /// Rebuilds all feeds of a channel from the catalog.
    pub async fn regenerate(&self, app_id: i32, channel_id: &str) -> Result<()> {
        self.mutate_and_regenerate(app_id, channel_id, |_, _, _| async { Ok(()) })
            .await
    }

    /// Runs `mutate` against the catalog under the lock, then regenerates the
    /// channel from the updated catalog view.
    async fn mutate_and_regenerate<T, F, Fut>(
        &self,
        app_id: i32,
        channel_id: &str,
        mutate: F,
    ) -> Result<T>
    where
        F: FnOnce(Arc<dyn ReleaseCatalog>, App, Channel) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (app, channel) = self.app_and_channel(app_id, channel_id).await?;
        let token = self.acquire(&app).await?;

        let result = async {
            let value = mutate(self.catalog.clone(), app.clone(), channel).await?;
            let channel = self.reload_channel(app.id, channel_id).await?;
            self.positioner
                .regenerate_channel(&token, &app, &channel)
                .await?;
            Ok::<_, Error>(value)
        }
        .await;

        self.finish(&app, &token, result).await
    }

    async fn app_and_channel(&self, app_id: i32, channel_id: &str) -> Result<(App, Channel)> {
        let app = self
            .catalog
            .get_app(app_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("app {app_id}")))?;
        let channel = self.reload_channel(app_id, channel_id).await?;
        Ok((app, channel))
    }

    async fn reload_channel(&self, app_id: i32, channel_id: &str) -> Result<Channel> {
        self.catalog
            .get_channel(app_id, channel_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("channel {channel_id}")))
    }

    async fn acquire(&self, app: &App) -> Result<String> {
        self.positioner
            .request_lock(app)
            .await?
            .ok_or_else(|| Error::Busy(app.slug.clone()))
    }

    /// Releases the lock and hands back `result`. A failed release only
    /// surfaces when the operation itself succeeded.
    async fn finish<T>(&self, app: &App, token: &str, result: Result<T>) -> Result<T> {
        match self.positioner.release_lock(app, token).await {
            Ok(true) => {}
            Ok(false) => warn!(app = %app.slug, "Lock was taken over before release"),
            Err(e) if result.is_ok() => return Err(e),
            Err(e) => warn!(app = %app.slug, error = %e, "Failed to release lock"),
        }
        result
    }
}
