//! Durable state of applications, channels, versions and drafts.

mod memory;
pub mod policy;
mod postgres;

pub use memory::InMemoryCatalog;
pub use postgres::PgCatalog;

use crate::Result;
use async_trait::async_trait;
use models::app::{App, Channel};
use models::draft::{NewTemporarySave, TemporarySave};
use models::file::ReleaseFile;
use models::release::Version;

/// Everything is scoped by application id and channel id. Lookups that may
/// legitimately miss return `Ok(None)`; mutations on missing rows return
/// [`crate::Error::NotFound`].
#[async_trait]
pub trait ReleaseCatalog: Send + Sync {
    async fn create_app(&self, name: &str, team: &[String]) -> Result<App>;
    async fn get_app(&self, app_id: i32) -> Result<Option<App>>;
    async fn get_app_by_slug(&self, slug: &str) -> Result<Option<App>>;
    async fn list_apps(&self) -> Result<Vec<App>>;
    async fn set_team(&self, app_id: i32, team: &[String]) -> Result<App>;

    async fn create_channel(&self, app_id: i32, name: &str) -> Result<Channel>;
    async fn get_channel(&self, app_id: i32, channel_id: &str) -> Result<Option<Channel>>;

    async fn create_version(
        &self,
        app_id: i32,
        channel_id: &str,
        name: &str,
        rollout: i32,
    ) -> Result<Version>;
    async fn get_version(&self, app_id: i32, channel_id: &str, name: &str)
    -> Result<Option<Version>>;
    /// Registers files on a version, skipping any whose (name, platform,
    /// arch) is already present. Returns only the newly stored files.
    async fn add_files(
        &self,
        app_id: i32,
        channel_id: &str,
        version: &str,
        files: Vec<ReleaseFile>,
    ) -> Result<Vec<ReleaseFile>>;
    async fn set_rollout(
        &self,
        app_id: i32,
        channel_id: &str,
        version: &str,
        rollout: i32,
    ) -> Result<Version>;
    async fn set_dead(&self, app_id: i32, channel_id: &str, version: &str, dead: bool)
    -> Result<Version>;
    /// Versions with their files, oldest id first.
    async fn list_versions(&self, app_id: i32, channel_id: &str) -> Result<Vec<Version>>;
    async fn delete_version(&self, app_id: i32, channel_id: &str, version: &str) -> Result<()>;

    async fn save_draft(
        &self,
        app_id: i32,
        channel_id: &str,
        draft: NewTemporarySave,
    ) -> Result<TemporarySave>;
    async fn get_draft(&self, app_id: i32, channel_id: &str, id: i32)
    -> Result<Option<TemporarySave>>;
    async fn list_drafts(&self, app_id: i32, channel_id: &str) -> Result<Vec<TemporarySave>>;
    async fn delete_draft(&self, app_id: i32, channel_id: &str, id: i32) -> Result<()>;
}
