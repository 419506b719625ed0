use super::ReleaseCatalog;
use super::policy;
use crate::{Error, Result};
use async_trait::async_trait;
use models::app::{App, Channel};
use models::draft::{NewTemporarySave, TemporarySave};
use models::file::ReleaseFile;
use models::release::Version;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct State {
    apps: Vec<App>,
    drafts: Vec<(i32, String, TemporarySave)>,
    next_app_id: i32,
    next_version_id: i32,
    next_file_id: i32,
    next_draft_id: i32,
}

impl State {
    fn app_mut(&mut self, app_id: i32) -> Result<&mut App> {
        self.apps
            .iter_mut()
            .find(|a| a.id == app_id)
            .ok_or_else(|| Error::NotFound(format!("app {app_id}")))
    }

    fn channel_mut(&mut self, app_id: i32, channel_id: &str) -> Result<&mut Channel> {
        self.app_mut(app_id)?
            .channels
            .iter_mut()
            .find(|c| c.id == channel_id)
            .ok_or_else(|| Error::NotFound(format!("channel {channel_id}")))
    }

    fn version_mut(&mut self, app_id: i32, channel_id: &str, name: &str) -> Result<&mut Version> {
        self.channel_mut(app_id, channel_id)?
            .versions
            .iter_mut()
            .find(|v| v.name == name)
            .ok_or_else(|| Error::NotFound(format!("version {name}")))
    }

    fn next(counter: &mut i32) -> i32 {
        *counter += 1;
        *counter
    }
}

/// Catalog kept entirely in memory. Ids are assigned sequentially from 1.
#[derive(Default)]
pub struct InMemoryCatalog {
    state: Mutex<State>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReleaseCatalog for InMemoryCatalog {
    async fn create_app(&self, name: &str, team: &[String]) -> Result<App> {
        let mut state = self.state.lock().await;
        let slug = policy::unique_slug(name, state.apps.iter().map(|a| a.slug.as_str()));
        let app = App {
            id: State::next(&mut state.next_app_id),
            name: name.to_string(),
            slug,
            token: Uuid::new_v4().to_string(),
            team: team.to_vec(),
            channels: Vec::new(),
        };
        state.apps.push(app.clone());
        Ok(app)
    }

    async fn get_app(&self, app_id: i32) -> Result<Option<App>> {
        let state = self.state.lock().await;
        Ok(state.apps.iter().find(|a| a.id == app_id).cloned())
    }

    async fn get_app_by_slug(&self, slug: &str) -> Result<Option<App>> {
        let state = self.state.lock().await;
        Ok(state.apps.iter().find(|a| a.slug == slug).cloned())
    }

    async fn list_apps(&self) -> Result<Vec<App>> {
        Ok(self.state.lock().await.apps.clone())
    }

    async fn set_team(&self, app_id: i32, team: &[String]) -> Result<App> {
        let mut state = self.state.lock().await;
        let app = state.app_mut(app_id)?;
        app.team = team.to_vec();
        Ok(app.clone())
    }

    async fn create_channel(&self, app_id: i32, name: &str) -> Result<Channel> {
        let mut state = self.state.lock().await;
        let channel = Channel {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            versions: Vec::new(),
        };
        state.app_mut(app_id)?.channels.push(channel.clone());
        Ok(channel)
    }

    async fn get_channel(&self, app_id: i32, channel_id: &str) -> Result<Option<Channel>> {
        let mut state = self.state.lock().await;
        match state.channel_mut(app_id, channel_id) {
            Ok(channel) => Ok(Some(channel.clone())),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_version(
        &self,
        app_id: i32,
        channel_id: &str,
        name: &str,
        rollout: i32,
    ) -> Result<Version> {
        let rollout = policy::validate_rollout(rollout)?;
        let mut state = self.state.lock().await;
        let id = State::next(&mut state.next_version_id);
        let channel = state.channel_mut(app_id, channel_id)?;
        if channel.version(name).is_some() {
            return Err(Error::Invalid(format!("version {name} already exists")));
        }
        let version = Version {
            id,
            name: name.to_string(),
            dead: false,
            rollout,
            created_at: chrono::Utc::now(),
            files: Vec::new(),
        };
        channel.versions.push(version.clone());
        Ok(version)
    }

    async fn get_version(
        &self,
        app_id: i32,
        channel_id: &str,
        name: &str,
    ) -> Result<Option<Version>> {
        let mut state = self.state.lock().await;
        match state.version_mut(app_id, channel_id, name) {
            Ok(version) => Ok(Some(version.clone())),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn add_files(
        &self,
        app_id: i32,
        channel_id: &str,
        version: &str,
        files: Vec<ReleaseFile>,
    ) -> Result<Vec<ReleaseFile>> {
        let mut state = self.state.lock().await;
        let mut next_file_id = state.next_file_id;
        let target = state.version_mut(app_id, channel_id, version)?;

        let mut stored = Vec::new();
        for mut file in files {
            if target.files.iter().any(|f| f.is_same_target(&file)) {
                continue;
            }
            file.id = Some(State::next(&mut next_file_id));
            target.files.push(file.clone());
            stored.push(file);
        }
        state.next_file_id = next_file_id;
        Ok(stored)
    }

    async fn set_rollout(
        &self,
        app_id: i32,
        channel_id: &str,
        version: &str,
        rollout: i32,
    ) -> Result<Version> {
        let rollout = policy::validate_rollout(rollout)?;
        let mut state = self.state.lock().await;
        let target = state.version_mut(app_id, channel_id, version)?;
        target.rollout = rollout;
        Ok(target.clone())
    }

    async fn set_dead(
        &self,
        app_id: i32,
        channel_id: &str,
        version: &str,
        dead: bool,
    ) -> Result<Version> {
        let mut state = self.state.lock().await;
        let target = state.version_mut(app_id, channel_id, version)?;
        target.dead = dead;
        Ok(target.clone())
    }

    async fn list_versions(&self, app_id: i32, channel_id: &str) -> Result<Vec<Version>> {
        let mut state = self.state.lock().await;
        let mut versions = state.channel_mut(app_id, channel_id)?.versions.clone();
        versions.sort_by_key(|v| v.id);
        Ok(versions)
    }

    async fn delete_version(&self, app_id: i32, channel_id: &str, version: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let channel = state.channel_mut(app_id, channel_id)?;
        let before = channel.versions.len();
        channel.versions.retain(|v| v.name != version);
        if channel.versions.len() == before {
            return Err(Error::NotFound(format!("version {version}")));
        }
        Ok(())
    }

    async fn save_draft(
        &self,
        app_id: i32,
        channel_id: &str,
        draft: NewTemporarySave,
    ) -> Result<TemporarySave> {
        let mut state = self.state.lock().await;
        state.channel_mut(app_id, channel_id)?;
        let save = TemporarySave {
            id: State::next(&mut state.next_draft_id),
            save_string: draft.save_string,
            cipher_password: draft.cipher_password,
            version: draft.version,
            platform: draft.platform,
            arch: draft.arch,
            date: chrono::Utc::now(),
            filenames: draft.filenames,
        };
        state
            .drafts
            .push((app_id, channel_id.to_string(), save.clone()));
        Ok(save)
    }

    async fn get_draft(
        &self,
        app_id: i32,
        channel_id: &str,
        id: i32,
    ) -> Result<Option<TemporarySave>> {
        let state = self.state.lock().await;
        Ok(state
            .drafts
            .iter()
            .find(|(a, c, d)| *a == app_id && c == channel_id && d.id == id)
            .map(|(_, _, d)| d.clone()))
    }

    async fn list_drafts(&self, app_id: i32, channel_id: &str) -> Result<Vec<TemporarySave>> {
        let state = self.state.lock().await;
        Ok(state
            .drafts
            .iter()
            .filter(|(a, c, _)| *a == app_id && c == channel_id)
            .map(|(_, _, d)| d.clone())
            .collect())
    }

    async fn delete_draft(&self, app_id: i32, channel_id: &str, id: i32) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .drafts
            .retain(|(a, c, d)| !(*a == app_id && c == channel_id && d.id == id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use models::file::FileType;

    fn file(name: &str, platform: &str, arch: &str) -> ReleaseFile {
        ReleaseFile {
            id: None,
            file_name: name.to_string(),
            platform: platform.to_string(),
            arch: arch.to_string(),
            file_type: FileType::classify(platform, name),
            sha1: String::new(),
            sha256: String::new(),
        }
    }

    #[tokio::test]
    async fn test_slugs_are_deduplicated() {
        let catalog = InMemoryCatalog::new();
        let first = catalog.create_app("My App", &[]).await.unwrap();
        let second = catalog.create_app("My App", &[]).await.unwrap();
        let third = catalog.create_app("my app", &[]).await.unwrap();
        assert_eq!(first.slug, "my-app");
        assert_eq!(second.slug, "my-app2");
        assert_eq!(third.slug, "my-app3");
        assert_ne!(first.token, second.token);
    }

    #[tokio::test]
    async fn test_add_files_skips_known_targets() {
        let catalog = InMemoryCatalog::new();
        let app = catalog.create_app("App", &[]).await.unwrap();
        let channel = catalog.create_channel(app.id, "stable").await.unwrap();
        catalog.create_version(app.id, &channel.id, "1.0.0", 100).await.unwrap();

        let stored = catalog
            .add_files(app.id, &channel.id, "1.0.0", vec![
                file("a.exe", "win32", "x64"),
                file("a.exe", "win32", "ia32"),
            ])
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);

        let stored = catalog
            .add_files(app.id, &channel.id, "1.0.0", vec![
                file("a.exe", "win32", "x64"),
                file("b.nupkg", "win32", "x64"),
            ])
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].file_name, "b.nupkg");
        assert!(stored[0].id.is_some());

        let version = catalog.get_version(app.id, &channel.id, "1.0.0").await.unwrap().unwrap();
        assert_eq!(version.files.len(), 3);
    }

    #[tokio::test]
    async fn test_version_names_are_unique_per_channel() {
        let catalog = InMemoryCatalog::new();
        let app = catalog.create_app("App", &[]).await.unwrap();
        let stable = catalog.create_channel(app.id, "stable").await.unwrap();
        let beta = catalog.create_channel(app.id, "beta").await.unwrap();

        catalog.create_version(app.id, &stable.id, "1.0.0", 100).await.unwrap();
        assert_matches!(
            catalog.create_version(app.id, &stable.id, "1.0.0", 100).await,
            Err(Error::Invalid(_))
        );
        catalog.create_version(app.id, &beta.id, "1.0.0", 100).await.unwrap();
    }

    #[tokio::test]
    async fn test_rollout_bounds() {
        let catalog = InMemoryCatalog::new();
        let app = catalog.create_app("App", &[]).await.unwrap();
        let channel = catalog.create_channel(app.id, "stable").await.unwrap();
        catalog.create_version(app.id, &channel.id, "1.0.0", 0).await.unwrap();

        assert_matches!(
            catalog.set_rollout(app.id, &channel.id, "1.0.0", 101).await,
            Err(Error::Invalid(_))
        );
        let version = catalog.set_rollout(app.id, &channel.id, "1.0.0", 40).await.unwrap();
        assert_eq!(version.rollout, 40);
    }

    #[tokio::test]
    async fn test_missing_lookups() {
        let catalog = InMemoryCatalog::new();
        assert!(catalog.get_app(7).await.unwrap().is_none());
        let app = catalog.create_app("App", &[]).await.unwrap();
        assert!(catalog.get_channel(app.id, "nope").await.unwrap().is_none());
        assert_matches!(
            catalog.set_dead(app.id, "nope", "1.0.0", true).await,
            Err(Error::NotFound(_))
        );
    }

    #[tokio::test]
    async fn test_drafts_are_scoped_to_channel() {
        let catalog = InMemoryCatalog::new();
        let app = catalog.create_app("App", &[]).await.unwrap();
        let stable = catalog.create_channel(app.id, "stable").await.unwrap();
        let beta = catalog.create_channel(app.id, "beta").await.unwrap();

        let draft = catalog
            .save_draft(app.id, &stable.id, NewTemporarySave {
                save_string: "save".into(),
                cipher_password: "pw".into(),
                version: "1.0.0".into(),
                platform: "win32".into(),
                arch: "x64".into(),
                filenames: vec!["a.exe".into()],
            })
            .await
            .unwrap();

        assert!(catalog.get_draft(app.id, &beta.id, draft.id).await.unwrap().is_none());
        assert_eq!(catalog.list_drafts(app.id, &stable.id).await.unwrap().len(), 1);

        catalog.delete_draft(app.id, &stable.id, draft.id).await.unwrap();
        assert!(catalog.list_drafts(app.id, &stable.id).await.unwrap().is_empty());
    }
}
