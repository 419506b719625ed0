use super::Positioner;
use super::route::{Feed, route};
use crate::paths;
use crate::version_order;
use crate::Result;
use bytes::Bytes;
use models::app::{App, Channel};
use models::file::{FileType, ReleaseFile};
use models::release::Version;
use tracing::{debug, info, warn};

/// The highest-ranked non-dead version, the only one eligible for the
/// latest pointers.
pub fn latest_candidate(versions: &[Version]) -> Option<&Version> {
    versions
        .iter()
        .filter(|v| !v.dead)
        .max_by(|a, b| version_order::compare(&a.name, &b.name))
}

/// Whether `version` should currently own the latest pointers of a channel
/// holding `versions`.
pub fn is_promotable(version: &Version, versions: &[Version]) -> bool {
    version.rollout == 100
        && !version.dead
        && latest_candidate(versions).is_some_and(|c| c.name == version.name)
}

pub(super) fn is_latest_installer(file: &ReleaseFile) -> bool {
    file.file_type == FileType::Installer
        && route(&file.platform, &file.arch, &file.file_name)
            .is_some_and(|r| r.feed == Feed::Installer)
}

impl Positioner {
    /// Re-points the latest installers of `channel` at its newest fully
    /// rolled out version. Returns how many pointers moved.
    #[tracing::instrument(skip_all, fields(app = %app.slug, channel = %channel.id))]
    pub async fn update_latest_installers(
        &self,
        token: &str,
        app: &App,
        channel: &Channel,
    ) -> Result<usize> {
        self.lock.verify(&app.slug, token).await?;
        self.promote_channel(app, &channel.id, &channel.versions).await
    }

    pub(super) async fn promote_channel(
        &self,
        app: &App,
        channel_id: &str,
        versions: &[Version],
    ) -> Result<usize> {
        let Some(candidate) = latest_candidate(versions) else {
            return Ok(0);
        };
        if candidate.rollout != 100 || !candidate.has_files() {
            debug!(version = %candidate.name, rollout = candidate.rollout, "Newest version is not eligible for latest");
            return Ok(0);
        }

        let mut moved = 0;
        for file in candidate.files.iter().filter(|f| is_latest_installer(f)) {
            if self
                .promote_file(app, channel_id, &candidate.name, file, None)
                .await?
            {
                moved += 1;
            }
        }
        Ok(moved)
    }

    /// Copies one installer to its latest path and writes the `.ref` sidecar.
    /// `data` avoids re-reading an artifact that is already in memory.
    pub(super) async fn promote_file(
        &self,
        app: &App,
        channel_id: &str,
        version_name: &str,
        file: &ReleaseFile,
        data: Option<Bytes>,
    ) -> Result<bool> {
        let Some(extension) = paths::extension(&file.file_name) else {
            return Ok(false);
        };
        let latest_key = paths::latest_key(
            &app.slug,
            channel_id,
            &file.platform,
            &file.arch,
            &app.name,
            extension,
        );
        let ref_key = paths::ref_key(&latest_key);

        let current = self.store.get_file(&ref_key).await?;
        if current.as_ref() == version_name.as_bytes() {
            debug!(key = %latest_key, version = %version_name, "Latest pointer already current");
            return Ok(false);
        }

        let data = match data {
            Some(data) => data,
            None => {
                let artifact_key = paths::artifact_key(
                    &app.slug,
                    channel_id,
                    &file.platform,
                    &file.arch,
                    &file.file_name,
                );
                self.store.get_file(&artifact_key).await?
            }
        };
        if data.is_empty() {
            warn!(file = %file.file_name, version = %version_name, "Installer missing from storage, not promoting");
            return Ok(false);
        }

        self.store.put_file(&latest_key, data, true).await?;
        self.store
            .put_file(&ref_key, Bytes::from(version_name.to_string()), true)
            .await?;
        info!(key = %latest_key, version = %version_name, "Promoted latest installer");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(name: &str, rollout: i32, dead: bool) -> Version {
        Version {
            id: 0,
            name: name.to_string(),
            dead,
            rollout,
            created_at: chrono::Utc::now(),
            files: vec![],
        }
    }

    #[test]
    fn test_candidate_skips_dead() {
        let versions = vec![
            version("0.0.2", 100, false),
            version("0.0.10", 100, true),
            version("0.0.9", 50, false),
        ];
        assert_eq!(latest_candidate(&versions).unwrap().name, "0.0.9");
    }

    #[test]
    fn test_promotable_requires_full_rollout_and_newest() {
        let versions = vec![version("0.0.2", 100, false), version("0.0.3", 100, false)];
        assert!(!is_promotable(&versions[0], &versions));
        assert!(is_promotable(&versions[1], &versions));

        let partial = vec![version("0.0.2", 99, false)];
        assert!(!is_promotable(&partial[0], &partial));

        let dead = vec![version("0.0.2", 100, true)];
        assert!(!is_promotable(&dead[0], &dead));
    }
}
