//! Squirrel.Mac `RELEASES.json` feed.

use super::Positioner;
use super::route::Arch;
use crate::paths;
use crate::version_order;
use crate::Result;
use bytes::Bytes;
use models::app::App;
use models::release::Version;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReleasesJson {
    pub current_release: String,
    pub releases: Vec<DarwinRelease>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DarwinRelease {
    pub version: String,
    #[serde(rename = "updateTo")]
    pub update_to: UpdateTo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateTo {
    pub version: String,
    pub name: String,
    pub notes: String,
    pub pub_date: String,
    pub url: String,
}

/// A version that should be present in the feed, with its archive URL.
#[derive(Debug, Clone)]
pub(super) struct DarwinAddition {
    pub version: String,
    pub url: String,
}

impl ReleasesJson {
    /// Appends `version` unless an entry already exists, and moves
    /// `currentRelease` forward. `currentRelease` never moves backwards.
    pub fn add(&mut self, version: &str, url: &str, pub_date: &str) {
        if !self.releases.iter().any(|r| r.version == version) {
            self.releases.push(DarwinRelease {
                version: version.to_string(),
                update_to: UpdateTo {
                    version: version.to_string(),
                    name: version.to_string(),
                    notes: String::new(),
                    pub_date: pub_date.to_string(),
                    url: url.to_string(),
                },
            });
        }
        if self.current_release.is_empty()
            || version_order::is_at_least(version, &self.current_release)
        {
            self.current_release = version.to_string();
        }
    }

    /// Copy restricted to releases that pass `keep`, pointing
    /// `currentRelease` at the newest one retained.
    pub fn filtered(&self, keep: impl Fn(&DarwinRelease) -> bool) -> Self {
        let releases: Vec<DarwinRelease> = self.releases.iter().filter(|r| keep(r)).cloned().collect();
        let current_release = releases
            .iter()
            .map(|r| r.version.as_str())
            .max_by(|a, b| version_order::compare(a, b))
            .unwrap_or_default()
            .to_string();
        Self {
            current_release,
            releases,
        }
    }
}

fn parse(data: &[u8]) -> Option<ReleasesJson> {
    if data.iter().all(|b| b.is_ascii_whitespace()) {
        return Some(ReleasesJson::default());
    }
    serde_json::from_slice(data).ok()
}

impl Positioner {
    pub(super) async fn update_darwin_feed(
        &self,
        app: &App,
        channel_id: &str,
        arch: Arch,
        versions: &[Version],
        additions: &[DarwinAddition],
    ) -> Result<()> {
        let manifest_key = paths::darwin_manifest_key(&app.slug, channel_id, arch.as_str());

        let existing = self.store.get_file(&manifest_key).await?;
        let mut releases = match parse(&existing) {
            Some(releases) => releases,
            None => {
                warn!(key = %manifest_key, "Existing RELEASES.json is malformed, rebuilding it");
                ReleasesJson::default()
            }
        };

        let pub_date = chrono::Utc::now().to_rfc3339();
        for addition in additions {
            releases.add(&addition.version, &addition.url, &pub_date);
        }
        debug!(key = %manifest_key, current = %releases.current_release, "Writing RELEASES.json");

        self.store
            .put_file(&manifest_key, Bytes::from(serde_json::to_vec(&releases)?), true)
            .await?;

        let known: HashSet<&str> = versions.iter().map(|v| v.name.as_str()).collect();
        let policy = self.settings.bucket_policy;
        let mut variants = Vec::with_capacity(usize::from(super::rollout::BUCKET_COUNT));
        for bucket in super::rollout::buckets() {
            let visible = policy.visible_names(versions, bucket);
            let variant = releases.filtered(|r| {
                !known.contains(r.version.as_str()) || visible.contains(r.version.as_str())
            });
            variants.push(Bytes::from(serde_json::to_vec(&variant)?));
        }
        self.write_variants(&manifest_key, |bucket| variants[usize::from(bucket)].clone())
            .await
    }

    /// Drops the releases of `retired` from the canonical RELEASES.json of
    /// `arch`, pointing `currentRelease` at the newest one left.
    pub(super) async fn retire_darwin_entries(
        &self,
        app: &App,
        channel_id: &str,
        arch: Arch,
        retired: &HashSet<&str>,
    ) -> Result<()> {
        let manifest_key = paths::darwin_manifest_key(&app.slug, channel_id, arch.as_str());
        let existing = self.store.get_file(&manifest_key).await?;
        let Some(releases) = parse(&existing) else {
            return Ok(());
        };
        if !releases.releases.iter().any(|r| retired.contains(r.version.as_str())) {
            return Ok(());
        }

        let kept = releases.filtered(|r| !retired.contains(r.version.as_str()));
        debug!(key = %manifest_key, current = %kept.current_release, "Dropping retired RELEASES.json entries");
        self.store
            .put_file(&manifest_key, Bytes::from(serde_json::to_vec(&kept)?), true)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://foo.bar/fake_slug/fake_channel_id/darwin/x64/thing.zip";

    #[test]
    fn test_serialized_shape() {
        let mut releases = ReleasesJson::default();
        releases.add("0.0.2", URL, "2024-01-01T00:00:00+00:00");
        let json: serde_json::Value = serde_json::to_value(&releases).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "currentRelease": "0.0.2",
                "releases": [{
                    "version": "0.0.2",
                    "updateTo": {
                        "version": "0.0.2",
                        "name": "0.0.2",
                        "notes": "",
                        "pub_date": "2024-01-01T00:00:00+00:00",
                        "url": URL,
                    }
                }]
            })
        );
    }

    #[test]
    fn test_existing_version_is_not_duplicated() {
        let mut releases = ReleasesJson::default();
        releases.add("0.0.2", URL, "d1");
        releases.add("0.0.2", "https://other", "d2");
        assert_eq!(releases.releases.len(), 1);
        assert_eq!(releases.releases[0].update_to.url, URL);
    }

    #[test]
    fn test_current_release_never_regresses() {
        let mut releases = ReleasesJson::default();
        releases.add("0.0.3", URL, "d");
        releases.add("0.0.1", URL, "d");
        assert_eq!(releases.current_release, "0.0.3");
        assert_eq!(releases.releases.len(), 2);

        releases.add("0.0.10", URL, "d");
        assert_eq!(releases.current_release, "0.0.10");
    }

    #[test]
    fn test_filtered_points_at_newest_retained() {
        let mut releases = ReleasesJson::default();
        releases.add("0.0.2", URL, "d");
        releases.add("0.0.3", URL, "d");
        let variant = releases.filtered(|r| r.version != "0.0.3");
        assert_eq!(variant.current_release, "0.0.2");
        assert_eq!(variant.releases.len(), 1);

        let empty = releases.filtered(|_| false);
        assert_eq!(empty.current_release, "");
    }

    #[test]
    fn test_parse_empty_and_malformed() {
        assert_eq!(parse(b""), Some(ReleasesJson::default()));
        assert_eq!(parse(b"{not json"), None);
    }
}
