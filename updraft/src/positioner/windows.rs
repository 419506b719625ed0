//! Squirrel.Windows `RELEASES` feed.
//!
//! One line per package: `<SHA1 upper hex> <url> <size>`, joined by `\n`.

use super::Positioner;
use super::route::{Arch, Feed, route};
use crate::paths;
use crate::version_order;
use crate::Result;
use bytes::Bytes;
use models::app::App;
use models::release::Version;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasesEntry {
    pub sha1: String,
    pub url: String,
    pub size: u64,
}

impl ReleasesEntry {
    fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let sha1 = parts.next()?;
        let url = parts.next()?;
        let size = parts.next()?.parse().ok()?;
        if parts.next().is_some() || !is_sha1(sha1) {
            return None;
        }
        Some(Self {
            sha1: sha1.to_uppercase(),
            url: url.to_string(),
            size,
        })
    }

    /// Rewrites a path relative to the arch directory into an absolute URL.
    fn absolutize(&mut self, arch_url: &str) {
        if self.url.starts_with("http://") || self.url.starts_with("https://") {
            return;
        }
        let relative = self.url.trim_start_matches("./");
        self.url = paths::public_url(arch_url, relative);
    }
}

fn is_sha1(value: &str) -> bool {
    value.len() == 40 && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Parses a manifest. `None` when any non-blank line is malformed.
pub fn parse(text: &str) -> Option<Vec<ReleasesEntry>> {
    text.trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ReleasesEntry::parse)
        .collect()
}

pub fn render<'a>(entries: impl IntoIterator<Item = &'a ReleasesEntry>) -> String {
    entries
        .into_iter()
        .map(|e| format!("{} {} {}", e.sha1, e.url, e.size))
        .collect::<Vec<_>>()
        .join("\n")
}

impl Positioner {
    /// Merges every Windows package of `versions` into the canonical feed for
    /// `arch` and rewrites the percentile variants.
    pub(super) async fn update_windows_feed(
        &self,
        app: &App,
        channel_id: &str,
        arch: Arch,
        versions: &[Version],
    ) -> Result<()> {
        let manifest_key = paths::windows_manifest_key(&app.slug, channel_id, arch.as_str());
        let base_url = self.store.public_base_url();
        let arch_url = paths::public_url(
            &base_url,
            &paths::arch_dir(&app.slug, channel_id, "win32", arch.as_str()),
        );

        let existing = self.store.get_file(&manifest_key).await?;
        let mut entries = match parse(&String::from_utf8_lossy(&existing)) {
            Some(entries) => entries,
            None => {
                warn!(key = %manifest_key, "Existing RELEASES is malformed, rebuilding it");
                Vec::new()
            }
        };
        for entry in &mut entries {
            entry.absolutize(&arch_url);
        }

        let mut ordered: Vec<&Version> = versions.iter().collect();
        version_order::sort_ascending(&mut ordered, |v| v.name.as_str());

        let mut owners: HashMap<String, &str> = HashMap::new();
        for version in ordered {
            let packages = version.files.iter().filter(|f| {
                route(&f.platform, &f.arch, &f.file_name)
                    .is_some_and(|r| r.feed == Feed::Windows && r.arch == arch)
            });
            for file in packages {
                let key = paths::artifact_key(&app.slug, channel_id, "win32", arch.as_str(), &file.file_name);
                let url = paths::public_url(&base_url, &key);
                owners.insert(url.clone(), version.name.as_str());

                if version.dead || entries.iter().any(|e| e.url == url) {
                    continue;
                }
                if !is_sha1(&file.sha1) {
                    warn!(file = %file.file_name, version = %version.name, "Package has no SHA-1, leaving it out of RELEASES");
                    continue;
                }
                if !self.store.has_file(&key).await? {
                    debug!(url = %url, "Package not placed yet, leaving it for its own upload");
                    continue;
                }
                let size = self.store.get_file_size(&key).await?;
                debug!(url = %url, size, "Appending RELEASES entry");
                entries.push(ReleasesEntry {
                    sha1: file.sha1.to_uppercase(),
                    url,
                    size,
                });
            }
        }

        self.store
            .put_file(&manifest_key, Bytes::from(render(&entries)), true)
            .await?;

        let policy = self.settings.bucket_policy;
        self.write_variants(&manifest_key, |bucket| {
            let visible = policy.visible_names(versions, bucket);
            let retained = entries.iter().filter(|e| {
                owners
                    .get(&e.url)
                    .is_none_or(|owner| visible.contains(owner))
            });
            Bytes::from(render(retained))
        })
        .await
    }

    /// Drops the packages of `retired` from the canonical RELEASES of `arch`.
    /// A malformed or missing manifest is left for regeneration to rebuild.
    pub(super) async fn retire_windows_entries(
        &self,
        app: &App,
        channel_id: &str,
        arch: Arch,
        retired: &[Version],
        survivors: &[&Version],
    ) -> Result<()> {
        let manifest_key = paths::windows_manifest_key(&app.slug, channel_id, arch.as_str());
        let existing = self.store.get_file(&manifest_key).await?;
        let Some(mut entries) = parse(&String::from_utf8_lossy(&existing)) else {
            return Ok(());
        };
        if entries.is_empty() {
            return Ok(());
        }

        let base_url = self.store.public_base_url();
        let arch_url = paths::public_url(
            &base_url,
            &paths::arch_dir(&app.slug, channel_id, "win32", arch.as_str()),
        );
        for entry in &mut entries {
            entry.absolutize(&arch_url);
        }

        let shared: HashSet<String> = survivors
            .iter()
            .flat_map(|v| package_urls(&app.slug, channel_id, arch, &base_url, v))
            .collect();
        let dropped: HashSet<String> = retired
            .iter()
            .flat_map(|v| package_urls(&app.slug, channel_id, arch, &base_url, v))
            .filter(|url| !shared.contains(url))
            .collect();

        let before = entries.len();
        entries.retain(|e| !dropped.contains(&e.url));
        if entries.len() == before {
            return Ok(());
        }
        debug!(key = %manifest_key, removed = before - entries.len(), "Dropping retired RELEASES entries");
        self.store
            .put_file(&manifest_key, Bytes::from(render(&entries)), true)
            .await?;
        Ok(())
    }
}

fn package_urls(
    app_slug: &str,
    channel_id: &str,
    arch: Arch,
    base_url: &str,
    version: &Version,
) -> Vec<String> {
    version
        .files
        .iter()
        .filter(|f| {
            route(&f.platform, &f.arch, &f.file_name)
                .is_some_and(|r| r.feed == Feed::Windows && r.arch == arch)
        })
        .map(|f| {
            let key = paths::artifact_key(app_slug, channel_id, "win32", arch.as_str(), &f.file_name);
            paths::public_url(base_url, &key)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = "0F2320FC3B29E1CD9F989DBF547BCD4D21D3BD12 thing-full.nupkg 8";

    #[test]
    fn test_parse_and_render() {
        let entries = parse(FULL).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].size, 8);
        assert_eq!(render(&entries), FULL);
    }

    #[test]
    fn test_parse_tolerates_bom_and_blank_lines() {
        let text = format!("\u{feff}{FULL}\r\n\r\n");
        assert_eq!(parse(&text).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse("not a manifest"), None);
        assert_eq!(parse("XYZ thing.nupkg 8"), None);
        assert_eq!(parse(&format!("{FULL} extra")), None);
        assert_eq!(parse(""), Some(vec![]));
    }

    #[test]
    fn test_absolutize() {
        let mut entry = parse(FULL).unwrap().remove(0);
        entry.absolutize("https://foo.bar/fake_slug/fake_channel_id/win32/ia32");
        assert_eq!(
            entry.url,
            "https://foo.bar/fake_slug/fake_channel_id/win32/ia32/thing-full.nupkg"
        );

        let before = entry.url.clone();
        entry.absolutize("https://elsewhere");
        assert_eq!(entry.url, before);
    }
}
