//! Version lifecycle rules shared by every catalog implementation.

use crate::version_order;
use crate::{Error, Result};
use models::release::Version;

/// Number of most recent versions (by id) that bulk aging leaves alone.
pub const AGING_KEEP: usize = 3;

pub fn sluggify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() { "app".to_string() } else { slug }
}

/// `sluggify(name)`, then `{slug}2`, `{slug}3`, ... until unused.
pub fn unique_slug<'a>(name: &str, existing: impl IntoIterator<Item = &'a str> + Clone) -> String {
    let base = sluggify(name);
    let taken = |candidate: &str| existing.clone().into_iter().any(|s| s == candidate);
    let mut candidate = base.clone();
    let mut attempt = 1;
    while taken(&candidate) {
        attempt += 1;
        candidate = format!("{base}{attempt}");
    }
    candidate
}

/// The first version of a channel ships to everybody; later ones start at
/// the configured default.
pub fn initial_rollout(channel_has_versions: bool, default_rollout: i32) -> i32 {
    if channel_has_versions { default_rollout } else { 100 }
}

pub fn validate_rollout(rollout: i32) -> Result<i32> {
    if (0..=100).contains(&rollout) {
        Ok(rollout)
    } else {
        Err(Error::Invalid(format!(
            "rollout must be between 0 and 100, got {rollout}"
        )))
    }
}

/// Live versions older (by id) than the [`AGING_KEEP`] most recent ones.
pub fn versions_to_age(versions: &[Version]) -> Vec<&Version> {
    let mut ids: Vec<i32> = versions.iter().map(|v| v.id).collect();
    ids.sort_unstable_by(|a, b| b.cmp(a));
    let Some(&threshold) = ids.iter().take(AGING_KEEP).min() else {
        return Vec::new();
    };
    versions
        .iter()
        .filter(|v| !v.dead && v.id < threshold)
        .collect()
}

/// Dead versions outside the `keep` newest by semantic version.
pub fn retention_victims(versions: &[Version], keep: usize) -> Vec<&Version> {
    let mut ordered: Vec<&Version> = versions.iter().collect();
    version_order::sort_descending(&mut ordered, |v| v.name.as_str());
    ordered.into_iter().skip(keep).filter(|v| v.dead).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(id: i32, name: &str, dead: bool) -> Version {
        Version {
            id,
            name: name.to_string(),
            dead,
            rollout: 100,
            created_at: chrono::Utc::now(),
            files: vec![],
        }
    }

    #[test]
    fn test_sluggify() {
        assert_eq!(sluggify("My Cool App"), "my-cool-app");
        assert_eq!(sluggify("  fake_slug "), "fake_slug");
        assert_eq!(sluggify("!!!"), "app");
    }

    #[test]
    fn test_unique_slug_appends_counter() {
        let existing = ["my-app", "my-app2"];
        assert_eq!(unique_slug("My App", existing.iter().copied()), "my-app3");
        assert_eq!(unique_slug("Other", existing.iter().copied()), "other");
    }

    #[test]
    fn test_initial_rollout() {
        assert_eq!(initial_rollout(false, 0), 100);
        assert_eq!(initial_rollout(true, 0), 0);
        assert_eq!(initial_rollout(true, 25), 25);
    }

    #[test]
    fn test_validate_rollout() {
        assert_eq!(validate_rollout(0).unwrap(), 0);
        assert_eq!(validate_rollout(100).unwrap(), 100);
        assert!(validate_rollout(-1).is_err());
        assert!(validate_rollout(101).is_err());
    }

    #[test]
    fn test_versions_to_age() {
        let versions = vec![
            version(1, "0.0.1", false),
            version(2, "0.0.2", true),
            version(3, "0.0.3", false),
            version(4, "0.0.4", false),
            version(5, "0.0.5", false),
        ];
        let aged: Vec<i32> = versions_to_age(&versions).iter().map(|v| v.id).collect();
        assert_eq!(aged, vec![1]);

        assert!(versions_to_age(&versions[..3]).is_empty());
        assert!(versions_to_age(&[]).is_empty());
    }

    #[test]
    fn test_retention_victims() {
        let versions = vec![
            version(1, "1.0.0", true),
            version(2, "1.1.0", false),
            version(3, "1.2.0", true),
            version(4, "1.3.0", false),
            version(5, "1.10.0", true),
        ];
        let mut victims: Vec<&str> = retention_victims(&versions, 3)
            .iter()
            .map(|v| v.name.as_str())
            .collect();
        victims.sort();
        assert_eq!(victims, vec!["1.0.0"]);

        assert_eq!(retention_victims(&versions, 0).len(), 3);
        assert!(retention_victims(&versions, 5).is_empty());
    }
}
