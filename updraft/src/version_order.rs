//! Semantic ordering of version names.
//!
//! Names that do not parse as semver (after an optional leading `v`) sort
//! below every valid version and are compared lexically among themselves.

use std::cmp::Ordering;

fn parse(name: &str) -> Option<semver::Version> {
    semver::Version::parse(name.trim().trim_start_matches('v')).ok()
}

pub fn compare(a: &str, b: &str) -> Ordering {
    match (parse(a), parse(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

pub fn is_at_least(candidate: &str, current: &str) -> bool {
    compare(candidate, current) != Ordering::Less
}

pub fn sort_ascending<T>(items: &mut [T], name: impl Fn(&T) -> &str) {
    items.sort_by(|a, b| compare(name(a), name(b)));
}

pub fn sort_descending<T>(items: &mut [T], name: impl Fn(&T) -> &str) {
    items.sort_by(|a, b| compare(name(b), name(a)));
}
