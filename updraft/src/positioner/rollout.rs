//! Percentile bucket selection for staged rollout.
//!
//! Clients are pinned to one bucket in `0..=100` for their lifetime and
//! always fetch that bucket's manifest variant. A version reaches a bucket
//! once its rollout exceeds the bucket number, so raising the rollout only
//! ever adds buckets, lowest first.

use models::release::Version;
use std::collections::HashSet;
use std::str::FromStr;

pub const BUCKET_COUNT: u8 = 101;

pub fn buckets() -> impl Iterator<Item = u8> {
    0..BUCKET_COUNT
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BucketPolicy {
    /// `rollout > bucket`, with 100% reaching every bucket.
    #[default]
    Strict,
    /// `rollout >= bucket`.
    Inclusive,
}

impl BucketPolicy {
    pub fn is_visible(&self, version: &Version, bucket: u8) -> bool {
        if version.dead {
            return false;
        }
        let bucket = i32::from(bucket);
        match self {
            BucketPolicy::Strict => version.rollout >= 100 || version.rollout > bucket,
            BucketPolicy::Inclusive => version.rollout >= bucket,
        }
    }

    /// Names of the versions a client in `bucket` may be offered.
    pub fn visible_names<'a>(&self, versions: &'a [Version], bucket: u8) -> HashSet<&'a str> {
        versions
            .iter()
            .filter(|v| self.is_visible(v, bucket))
            .map(|v| v.name.as_str())
            .collect()
    }
}

impl FromStr for BucketPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(BucketPolicy::Strict),
            "inclusive" => Ok(BucketPolicy::Inclusive),
            other => Err(format!("unknown rollout bucket policy: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn version(rollout: i32, dead: bool) -> Version {
        Version {
            id: 1,
            name: "1.0.0".to_string(),
            dead,
            rollout,
            created_at: chrono::Utc::now(),
            files: vec![],
        }
    }

    #[test]
    fn test_strict_edges() {
        let policy = BucketPolicy::Strict;
        assert!(!policy.is_visible(&version(0, false), 0));
        assert!(policy.is_visible(&version(1, false), 0));
        assert!(!policy.is_visible(&version(1, false), 1));
        assert!(policy.is_visible(&version(100, false), 100));
        assert!(!policy.is_visible(&version(100, true), 0));
    }

    #[test]
    fn test_inclusive_edges() {
        let policy = BucketPolicy::Inclusive;
        assert!(policy.is_visible(&version(0, false), 0));
        assert!(policy.is_visible(&version(50, false), 50));
        assert!(!policy.is_visible(&version(50, false), 51));
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!("Strict".parse(), Ok(BucketPolicy::Strict));
        assert_eq!("inclusive".parse(), Ok(BucketPolicy::Inclusive));
        assert!("random".parse::<BucketPolicy>().is_err());
    }

    fn policies() -> impl Strategy<Value = BucketPolicy> {
        prop_oneof![Just(BucketPolicy::Strict), Just(BucketPolicy::Inclusive)]
    }

    proptest! {
        #[test]
        fn raising_rollout_never_hides_a_version(
            policy in policies(),
            low in 0i32..=100,
            extra in 0i32..=100,
            bucket in 0u8..=100,
        ) {
            let high = (low + extra).min(100);
            if policy.is_visible(&version(low, false), bucket) {
                prop_assert!(policy.is_visible(&version(high, false), bucket));
            }
        }

        #[test]
        fn lower_buckets_see_a_version_first(
            policy in policies(),
            rollout in 0i32..=100,
            bucket in 1u8..=100,
        ) {
            if policy.is_visible(&version(rollout, false), bucket) {
                prop_assert!(policy.is_visible(&version(rollout, false), bucket - 1));
            }
        }
    }
}
