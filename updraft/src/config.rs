use crate::cdn::{InvalidationService, InvalidationSettings};
use crate::positioner::{BucketPolicy, PositionerSettings};
use crate::storage::{BlobStore, LocalStore, S3Config, S3Store};
use anyhow::{Context, bail};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudFrontConfig {
    pub distribution_id: String,
    pub public_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Local { root: PathBuf, static_url: String },
    S3(S3Config),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub cloudfront: Option<CloudFrontConfig>,
    pub invalidation: InvalidationSettings,
    pub database_url: Option<String>,
    /// Rollout given to every version after the first one of a channel.
    pub default_rollout: i32,
    pub positioner: PositionerSettings,
}

impl Config {
    pub fn new() -> anyhow::Result<Config> {
        _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let cloudfront = match (
            var("CLOUDFRONT_DISTRIBUTION_ID"),
            var("CLOUDFRONT_PUBLIC_URL"),
        ) {
            (Some(distribution_id), Some(public_url)) => Some(CloudFrontConfig {
                distribution_id,
                public_url,
            }),
            (None, None) => None,
            _ => bail!(
                "CLOUDFRONT_DISTRIBUTION_ID and CLOUDFRONT_PUBLIC_URL must be set together."
            ),
        };

        let backend = var("STORAGE_BACKEND").unwrap_or_else(|| "local".to_string());
        let storage = match backend.as_str() {
            "local" => StorageConfig::Local {
                root: var("LOCAL_STORAGE_ROOT")
                    .unwrap_or_else(|| "./data".to_string())
                    .into(),
                static_url: var("LOCAL_STORAGE_STATIC_URL")
                    .unwrap_or_else(|| "http://localhost:9999".to_string()),
            },
            "s3" => StorageConfig::S3(S3Config {
                bucket: var("S3_BUCKET").context("S3_BUCKET is required.")?,
                region: var("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                endpoint: var("S3_ENDPOINT"),
                public_url: cloudfront.as_ref().map(|c| c.public_url.clone()),
            }),
            other => bail!("STORAGE_BACKEND must be 'local' or 's3', got '{other}'."),
        };

        let defaults = InvalidationSettings::default();
        let invalidation = InvalidationSettings {
            interval: parse_secs(&var, "CLOUDFRONT_INVALIDATION_INTERVAL_SECS")?
                .unwrap_or(defaults.interval),
            quiet_period: parse_secs(&var, "CLOUDFRONT_INVALIDATION_QUIET_SECS")?
                .unwrap_or(defaults.quiet_period),
            batch_size: parse::<usize>(&var, "CLOUDFRONT_INVALIDATION_BATCH_SIZE")?
                .unwrap_or(defaults.batch_size),
        };
        if invalidation.batch_size == 0 {
            bail!("CLOUDFRONT_INVALIDATION_BATCH_SIZE must be positive.");
        }

        let default_rollout = parse::<i32>(&var, "DEFAULT_ROLLOUT")?.unwrap_or(0);
        if !(0..=100).contains(&default_rollout) {
            bail!("DEFAULT_ROLLOUT must be between 0 and 100.");
        }

        let positioner = PositionerSettings {
            write_release_index: parse_bool(&var, "WRITE_RELEASE_INDEX")?.unwrap_or(true),
            bucket_policy: match var("ROLLOUT_BUCKET_POLICY") {
                Some(policy) => policy
                    .parse::<BucketPolicy>()
                    .map_err(anyhow::Error::msg)
                    .context("ROLLOUT_BUCKET_POLICY is invalid.")?,
                None => BucketPolicy::default(),
            },
        };

        Ok(Config {
            storage,
            cloudfront,
            invalidation,
            database_url: var("DATABASE_URL"),
            default_rollout,
            positioner,
        })
    }

    /// Opens the configured blob store. S3 writes are wired to the CDN
    /// invalidation batcher when both a distribution and a service exist.
    pub async fn build_store(
        &self,
        invalidation: Option<&InvalidationService>,
    ) -> anyhow::Result<Arc<dyn BlobStore>> {
        match &self.storage {
            StorageConfig::Local { root, static_url } => {
                std::fs::create_dir_all(root)
                    .with_context(|| format!("Failed to create {}", root.display()))?;
                Ok(Arc::new(LocalStore::new(root.clone(), static_url.clone())))
            }
            StorageConfig::S3(s3) => {
                let invalidator = match (&self.cloudfront, invalidation) {
                    (Some(cloudfront), Some(service)) => {
                        Some(service.invalidator(&cloudfront.distribution_id).await)
                    }
                    _ => None,
                };
                let store = S3Store::new(s3, invalidator).context("Failed to open S3 bucket")?;
                Ok(Arc::new(store))
            }
        }
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL is required.")
    }
}

fn parse<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    var(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("{key} is invalid: {e}"))
        })
        .transpose()
}

fn parse_secs(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> anyhow::Result<Option<Duration>> {
    Ok(parse::<u64>(var, key)?.map(Duration::from_secs))
}

fn parse_bool(var: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<bool>> {
    var(key)
        .map(|raw| -> anyhow::Result<bool> {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                other => bail!("{key} is invalid: expected a boolean, got '{other}'"),
            }
        })
        .transpose()
}
