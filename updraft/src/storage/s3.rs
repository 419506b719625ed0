use super::BlobStore;
use crate::cdn::Invalidator;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible services. Enables path-style access.
    pub endpoint: Option<String>,
    /// Public URL of the CDN distribution fronting the bucket.
    pub public_url: Option<String>,
}

impl S3Config {
    pub fn public_base_url(&self) -> String {
        if let Some(public_url) = &self.public_url {
            return public_url.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            return endpoint.clone();
        }
        format!("https://{}.s3.amazonaws.com", self.bucket)
    }
}

pub struct S3Store {
    bucket: Box<Bucket>,
    base_url: String,
    invalidator: Option<Invalidator>,
}

fn is_not_found(e: &S3Error) -> bool {
    if let S3Error::HttpFailWithBody(404, _) = e {
        return true;
    }
    let err_str = e.to_string();
    err_str.contains("404") || err_str.contains("NoSuchKey") || err_str.contains("Not Found")
}

/// Missing objects read as empty; every other failure propagates.
fn absent_or_error(key: &str, e: S3Error) -> Result<Bytes> {
    if is_not_found(&e) {
        Ok(Bytes::new())
    } else {
        Err(Error::Storage(format!("Failed to fetch '{key}': {e}")))
    }
}

impl S3Store {
    /// Builds a store using the default AWS credential chain.
    pub fn new(config: &S3Config, invalidator: Option<Invalidator>) -> Result<Self> {
        let credentials = Credentials::default()
            .map_err(|e| Error::Storage(format!("Failed to load AWS credentials: {e}")))?;
        Self::with_credentials(config, credentials, invalidator)
    }

    pub fn with_credentials(
        config: &S3Config,
        credentials: Credentials,
        invalidator: Option<Invalidator>,
    ) -> Result<Self> {
        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config
                .region
                .parse()
                .map_err(|_| Error::Storage(format!("Invalid S3 region: {}", config.region)))?,
        };

        let bucket = Bucket::new(&config.bucket, region, credentials)?;
        let bucket = if config.endpoint.is_some() {
            bucket.with_path_style()
        } else {
            bucket
        };

        Ok(Self {
            bucket,
            base_url: config.public_base_url(),
            invalidator,
        })
    }
}

#[async_trait]
impl BlobStore for S3Store {
    async fn has_file(&self, key: &str) -> Result<bool> {
        match self.bucket.head_object(key).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(Error::Storage(format!(
                "Failed to check existence of '{key}': {e}"
            ))),
        }
    }

    async fn get_file_size(&self, key: &str) -> Result<u64> {
        match self.bucket.head_object(key).await {
            Ok((head, _)) => Ok(head
                .content_length
                .and_then(|len| u64::try_from(len).ok())
                .unwrap_or(0)),
            Err(e) if is_not_found(&e) => Ok(0),
            Err(e) => Err(Error::Storage(format!("Failed to stat '{key}': {e}"))),
        }
    }

    async fn put_file(&self, key: &str, data: Bytes, overwrite: bool) -> Result<bool> {
        let wrote = if overwrite || !self.has_file(key).await? {
            self.bucket
                .put_object(key, &data)
                .await
                .map_err(|e| Error::Storage(format!("Failed to put object '{key}': {e}")))?;
            debug!(key = %key, overwrite, "S3 put object successful");
            true
        } else {
            false
        };

        if overwrite {
            if let Some(invalidator) = &self.invalidator {
                invalidator.add_to_batch(key).await;
            }
        }

        Ok(wrote)
    }

    async fn get_file(&self, key: &str) -> Result<Bytes> {
        match self.bucket.get_object(key).await {
            Ok(response) if response.status_code() == 404 => Ok(Bytes::new()),
            Ok(response) if response.status_code() >= 300 => Err(Error::Storage(format!(
                "Failed to fetch '{key}': status {}",
                response.status_code()
            ))),
            Ok(response) => Ok(Bytes::from(response.to_vec())),
            Err(e) => absent_or_error(key, e),
        }
    }

    async fn list_files(&self, prefix: &str) -> Result<Vec<String>> {
        let pages = self
            .bucket
            .list(prefix.to_string(), None)
            .await
            .map_err(|e| Error::Storage(format!("Failed to list '{prefix}': {e}")))?;

        Ok(pages
            .into_iter()
            .flat_map(|page| page.contents)
            .map(|object| object.key)
            .collect())
    }

    async fn delete_path(&self, key: &str) -> Result<()> {
        let directory = format!("{}/", key.trim_end_matches('/'));
        let mut keys = self.list_files(&directory).await?;
        if self.has_file(key).await? {
            keys.push(key.to_string());
        }

        debug!(key = %key, count = keys.len(), "Deleting objects under path");
        for object in keys {
            match self.bucket.delete_object(&object).await {
                Ok(_) => {}
                Err(e) if is_not_found(&e) => {}
                Err(e) => {
                    return Err(Error::Storage(format!(
                        "Failed to delete object '{object}': {e}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn public_base_url(&self) -> String {
        self.base_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn config() -> S3Config {
        S3Config {
            bucket: "releases".to_string(),
            region: "us-east-1".to_string(),
            endpoint: None,
            public_url: None,
        }
    }

    #[test]
    fn test_only_missing_objects_read_as_empty() {
        let missing = absent_or_error("a/RELEASES", S3Error::HttpFailWithBody(404, String::new()));
        assert!(missing.unwrap().is_empty());

        let failed = absent_or_error(
            "a/.lock",
            S3Error::HttpFailWithBody(503, "SlowDown".to_string()),
        );
        assert_matches!(failed, Err(Error::Storage(_)));
    }

    #[test]
    fn test_public_base_url_defaults_to_bucket_host() {
        assert_eq!(config().public_base_url(), "https://releases.s3.amazonaws.com");
    }

    #[test]
    fn test_public_base_url_prefers_cdn_then_endpoint() {
        let mut config = config();
        config.endpoint = Some("http://minio:9000".to_string());
        assert_eq!(config.public_base_url(), "http://minio:9000");

        config.public_url = Some("https://cdn.example.com".to_string());
        assert_eq!(config.public_base_url(), "https://cdn.example.com");
    }

    #[test]
    fn test_store_uses_configured_base_url() {
        let mut config = config();
        config.endpoint = Some("http://minio:9000".to_string());
        let store = S3Store::with_credentials(&config, Credentials::anonymous().unwrap(), None)
            .unwrap();
        assert_eq!(store.public_base_url(), "http://minio:9000");
    }

    #[test]
    fn test_not_found_detection() {
        assert!(is_not_found(&S3Error::HttpFailWithBody(404, "NoSuchKey".into())));
        assert!(!is_not_found(&S3Error::HttpFailWithBody(500, "boom".into())));
    }
}
