use super::InvalidationClient;
use crate::{Error, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};
use tracing::debug;
use uuid::Uuid;

pub struct CloudFrontClient {
    client: aws_sdk_cloudfront::Client,
}

impl CloudFrontClient {
    /// Client configured from the ambient AWS environment.
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self {
            client: aws_sdk_cloudfront::Client::new(&config),
        }
    }
}

#[async_trait]
impl InvalidationClient for CloudFrontClient {
    async fn create_invalidation(&self, distribution_id: &str, paths: Vec<String>) -> Result<()> {
        let quantity = i32::try_from(paths.len())
            .map_err(|_| Error::Invalid(format!("too many paths: {}", paths.len())))?;
        let paths = Paths::builder()
            .quantity(quantity)
            .set_items(Some(paths))
            .build()
            .map_err(|e| Error::Storage(e.to_string()))?;
        let batch = InvalidationBatch::builder()
            .caller_reference(Uuid::new_v4().to_string())
            .paths(paths)
            .build()
            .map_err(|e| Error::Storage(e.to_string()))?;

        let output = self
            .client
            .create_invalidation()
            .distribution_id(distribution_id)
            .invalidation_batch(batch)
            .send()
            .await
            .map_err(|e| Error::Storage(format!("CreateInvalidation failed: {e}")))?;

        debug!(
            distribution = %distribution_id,
            invalidation = ?output.invalidation().map(|i| i.id()),
            "Created invalidation"
        );
        Ok(())
    }
}
