use crate::cli::Target;
use anyhow::Context as _;
use models::app::{App, Channel};
use std::sync::Arc;
use updraft::catalog::{PgCatalog, ReleaseCatalog};
use updraft::cdn::InvalidationService;
use updraft::cdn::cloudfront::CloudFrontClient;
use updraft::config::{Config, StorageConfig};
use updraft::positioner::Positioner;
use updraft::releases::ReleaseManager;
use updraft::shutdown::ShutdownSignals;
use updraft::storage::BlobStore;
use tracing::debug;

/// Everything a command needs, opened once per invocation.
pub struct Context {
    pub config: Config,
    pub store: Arc<dyn BlobStore>,
    invalidation: Option<InvalidationService>,
}

impl Context {
    pub async fn open(config: Config) -> anyhow::Result<Self> {
        let invalidation = match (&config.cloudfront, &config.storage) {
            (Some(cloudfront), StorageConfig::S3(_)) => {
                debug!(distribution = %cloudfront.distribution_id, "Batching CDN invalidations");
                let client = CloudFrontClient::from_env().await;
                Some(InvalidationService::new(
                    Arc::new(client),
                    config.invalidation,
                    ShutdownSignals::new(),
                ))
            }
            _ => None,
        };
        let store = config.build_store(invalidation.as_ref()).await?;

        Ok(Self {
            config,
            store,
            invalidation,
        })
    }

    pub fn positioner(&self) -> Positioner {
        Positioner::new(self.store.clone(), self.config.positioner)
    }

    pub async fn catalog(&self) -> anyhow::Result<Arc<dyn ReleaseCatalog>> {
        let catalog = PgCatalog::connect(self.config.database_url()?)
            .await
            .context("Failed to open the release catalog")?;
        Ok(Arc::new(catalog))
    }

    pub async fn manager(&self) -> anyhow::Result<ReleaseManager> {
        Ok(ReleaseManager::new(
            self.catalog().await?,
            self.positioner(),
            self.config.default_rollout,
        ))
    }

    /// Looks up the application by slug and the channel by id.
    pub async fn resolve(
        &self,
        catalog: &dyn ReleaseCatalog,
        target: &Target,
    ) -> anyhow::Result<(App, Channel)> {
        let app = catalog
            .get_app_by_slug(&target.app)
            .await?
            .with_context(|| format!("No application with slug '{}'", target.app))?;
        let channel = app
            .channel(&target.channel)
            .cloned()
            .with_context(|| format!("No channel '{}' in {}", target.channel, app.slug))?;
        Ok((app, channel))
    }

    /// Flushes pending CDN invalidations before exiting.
    pub async fn shutdown(self) {
        if let Some(invalidation) = self.invalidation {
            invalidation.shutdown().await;
        }
    }
}
