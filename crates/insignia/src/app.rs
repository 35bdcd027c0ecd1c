//! Service wiring from configuration.

use crate::InsigniaConfig;
use insignia_core::MediaClassifier;
use insignia_database::{establish_pool, run_migrations, DbPool, PostgresMediaCatalog, PostgresTemplateRepository};
use insignia_error::{DatabaseError, DatabaseErrorKind, InsigniaResult, StorageError, StorageErrorKind};
use insignia_interface::{MediaCatalog, TemplateRepository};
use insignia_service::{ExpirySweeper, MediaService, PlaceholderMockRenderer, SweepSchedule, TemplateService};
use insignia_storage::{BlobFiles, ContentStore, LinkNamespace, LinkTable};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// The assembled services.
///
/// # Example
///
/// ```no_run
/// use insignia::{Insignia, InsigniaConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = InsigniaConfig::load(None)?;
/// let insignia = Insignia::connect(&config).await?;
/// let bytes = insignia.media().retrieve_media("team-logo", "alpha.png").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Insignia {
    media: Arc<MediaService>,
    templates: TemplateService,
    sweeper: Arc<ExpirySweeper>,
    schedule: SweepSchedule,
}

impl Insignia {
    /// Wire the services over the given persistence adapters.
    ///
    /// Creates the blob and link roots if they are missing.
    pub fn with_adapters(
        config: &InsigniaConfig,
        catalog: Arc<dyn MediaCatalog>,
        templates: Arc<dyn TemplateRepository>,
    ) -> InsigniaResult<Self> {
        let files = BlobFiles::new(&config.storage.blob_root)?;
        let namespace = LinkNamespace::new(&config.storage.link_root)?;
        let limits = config.coordination.io_limits();

        let media = Arc::new(MediaService::new(
            MediaClassifier::new(config.policy_table()),
            ContentStore::new(catalog.clone(), files.clone(), limits),
            LinkTable::new(catalog, namespace, files, limits).with_page_size(config.sweep.page_size),
            config.coordination.retry_policy(),
        ));

        tracing::debug!(classes = media.classifier().policies().len(), "Wired media services");
        Ok(Self {
            templates: TemplateService::new(media.clone(), templates, Arc::new(PlaceholderMockRenderer::new())),
            sweeper: Arc::new(ExpirySweeper::new(media.clone())),
            schedule: config.sweep.schedule.clone(),
            media,
        })
    }

    /// Connect to PostgreSQL and wire the services over it.
    ///
    /// # Errors
    ///
    /// `ConfigError` without a database URL, or a `DatabaseError` if the
    /// pool cannot be built.
    #[tracing::instrument(skip(config))]
    pub async fn connect(config: &InsigniaConfig) -> InsigniaResult<Self> {
        let pool = connect_pool(config).await?;
        Self::with_adapters(
            config,
            Arc::new(PostgresMediaCatalog::new(pool.clone())),
            Arc::new(PostgresTemplateRepository::new(pool)),
        )
    }

    /// Media operations.
    pub fn media(&self) -> &Arc<MediaService> {
        &self.media
    }

    /// Template operations.
    pub fn templates(&self) -> &TemplateService {
        &self.templates
    }

    /// The expiry sweeper.
    pub fn sweeper(&self) -> &Arc<ExpirySweeper> {
        &self.sweeper
    }

    /// Configured sweep cadence.
    pub fn schedule(&self) -> &SweepSchedule {
        &self.schedule
    }

    /// Start the sweeper on the configured schedule.
    pub fn spawn_sweeper(&self) -> InsigniaResult<JoinHandle<()>> {
        self.sweeper.clone().spawn(self.schedule.clone())
    }
}

async fn connect_pool(config: &InsigniaConfig) -> InsigniaResult<DbPool> {
    let url = config.database.resolve_url()?;
    let pool_size = config.database.pool_size;
    tokio::task::spawn_blocking(move || establish_pool(&url, pool_size))
        .await
        .map_err(|e| StorageError::new(StorageErrorKind::Task(e.to_string())))?
        .map_err(Into::into)
}

/// Apply pending database migrations.
#[tracing::instrument(skip(config))]
pub async fn migrate(config: &InsigniaConfig) -> InsigniaResult<()> {
    let pool = connect_pool(config).await?;
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| DatabaseError::new(DatabaseErrorKind::Pool(e.to_string())))?;
        run_migrations(&mut conn)
    })
    .await
    .map_err(|e| StorageError::new(StorageErrorKind::Task(e.to_string())))??;

    tracing::info!("Database is up to date");
    Ok(())
}
