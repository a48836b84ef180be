//! Working-directory engine: the public face of the library.
//!
//! An [`Engine`] owns the registry, the detail fetcher, the resolver and the
//! download orchestrator for one working directory laid out as
//!
//! ```text
//! <working_dir>/database/registry.db
//! <working_dir>/publication/<escaped-doi>.pdf
//! ```
//!
//! Every operation is awaited to completion before the next starts. Nothing
//! is written to the database until [`Engine::commit`].

mod error;
mod pipeline;

pub use error::EngineError;

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::db::Database;
use crate::download::{
    BrowserSession, DEFAULT_CLICK_SETTLE, DEFAULT_PRIMARY_DOMAIN, DownloadListing,
    DownloadOrchestrator, DownloadSettings, HttpBrowser, LocalDownloadDir, PollPolicy,
};
use crate::extract::{PdfTextExtractor, TextExtractor};
use crate::fetcher::{DEFAULT_NCBI_BASE_URL, DetailFetcher, FetchedDetails, NcbiFetcher};
use crate::http_client::HttpTimeouts;
use crate::identifier::{PublicationId, is_dataset_id, unescape_doi};
use crate::registry::{
    DatasetRecord, DownloadStatus, PublicationRecord, Registry, RegistryError, RegistryStore,
    SqliteRegistryStore,
};
use crate::resolver::{ResolutionOutcome, Resolver};

use pipeline::Pipeline;

/// Directory under the working dir holding the registry database.
pub const DATABASE_DIR: &str = "database";
/// Registry database file name.
pub const DATABASE_FILE: &str = "registry.db";
/// Directory under the working dir receiving downloads.
pub const PUBLICATION_DIR: &str = "publication";

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub working_dir: PathBuf,
    /// Links on this host are attempted individually.
    pub primary_domain: String,
    pub poll: PollPolicy,
    /// Wait after each click of a click-through strategy.
    pub click_settle: Duration,
    pub timeouts: HttpTimeouts,
    pub ncbi_base_url: String,
}

impl EngineConfig {
    /// Default settings for `working_dir`.
    #[must_use]
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            primary_domain: DEFAULT_PRIMARY_DOMAIN.to_string(),
            poll: PollPolicy::default(),
            click_settle: DEFAULT_CLICK_SETTLE,
            timeouts: HttpTimeouts::default(),
            ncbi_base_url: DEFAULT_NCBI_BASE_URL.to_string(),
        }
    }

    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.working_dir.join(DATABASE_DIR).join(DATABASE_FILE)
    }

    #[must_use]
    pub fn download_dir(&self) -> PathBuf {
        self.working_dir.join(PUBLICATION_DIR)
    }

    #[must_use]
    pub fn download_settings(&self) -> DownloadSettings {
        DownloadSettings {
            primary_domain: self.primary_domain.clone(),
            poll: self.poll,
            click_settle: self.click_settle,
        }
    }
}

/// Replaceable collaborators for [`Engine::with_collaborators`].
pub struct Collaborators {
    pub store: Box<dyn RegistryStore>,
    pub fetcher: Box<dyn DetailFetcher>,
    pub browser: Box<dyn BrowserSession>,
    pub listing: Box<dyn DownloadListing>,
    pub extractor: Box<dyn TextExtractor>,
}

/// Dataset-to-publication linker over one working directory.
pub struct Engine {
    config: EngineConfig,
    registry: Registry,
    fetcher: Box<dyn DetailFetcher>,
    resolver: Resolver,
    orchestrator: DownloadOrchestrator,
    extractor: Box<dyn TextExtractor>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Opens the working directory with the NCBI fetcher, the HTTP browser
    /// and the `SQLite` registry, creating the layout when missing.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the layout cannot be created, the
    /// database cannot be opened or an HTTP client cannot be built.
    #[instrument(skip(config), fields(working_dir = %config.working_dir.display()))]
    pub async fn open(config: EngineConfig) -> Result<Self, EngineError> {
        let download_dir = config.download_dir();
        tokio::fs::create_dir_all(&download_dir)
            .await
            .map_err(|source| EngineError::Io {
                path: download_dir.clone(),
                source,
            })?;

        let db = Database::new(&config.database_path())
            .await
            .map_err(RegistryError::from)?;
        let fetcher = NcbiFetcher::with_base_url(&config.ncbi_base_url, config.timeouts)?;
        let browser = HttpBrowser::new(&download_dir, config.timeouts)?;

        let collaborators = Collaborators {
            store: Box::new(SqliteRegistryStore::new(db)),
            fetcher: Box::new(fetcher),
            browser: Box::new(browser),
            listing: Box::new(LocalDownloadDir::new(download_dir)),
            extractor: Box::new(PdfTextExtractor),
        };
        Self::with_collaborators(config, collaborators).await
    }

    /// Builds an engine over explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Registry`] when the store cannot be loaded.
    pub async fn with_collaborators(
        config: EngineConfig,
        collaborators: Collaborators,
    ) -> Result<Self, EngineError> {
        let registry = Registry::open(collaborators.store).await?;
        info!(
            datasets = registry.datasets().len(),
            publications = registry.publications().len(),
            "Registry loaded"
        );
        let orchestrator = DownloadOrchestrator::new(
            collaborators.browser,
            collaborators.listing,
            config.download_settings(),
        );
        Ok(Self {
            config,
            registry,
            fetcher: collaborators.fetcher,
            resolver: Resolver::default(),
            orchestrator,
            extractor: collaborators.extractor,
        })
    }

    /// Replaces the resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn pipeline(&mut self) -> Pipeline<'_> {
        Pipeline {
            registry: &mut self.registry,
            fetcher: self.fetcher.as_ref(),
            orchestrator: &mut self.orchestrator,
            extractor: self.extractor.as_ref(),
        }
    }

    /// Links `dataset_id` to a publication DOI.
    ///
    /// Returns the cached DOI for an already linked dataset. Otherwise runs
    /// the resolver; on a match the publication is registered (downloading
    /// its PDF when open access) and then the dataset. Unresolved datasets
    /// are not registered.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidDatasetId`] for a non-numeric id and
    /// propagates collaborator failures.
    #[instrument(skip(self))]
    pub async fn resolve_dataset(&mut self, dataset_id: &str) -> Result<Option<String>, EngineError> {
        let dataset_id = dataset_id.trim();
        if !is_dataset_id(dataset_id) {
            return Err(EngineError::invalid_dataset_id(dataset_id));
        }
        if let Some(doi) = self
            .registry
            .lookup_dataset(dataset_id)
            .and_then(|dataset| dataset.doi.clone())
        {
            debug!(doi = %doi, "Dataset already linked");
            return Ok(Some(doi));
        }

        let mut pipeline = Pipeline {
            registry: &mut self.registry,
            fetcher: self.fetcher.as_ref(),
            orchestrator: &mut self.orchestrator,
            extractor: self.extractor.as_ref(),
        };
        let outcome = self
            .resolver
            .resolve(self.fetcher.as_ref(), &mut pipeline, dataset_id)
            .await?;
        let ResolutionOutcome::Matched(found) = outcome else {
            info!("Dataset not resolved");
            return Ok(None);
        };

        let Some(publication) = pipeline
            .publication_by_external_id(&found.external_id)
            .await?
        else {
            info!(external_id = %found.external_id, "Matched publication has no detail record");
            return Ok(None);
        };
        let doi = publication.doi;

        if self.registry.lookup_dataset(dataset_id).is_some() {
            self.registry.attach_doi(dataset_id, &doi);
        } else {
            self.registry
                .register_dataset([DatasetRecord::linked(dataset_id, doi.clone())]);
        }
        info!(doi = %doi, method = %found.method, "Dataset linked");
        Ok(Some(doi))
    }

    /// Resolves every id in order.
    ///
    /// # Errors
    ///
    /// The first failing id aborts the batch; earlier results stay registered
    /// in memory.
    pub async fn resolve_datasets<I, S>(
        &mut self,
        dataset_ids: I,
    ) -> Result<Vec<(String, Option<String>)>, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut outcomes = Vec::new();
        for dataset_id in dataset_ids {
            let dataset_id = dataset_id.as_ref();
            let doi = self.resolve_dataset(dataset_id).await?;
            outcomes.push((dataset_id.trim().to_string(), doi));
        }
        Ok(outcomes)
    }

    /// PMID of the publication linked to `dataset_id`, resolving it if needed.
    ///
    /// # Errors
    ///
    /// Same as [`Engine::resolve_dataset`].
    pub async fn external_id_for_dataset(
        &mut self,
        dataset_id: &str,
    ) -> Result<Option<String>, EngineError> {
        let Some(doi) = self.resolve_dataset(dataset_id).await? else {
            return Ok(None);
        };
        Ok(self
            .registry
            .lookup_publication(&doi)
            .map(|publication| publication.external_id.clone()))
    }

    /// The publication already linked to `dataset_id`.
    #[must_use]
    pub fn publication_for_dataset(&self, dataset_id: &str) -> Option<&PublicationRecord> {
        let doi = self.registry.lookup_dataset(dataset_id.trim())?.doi.as_deref()?;
        self.registry.lookup_publication(doi)
    }

    /// The dataset linked to `doi` (escaped or not).
    #[must_use]
    pub fn dataset_for_publication(&self, doi: &str) -> Option<&DatasetRecord> {
        self.registry.lookup_dataset_by_doi(&unescape_doi(doi.trim()))
    }

    /// Path of the stored PDF for a DOI or PMID.
    ///
    /// An unknown PMID is fetched and registered first, which downloads its
    /// PDF when open access. Returns `None` unless the download succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidIdentifier`] when `identifier` is
    /// neither format, and propagates collaborator failures.
    #[instrument(skip(self))]
    pub async fn load_publication(&mut self, identifier: &str) -> Result<Option<PathBuf>, EngineError> {
        let publication = match PublicationId::parse(identifier) {
            Some(PublicationId::Doi(doi)) => self.registry.lookup_publication(&doi).cloned(),
            Some(PublicationId::ExternalId(external_id)) => {
                self.pipeline()
                    .publication_by_external_id(&external_id)
                    .await?
            }
            None => return Err(EngineError::invalid_identifier(identifier)),
        };

        let Some(publication) = publication else {
            debug!("Publication unknown");
            return Ok(None);
        };
        if publication.download_status != DownloadStatus::Success {
            debug!(status = %publication.download_status, "No stored PDF");
            return Ok(None);
        }
        Ok(Some(self.orchestrator.stored_path(&publication.doi)))
    }

    /// Extracted text of the stored PDF for `external_id`.
    ///
    /// # Errors
    ///
    /// Same as [`Engine::load_publication`], plus [`EngineError::Extract`]
    /// when the stored file cannot be read.
    pub async fn full_text(&mut self, external_id: &str) -> Result<Option<String>, EngineError> {
        let Some(path) = self.load_publication(external_id).await? else {
            return Ok(None);
        };
        Ok(Some(self.extractor.extract_text(&path)?))
    }

    /// Registers fetched publications not yet known, retrieving open-access
    /// PDFs first. Returns the number added.
    ///
    /// # Errors
    ///
    /// Propagates a lost browser session or an unreadable download directory.
    pub async fn register_publication(&mut self, details: FetchedDetails) -> Result<usize, EngineError> {
        Ok(self.pipeline().register_details(details).await?)
    }

    /// Flushes the registry to durable storage.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Registry`] when the write fails.
    pub async fn commit(&self) -> Result<(), EngineError> {
        self.registry.commit().await?;
        info!(
            datasets = self.registry.datasets().len(),
            publications = self.registry.publications().len(),
            sources = self.registry.sources().len(),
            "Registry committed"
        );
        Ok(())
    }

    /// Location of the download directory.
    #[must_use]
    pub fn download_dir(&self) -> PathBuf {
        self.config.download_dir()
    }
}
