//! Registration path shared by the engine and the resolver.
//!
//! Borrows the engine's collaborators field by field so the resolver can
//! register candidates while the engine still owns everything.

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::download::DownloadOrchestrator;
use crate::extract::TextExtractor;
use crate::fetcher::{DetailFetcher, FetchedDetails, QueryTemplate};
use crate::registry::{DownloadStatus, PublicationRecord, Registry};
use crate::resolver::{PublicationSource, ResolveError};

pub(crate) struct Pipeline<'a> {
    pub registry: &'a mut Registry,
    pub fetcher: &'a dyn DetailFetcher,
    pub orchestrator: &'a mut DownloadOrchestrator,
    pub extractor: &'a dyn TextExtractor,
}

impl Pipeline<'_> {
    /// Registers the novel publications of `details`, retrieving PDFs for the
    /// open-access ones first. Returns the number of publications added.
    #[instrument(skip(self, details), fields(publications = details.publications.len()))]
    pub async fn register_details(&mut self, details: FetchedDetails) -> Result<usize, ResolveError> {
        let mut batch = self
            .registry
            .novel_publications(details.publications, details.sources);
        if batch.is_empty() {
            debug!("Nothing new to register");
            return Ok(0);
        }
        self.orchestrator.retrieve(&mut batch).await?;
        Ok(self.registry.register_publication(batch))
    }

    /// The registered publication with `external_id`, fetching it when unknown.
    pub async fn publication_by_external_id(
        &mut self,
        external_id: &str,
    ) -> Result<Option<PublicationRecord>, ResolveError> {
        if let Some(record) = self.registry.lookup_publication_by_external_id(external_id) {
            return Ok(Some(record.clone()));
        }
        let details = self
            .fetcher
            .fetch(QueryTemplate::ByExternalId, external_id)
            .await?;
        self.register_details(details).await?;
        Ok(self
            .registry
            .lookup_publication_by_external_id(external_id)
            .cloned())
    }
}

#[async_trait]
impl PublicationSource for Pipeline<'_> {
    async fn register(&mut self, details: FetchedDetails) -> Result<(), ResolveError> {
        self.register_details(details).await.map(|_| ())
    }

    async fn ensure_publication(
        &mut self,
        external_id: &str,
    ) -> Result<Option<PublicationRecord>, ResolveError> {
        self.publication_by_external_id(external_id).await
    }

    async fn full_text(&mut self, external_id: &str) -> Result<Option<String>, ResolveError> {
        let Some(record) = self.registry.lookup_publication_by_external_id(external_id) else {
            return Ok(None);
        };
        if record.download_status != DownloadStatus::Success {
            return Ok(None);
        }
        let path = self.orchestrator.stored_path(&record.doi);
        if !path.exists() {
            warn!(path = %path.display(), "Recorded download is missing from disk");
            return Ok(None);
        }
        Ok(Some(self.extractor.extract_text(&path)?))
    }
}
