//! Deduplicating registry of datasets, publications and their sources.
//!
//! # Overview
//!
//! - [`Registry`] - In-memory tables with first-write-wins key indices
//! - [`RegistryStore`] - Durable storage seam, loaded on open and flushed on commit
//! - [`SqliteRegistryStore`] - `SQLite` implementation over [`crate::Database`]
//!
//! Every key appears at most once. Registering a seen key is a silent no-op.
//! Nothing reaches durable storage until [`Registry::commit`] is called.
//!
//! # Example
//!
//! ```ignore
//! use nspider_core::registry::{DatasetRecord, Registry, SqliteRegistryStore};
//! use nspider_core::Database;
//!
//! let db = Database::new(Path::new("database/registry.db")).await?;
//! let mut registry = Registry::open(Box::new(SqliteRegistryStore::new(db))).await?;
//! registry.register_dataset(vec![DatasetRecord::linked("200011474", "10.1/x")]);
//! registry.commit().await?;
//! ```

mod error;
mod record;
mod store;

pub use error::{RegistryDbErrorKind, RegistryError};
pub use record::{DatasetRecord, DownloadStatus, PublicationRecord, SourceRecord};
pub use store::{RegistrySnapshot, RegistryStore, SqliteRegistryStore};

use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument};

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Publications and sources that travel together through registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublicationBatch {
    pub publications: Vec<PublicationRecord>,
    pub sources: Vec<SourceRecord>,
}

impl PublicationBatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.publications.is_empty()
    }

    /// Sources belonging to `doi`, in batch order.
    pub fn sources_for<'a>(&'a self, doi: &'a str) -> impl Iterator<Item = &'a SourceRecord> + 'a {
        self.sources.iter().filter(move |source| source.doi == doi)
    }
}

/// In-memory registry tables backed by a [`RegistryStore`].
pub struct Registry {
    store: Box<dyn RegistryStore>,
    datasets: Vec<DatasetRecord>,
    dataset_index: HashMap<String, usize>,
    publications: Vec<PublicationRecord>,
    publication_index: HashMap<String, usize>,
    sources: Vec<SourceRecord>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("datasets", &self.datasets.len())
            .field("publications", &self.publications.len())
            .field("sources", &self.sources.len())
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Loads existing tables from `store`.
    ///
    /// Rows sharing a key with an earlier row are dropped, so a store written
    /// by a buggy process still yields consistent indices.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the store cannot be read.
    #[instrument(skip(store))]
    pub async fn open(store: Box<dyn RegistryStore>) -> Result<Self> {
        let snapshot = store.load().await?;
        let mut registry = Self {
            store,
            datasets: Vec::new(),
            dataset_index: HashMap::new(),
            publications: Vec::new(),
            publication_index: HashMap::new(),
            sources: Vec::new(),
        };

        registry.register_dataset(snapshot.datasets);
        registry.register_publication(PublicationBatch {
            publications: snapshot.publications,
            sources: snapshot.sources,
        });

        debug!(
            datasets = registry.datasets.len(),
            publications = registry.publications.len(),
            "Registry opened"
        );
        Ok(registry)
    }

    /// Inserts every dataset whose id has not been seen. Returns the number inserted.
    pub fn register_dataset(&mut self, records: impl IntoIterator<Item = DatasetRecord>) -> usize {
        let mut inserted = 0;
        for record in records {
            if self.dataset_index.contains_key(&record.dataset_id) {
                continue;
            }
            self.dataset_index
                .insert(record.dataset_id.clone(), self.datasets.len());
            self.datasets.push(record);
            inserted += 1;
        }
        inserted
    }

    /// Sets the DOI of an existing dataset row whose DOI is still unset.
    ///
    /// Returns `true` when the row changed.
    pub fn attach_doi(&mut self, dataset_id: &str, doi: &str) -> bool {
        let Some(&row) = self.dataset_index.get(dataset_id) else {
            return false;
        };
        let dataset = &mut self.datasets[row];
        if dataset.doi.is_some() {
            return false;
        }
        dataset.doi = Some(doi.to_string());
        true
    }

    /// Filters `publications` down to DOIs not yet registered, keeping the
    /// sources of the surviving publications only.
    #[must_use]
    pub fn novel_publications(
        &self,
        publications: Vec<PublicationRecord>,
        sources: Vec<SourceRecord>,
    ) -> PublicationBatch {
        let mut seen_in_batch = HashSet::new();
        let publications: Vec<PublicationRecord> = publications
            .into_iter()
            .filter(|publication| {
                !self.publication_index.contains_key(&publication.doi)
                    && seen_in_batch.insert(publication.doi.clone())
            })
            .collect();

        let sources = sources
            .into_iter()
            .filter(|source| seen_in_batch.contains(&source.doi))
            .collect();

        PublicationBatch {
            publications,
            sources,
        }
    }

    /// Appends each novel publication together with its sources.
    ///
    /// Publications whose DOI was registered in the meantime are dropped
    /// along with their sources. Returns the number of publications inserted.
    pub fn register_publication(&mut self, batch: PublicationBatch) -> usize {
        let mut inserted_dois = HashSet::new();
        for publication in batch.publications {
            if self.publication_index.contains_key(&publication.doi) {
                continue;
            }
            inserted_dois.insert(publication.doi.clone());
            self.publication_index
                .insert(publication.doi.clone(), self.publications.len());
            self.publications.push(publication);
        }

        self.sources.extend(
            batch
                .sources
                .into_iter()
                .filter(|source| inserted_dois.contains(&source.doi)),
        );
        inserted_dois.len()
    }

    #[must_use]
    pub fn lookup_dataset(&self, dataset_id: &str) -> Option<&DatasetRecord> {
        self.dataset_index
            .get(dataset_id)
            .map(|&row| &self.datasets[row])
    }

    #[must_use]
    pub fn lookup_publication(&self, doi: &str) -> Option<&PublicationRecord> {
        self.publication_index
            .get(doi)
            .map(|&row| &self.publications[row])
    }

    /// Finds a publication by its external id (PMID).
    #[must_use]
    pub fn lookup_publication_by_external_id(&self, external_id: &str) -> Option<&PublicationRecord> {
        self.publications
            .iter()
            .find(|publication| publication.external_id == external_id)
    }

    /// Sources for `doi` in registration order.
    #[must_use]
    pub fn lookup_sources(&self, doi: &str) -> Vec<&SourceRecord> {
        self.sources.iter().filter(|source| source.doi == doi).collect()
    }

    /// Finds the dataset linked to `doi`.
    #[must_use]
    pub fn lookup_dataset_by_doi(&self, doi: &str) -> Option<&DatasetRecord> {
        self.datasets
            .iter()
            .find(|dataset| dataset.doi.as_deref() == Some(doi))
    }

    #[must_use]
    pub fn datasets(&self) -> &[DatasetRecord] {
        &self.datasets
    }

    #[must_use]
    pub fn publications(&self) -> &[PublicationRecord] {
        &self.publications
    }

    #[must_use]
    pub fn sources(&self) -> &[SourceRecord] {
        &self.sources
    }

    /// Flushes all three tables to the store as a wholesale overwrite.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the store write fails. In-memory state is
    /// unchanged either way.
    #[instrument(skip(self))]
    pub async fn commit(&self) -> Result<()> {
        let snapshot = RegistrySnapshot {
            datasets: self.datasets.clone(),
            publications: self.publications.clone(),
            sources: self.sources.clone(),
        };
        self.store.save(&snapshot).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn memory_registry() -> (Registry, SqliteRegistryStore) {
        let store = SqliteRegistryStore::new(Database::new_in_memory().await.unwrap());
        let registry = Registry::open(Box::new(store.clone())).await.unwrap();
        (registry, store)
    }

    fn publication(doi: &str, external_id: &str) -> PublicationRecord {
        PublicationRecord::new(doi, external_id, true, "Title", "Abstract")
    }

    fn assert_indices_consistent(registry: &Registry) {
        let dataset_keys: HashSet<_> = registry.datasets.iter().map(|d| &d.dataset_id).collect();
        assert_eq!(dataset_keys.len(), registry.datasets.len());
        assert_eq!(registry.dataset_index.len(), registry.datasets.len());

        let publication_keys: HashSet<_> = registry.publications.iter().map(|p| &p.doi).collect();
        assert_eq!(publication_keys.len(), registry.publications.len());
        assert_eq!(registry.publication_index.len(), registry.publications.len());
    }

    #[tokio::test]
    async fn test_register_dataset_is_idempotent() {
        let (mut registry, _) = memory_registry().await;
        let record = DatasetRecord::linked("200011474", "10.1/x");

        assert_eq!(registry.register_dataset(vec![record.clone()]), 1);
        assert_eq!(registry.register_dataset(vec![record.clone()]), 0);
        assert_eq!(registry.datasets(), &[record]);
    }

    #[tokio::test]
    async fn test_register_dataset_drops_duplicates_within_batch() {
        let (mut registry, _) = memory_registry().await;
        let inserted = registry.register_dataset(vec![
            DatasetRecord::linked("1", "10.1/a"),
            DatasetRecord::linked("1", "10.1/b"),
        ]);
        assert_eq!(inserted, 1);
        assert_eq!(
            registry.lookup_dataset("1").unwrap().doi.as_deref(),
            Some("10.1/a")
        );
    }

    #[tokio::test]
    async fn test_register_publication_is_idempotent_and_keeps_first_write() {
        let (mut registry, _) = memory_registry().await;
        let first = PublicationBatch {
            publications: vec![publication("10.1/x", "1")],
            sources: vec![SourceRecord::new("10.1/x", "a.org", "/a")],
        };
        assert_eq!(registry.register_publication(first), 1);

        let second = PublicationBatch {
            publications: vec![publication("10.1/x", "2")],
            sources: vec![SourceRecord::new("10.1/x", "b.org", "/b")],
        };
        assert_eq!(registry.register_publication(second), 0);

        assert_eq!(registry.lookup_publication("10.1/x").unwrap().external_id, "1");
        assert_eq!(registry.lookup_sources("10.1/x").len(), 1);
    }

    #[tokio::test]
    async fn test_novel_publications_filters_seen_dois_with_their_sources() {
        let (mut registry, _) = memory_registry().await;
        registry.register_publication(PublicationBatch {
            publications: vec![publication("10.1/old", "1")],
            sources: Vec::new(),
        });

        let batch = registry.novel_publications(
            vec![
                publication("10.1/old", "1"),
                publication("10.1/new", "2"),
                publication("10.1/new", "3"),
            ],
            vec![
                SourceRecord::new("10.1/old", "a.org", "/old"),
                SourceRecord::new("10.1/new", "b.org", "/new"),
            ],
        );

        assert_eq!(batch.publications.len(), 1);
        assert_eq!(batch.publications[0].external_id, "2");
        assert_eq!(batch.sources, vec![SourceRecord::new("10.1/new", "b.org", "/new")]);
    }

    #[tokio::test]
    async fn test_attach_doi_only_fills_unset_doi() {
        let (mut registry, _) = memory_registry().await;
        registry.register_dataset(vec![DatasetRecord {
            dataset_id: "7".to_string(),
            doi: None,
        }]);

        assert!(!registry.attach_doi("missing", "10.1/x"));
        assert!(registry.attach_doi("7", "10.1/x"));
        assert!(!registry.attach_doi("7", "10.1/y"));
        assert_eq!(registry.lookup_dataset("7").unwrap().doi.as_deref(), Some("10.1/x"));
        assert_eq!(registry.lookup_dataset_by_doi("10.1/x").unwrap().dataset_id, "7");
    }

    #[tokio::test]
    async fn test_lookups_return_none_for_absent_keys() {
        let (registry, _) = memory_registry().await;
        assert!(registry.lookup_dataset("1").is_none());
        assert!(registry.lookup_publication("10.1/x").is_none());
        assert!(registry.lookup_publication_by_external_id("1").is_none());
        assert!(registry.lookup_sources("10.1/x").is_empty());
        assert!(registry.lookup_dataset_by_doi("10.1/x").is_none());
    }

    #[tokio::test]
    async fn test_indices_stay_consistent_across_register_and_commit() {
        let (mut registry, store) = memory_registry().await;
        for round in 0..3 {
            registry.register_dataset(vec![
                DatasetRecord::linked("1", "10.1/a"),
                DatasetRecord::linked(format!("{round}00"), "10.1/b"),
            ]);
            let batch = registry.novel_publications(
                vec![publication("10.1/a", "1"), publication("10.1/b", "2")],
                vec![SourceRecord::new("10.1/a", "a.org", "/a")],
            );
            registry.register_publication(batch);
            registry.commit().await.unwrap();
            registry.commit().await.unwrap();
            assert_indices_consistent(&registry);
        }

        let reopened = Registry::open(Box::new(store)).await.unwrap();
        assert_indices_consistent(&reopened);
        assert_eq!(reopened.datasets().len(), 4);
        assert_eq!(reopened.publications().len(), 2);
        assert_eq!(reopened.sources().len(), 1);
    }
}
