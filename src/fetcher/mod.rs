//! Detail fetching: publication metadata, dataset pages and contributor searches.
//!
//! # Architecture
//!
//! - [`DetailFetcher`] - Async trait the resolver and engine talk to
//! - [`QueryTemplate`] - The four NCBI page queries
//! - [`NcbiFetcher`] - HTTP + HTML scraping implementation for the NCBI web pages
//!
//! # Example
//!
//! ```no_run
//! use nspider_core::fetcher::{DetailFetcher, NcbiFetcher, QueryTemplate};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = NcbiFetcher::new()?;
//! let details = fetcher.fetch(QueryTemplate::ByExternalId, "23390130").await?;
//! for publication in &details.publications {
//!     println!("{} {}", publication.doi, publication.title);
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod ncbi;
mod query;

pub use error::FetchError;
pub use ncbi::NcbiFetcher;
pub use query::{DEFAULT_NCBI_BASE_URL, QueryTemplate};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::registry::{PublicationRecord, SourceRecord};
use crate::resolver::discover_candidates;

/// Publications and their hosting sources returned by one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedDetails {
    pub publications: Vec<PublicationRecord>,
    pub sources: Vec<SourceRecord>,
}

impl FetchedDetails {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.publications.is_empty()
    }
}

/// What the dataset's descriptive page says about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetProfile {
    /// Series accession (e.g. `GSE12345`) expected in the true paper's text.
    pub accession: String,
    pub title: String,
    /// "Public on" date, when the page carries one.
    pub released: Option<NaiveDate>,
    /// Contributor names in page order, duplicates removed.
    pub contributors: Vec<String>,
}

/// One row of a contributor search listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSummary {
    /// PMID of the listed publication.
    pub external_id: String,
    pub authors: Vec<String>,
    /// Year-month of publication, pinned to day 1.
    pub published: Option<NaiveDate>,
}

/// Source of publication and dataset metadata.
#[async_trait]
pub trait DetailFetcher: Send + Sync {
    /// Runs `template` with `param` and parses every publication reachable from the result.
    async fn fetch(&self, template: QueryTemplate, param: &str)
    -> Result<FetchedDetails, FetchError>;

    /// Reads the dataset's descriptive page. `None` when the dataset is unknown.
    async fn dataset_profile(&self, dataset_id: &str)
    -> Result<Option<DatasetProfile>, FetchError>;

    /// Lists publications authored by `name`, in listing order.
    async fn search_by_contributor(&self, name: &str)
    -> Result<Vec<CandidateSummary>, FetchError>;

    /// External ids of publications plausibly describing `dataset_id`, best first.
    ///
    /// Runs candidate discovery, author-set filtering and temporal ranking.
    async fn search_related_ids(&self, dataset_id: &str) -> Result<Vec<String>, FetchError> {
        let context = discover_candidates(self, dataset_id).await?;
        Ok(context
            .map(|context| {
                context
                    .candidates
                    .into_iter()
                    .map(|candidate| candidate.external_id)
                    .collect()
            })
            .unwrap_or_default())
    }
}
