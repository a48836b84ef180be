//! Dataset-to-publication resolution.
//!
//! A dataset with no known publication goes through these stages, each
//! short-circuiting on success:
//!
//! 1. Direct linkage: publications cross-referenced from the dataset record
//! 2. Candidate discovery: accession, title, release date and contributors
//! 3. Author-set filtering of the first contributor's publications
//! 4. Temporal ranking against the release date
//! 5. [`FullTextVerification`]: first candidate whose PDF quotes the accession
//! 6. [`LexicalSimilarity`]: best word overlap between dataset title and abstract
//!
//! Stages 2-4 are [`discover_candidates`]; stages 5 and 6 are the default
//! [`ResolutionStrategy`] list of a [`Resolver`].

mod authors;
mod error;
mod ranking;
mod similarity;
mod strategy;

pub use authors::is_their_publication;
pub use error::ResolveError;
pub use ranking::{days_between, rank_by_release};
pub use similarity::word_overlap_score;
pub use strategy::{
    FullTextVerification, LexicalSimilarity, PublicationSource, ResolutionStrategy,
    best_lexical_match,
};

use chrono::NaiveDate;
use tracing::{debug, info, instrument};

use crate::fetcher::{DetailFetcher, FetchError, QueryTemplate};

/// How a match was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMethod {
    /// The dataset record links the publication.
    DirectLink,
    /// The publication's full text quotes the dataset accession.
    FullText,
    /// Highest title/abstract word overlap.
    LexicalSimilarity,
}

impl MatchMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DirectLink => "direct_link",
            Self::FullText => "full_text",
            Self::LexicalSimilarity => "lexical_similarity",
        }
    }
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The publication chosen for a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct PublicationMatch {
    /// PMID of the matched publication.
    pub external_id: String,
    pub method: MatchMethod,
    /// Similarity score; only set by the lexical stage.
    pub confidence: Option<f64>,
}

/// Result of resolving one dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionOutcome {
    Matched(PublicationMatch),
    NotFound,
}

impl ResolutionOutcome {
    #[must_use]
    pub fn found(&self) -> bool {
        matches!(self, Self::Matched(_))
    }

    #[must_use]
    pub fn external_id(&self) -> Option<&str> {
        match self {
            Self::Matched(found) => Some(&found.external_id),
            Self::NotFound => None,
        }
    }

    #[must_use]
    pub fn confidence(&self) -> Option<f64> {
        match self {
            Self::Matched(found) => found.confidence,
            Self::NotFound => None,
        }
    }

    #[must_use]
    pub fn method(&self) -> Option<MatchMethod> {
        match self {
            Self::Matched(found) => Some(found.method),
            Self::NotFound => None,
        }
    }
}

/// A publication that passed author-set filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub external_id: String,
    pub authors: Vec<String>,
    pub published: Option<NaiveDate>,
    /// Distance from the dataset release, set by ranking.
    pub days_from_release: Option<i64>,
    /// Filled once the publication detail has been loaded.
    pub abstract_text: Option<String>,
}

impl Candidate {
    #[must_use]
    pub fn new(
        external_id: impl Into<String>,
        authors: Vec<String>,
        published: Option<NaiveDate>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            authors,
            published,
            days_from_release: None,
            abstract_text: None,
        }
    }
}

/// Everything the selection strategies know about one dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateContext {
    pub dataset_id: String,
    pub accession: String,
    pub dataset_title: String,
    pub released: Option<NaiveDate>,
    pub contributors: Vec<String>,
    /// Ranked best first.
    pub candidates: Vec<Candidate>,
}

/// Discovers, filters and ranks candidate publications for `dataset_id`.
///
/// Returns `None` when the dataset page is missing.
///
/// # Errors
///
/// Returns [`FetchError`] when a page cannot be fetched.
#[instrument(skip(fetcher))]
pub async fn discover_candidates<F>(
    fetcher: &F,
    dataset_id: &str,
) -> Result<Option<CandidateContext>, FetchError>
where
    F: DetailFetcher + ?Sized,
{
    let Some(profile) = fetcher.dataset_profile(dataset_id).await? else {
        return Ok(None);
    };

    let mut context = CandidateContext {
        dataset_id: dataset_id.to_string(),
        accession: profile.accession,
        dataset_title: profile.title,
        released: profile.released,
        contributors: profile.contributors,
        candidates: Vec::new(),
    };

    let Some(lead) = context.contributors.first() else {
        debug!("Dataset lists no contributors");
        return Ok(Some(context));
    };

    let listing = fetcher.search_by_contributor(lead).await?;
    let listed = listing.len();
    let passing: Vec<Candidate> = listing
        .into_iter()
        .filter(|summary| is_their_publication(&context.contributors, &summary.authors))
        .map(|summary| Candidate::new(summary.external_id, summary.authors, summary.published))
        .collect();

    context.candidates = rank_by_release(passing, context.released);
    debug!(
        listed,
        passing = context.candidates.len(),
        accession = %context.accession,
        "Discovered candidates"
    );
    Ok(Some(context))
}

/// Runs the resolution stages over a dataset.
pub struct Resolver {
    strategies: Vec<Box<dyn ResolutionStrategy>>,
}

impl Resolver {
    /// Creates a resolver with an explicit strategy list, run in order.
    #[must_use]
    pub fn with_strategies(strategies: Vec<Box<dyn ResolutionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Strategy names in run order.
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Resolves `dataset_id` to a publication.
    ///
    /// Directly linked publications are registered through `source`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when a collaborator fails. Finding nothing is
    /// [`ResolutionOutcome::NotFound`], not an error.
    #[instrument(skip(self, fetcher, source))]
    pub async fn resolve(
        &self,
        fetcher: &dyn DetailFetcher,
        source: &mut dyn PublicationSource,
        dataset_id: &str,
    ) -> Result<ResolutionOutcome, ResolveError> {
        let linked = fetcher
            .fetch(QueryTemplate::LinkedToDataset, dataset_id)
            .await?;
        if let Some(first) = linked.publications.first() {
            let external_id = first.external_id.clone();
            info!(external_id = %external_id, "Dataset links its publication directly");
            source.register(linked).await?;
            return Ok(ResolutionOutcome::Matched(PublicationMatch {
                external_id,
                method: MatchMethod::DirectLink,
                confidence: None,
            }));
        }

        let Some(mut context) = discover_candidates(fetcher, dataset_id).await? else {
            info!("Dataset page not found");
            return Ok(ResolutionOutcome::NotFound);
        };
        if context.candidates.is_empty() {
            info!("No candidate publications");
            return Ok(ResolutionOutcome::NotFound);
        }

        for strategy in &self.strategies {
            debug!(strategy = strategy.name(), "Trying strategy");
            if let Some(found) = strategy.select(&mut context, source).await? {
                info!(
                    strategy = strategy.name(),
                    external_id = %found.external_id,
                    confidence = ?found.confidence,
                    "Resolved dataset"
                );
                return Ok(ResolutionOutcome::Matched(found));
            }
        }

        Ok(ResolutionOutcome::NotFound)
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::with_strategies(vec![
            Box::new(FullTextVerification),
            Box::new(LexicalSimilarity),
        ])
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("strategies", &self.strategy_names())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::fetcher::{CandidateSummary, DatasetProfile, FetchedDetails};
    use crate::registry::PublicationRecord;

    #[derive(Default)]
    struct ScriptedFetcher {
        linked: FetchedDetails,
        profile: Option<DatasetProfile>,
        listing: Vec<CandidateSummary>,
        searched: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DetailFetcher for ScriptedFetcher {
        async fn fetch(
            &self,
            template: QueryTemplate,
            _param: &str,
        ) -> Result<FetchedDetails, FetchError> {
            Ok(match template {
                QueryTemplate::LinkedToDataset => self.linked.clone(),
                _ => FetchedDetails::default(),
            })
        }

        async fn dataset_profile(
            &self,
            _dataset_id: &str,
        ) -> Result<Option<DatasetProfile>, FetchError> {
            Ok(self.profile.clone())
        }

        async fn search_by_contributor(
            &self,
            name: &str,
        ) -> Result<Vec<CandidateSummary>, FetchError> {
            self.searched.lock().unwrap().push(name.to_string());
            Ok(self.listing.clone())
        }
    }

    #[derive(Default)]
    struct RecordingSource {
        registered: Vec<String>,
        abstracts: HashMap<String, String>,
    }

    #[async_trait]
    impl PublicationSource for RecordingSource {
        async fn register(&mut self, details: FetchedDetails) -> Result<(), ResolveError> {
            self.registered
                .extend(details.publications.into_iter().map(|p| p.doi));
            Ok(())
        }

        async fn ensure_publication(
            &mut self,
            external_id: &str,
        ) -> Result<Option<PublicationRecord>, ResolveError> {
            Ok(self.abstracts.get(external_id).map(|abstract_text| {
                PublicationRecord::new(
                    format!("10.1/{external_id}"),
                    external_id,
                    false,
                    "",
                    abstract_text.clone(),
                )
            }))
        }

        async fn full_text(&mut self, _external_id: &str) -> Result<Option<String>, ResolveError> {
            Ok(None)
        }
    }

    fn summary(external_id: &str, authors: &[&str], month: u32) -> CandidateSummary {
        CandidateSummary {
            external_id: external_id.to_string(),
            authors: authors.iter().map(ToString::to_string).collect(),
            published: NaiveDate::from_ymd_opt(2013, month, 1),
        }
    }

    fn profile() -> DatasetProfile {
        DatasetProfile {
            accession: "GSE40438".to_string(),
            title: "motor neuron atlas".to_string(),
            released: NaiveDate::from_ymd_opt(2013, 6, 1),
            contributors: vec!["Smith J".to_string(), "Lee A".to_string()],
        }
    }

    #[tokio::test]
    async fn test_direct_link_registers_all_and_matches_first() {
        let fetcher = ScriptedFetcher {
            linked: FetchedDetails {
                publications: vec![
                    PublicationRecord::new("10.1/a", "11", true, "", ""),
                    PublicationRecord::new("10.1/b", "22", true, "", ""),
                ],
                sources: Vec::new(),
            },
            ..ScriptedFetcher::default()
        };
        let mut source = RecordingSource::default();

        let outcome = Resolver::default()
            .resolve(&fetcher, &mut source, "200011474")
            .await
            .unwrap();

        assert!(outcome.found());
        assert_eq!(outcome.external_id(), Some("11"));
        assert_eq!(outcome.method(), Some(MatchMethod::DirectLink));
        assert_eq!(outcome.confidence(), None);
        assert_eq!(source.registered, vec!["10.1/a", "10.1/b"]);
    }

    #[tokio::test]
    async fn test_missing_dataset_page_is_not_found() {
        let outcome = Resolver::default()
            .resolve(&ScriptedFetcher::default(), &mut RecordingSource::default(), "1")
            .await
            .unwrap();
        assert_eq!(outcome, ResolutionOutcome::NotFound);
        assert!(!outcome.found());
        assert_eq!(outcome.external_id(), None);
    }

    #[tokio::test]
    async fn test_no_passing_candidates_is_not_found() {
        let fetcher = ScriptedFetcher {
            profile: Some(profile()),
            listing: vec![summary("1", &["Smith J"], 6)],
            ..ScriptedFetcher::default()
        };
        let outcome = Resolver::default()
            .resolve(&fetcher, &mut RecordingSource::default(), "1")
            .await
            .unwrap();
        assert_eq!(outcome, ResolutionOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_lexical_fallback_sets_confidence() {
        let fetcher = ScriptedFetcher {
            profile: Some(profile()),
            listing: vec![
                summary("near", &["Smith J", "Lee A"], 6),
                summary("far", &["Smith J", "Lee A", "Kim B"], 1),
            ],
            ..ScriptedFetcher::default()
        };
        let mut source = RecordingSource::default();
        source.abstracts.insert("near".to_string(), "unrelated".to_string());
        source
            .abstracts
            .insert("far".to_string(), "a motor neuron atlas".to_string());

        let outcome = Resolver::default()
            .resolve(&fetcher, &mut source, "1")
            .await
            .unwrap();

        assert_eq!(outcome.external_id(), Some("far"));
        assert_eq!(outcome.method(), Some(MatchMethod::LexicalSimilarity));
        assert!((outcome.confidence().unwrap() - 1.0).abs() < f64::EPSILON);
        assert_eq!(*fetcher.searched.lock().unwrap(), vec!["Smith J"]);
    }

    #[tokio::test]
    async fn test_search_related_ids_filters_and_ranks() {
        let fetcher = ScriptedFetcher {
            profile: Some(profile()),
            listing: vec![
                summary("far", &["Smith J", "Lee A"], 1),
                summary("other", &["Smith J"], 6),
                summary("near", &["Lee A", "Smith J", "Kim B"], 5),
            ],
            ..ScriptedFetcher::default()
        };

        let ids = fetcher.search_related_ids("200011474").await.unwrap();
        assert_eq!(ids, vec!["near", "far"]);
    }

    #[test]
    fn test_default_strategy_order() {
        assert_eq!(
            Resolver::default().strategy_names(),
            vec!["full_text", "lexical_similarity"]
        );
    }
}
