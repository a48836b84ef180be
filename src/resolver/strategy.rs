//! Candidate selection strategies, run in order after candidate discovery.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::fetcher::FetchedDetails;
use crate::registry::PublicationRecord;

use super::similarity::word_overlap_score;
use super::{CandidateContext, MatchMethod, PublicationMatch, ResolveError};

/// Access to registered publications and their stored full text.
///
/// Implemented by the engine so strategies can register candidates (which
/// downloads open-access PDFs) without owning the registry.
#[async_trait]
pub trait PublicationSource: Send {
    /// Registers publications discovered by a query, downloading novel open-access ones.
    async fn register(&mut self, details: FetchedDetails) -> Result<(), ResolveError>;

    /// Returns the publication with `external_id`, fetching and registering it when unknown.
    async fn ensure_publication(
        &mut self,
        external_id: &str,
    ) -> Result<Option<PublicationRecord>, ResolveError>;

    /// Extracted text of the stored PDF, when the publication was downloaded.
    async fn full_text(&mut self, external_id: &str) -> Result<Option<String>, ResolveError>;
}

/// One stage of candidate selection.
#[async_trait]
pub trait ResolutionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Picks a match from the ranked candidates, or `None` to defer to the next stage.
    async fn select(
        &self,
        context: &mut CandidateContext,
        source: &mut dyn PublicationSource,
    ) -> Result<Option<PublicationMatch>, ResolveError>;
}

/// Accepts the first ranked candidate whose full text quotes the accession.
#[derive(Debug, Default, Clone, Copy)]
pub struct FullTextVerification;

#[async_trait]
impl ResolutionStrategy for FullTextVerification {
    fn name(&self) -> &'static str {
        "full_text"
    }

    async fn select(
        &self,
        context: &mut CandidateContext,
        source: &mut dyn PublicationSource,
    ) -> Result<Option<PublicationMatch>, ResolveError> {
        let accession = context.accession.trim().to_string();

        for candidate in &mut context.candidates {
            let Some(record) = source.ensure_publication(&candidate.external_id).await? else {
                debug!(external_id = %candidate.external_id, "Candidate has no publication detail");
                continue;
            };
            candidate.abstract_text = Some(record.abstract_text);

            if accession.is_empty() {
                continue;
            }

            let text = match source.full_text(&candidate.external_id).await {
                Ok(text) => text,
                Err(error) if error.is_candidate_local() => {
                    warn!(
                        external_id = %candidate.external_id,
                        error = %error,
                        "Stored PDF unreadable; skipping verification"
                    );
                    continue;
                }
                Err(error) => return Err(error),
            };

            if text.is_some_and(|text| text.contains(&accession)) {
                info!(
                    external_id = %candidate.external_id,
                    accession = %accession,
                    "Full text quotes the dataset accession"
                );
                return Ok(Some(PublicationMatch {
                    external_id: candidate.external_id.clone(),
                    method: MatchMethod::FullText,
                    confidence: None,
                }));
            }
        }

        Ok(None)
    }
}

/// Scores every candidate by word overlap between the dataset title and its abstract.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalSimilarity;

/// Highest-scoring candidate; the first one wins a tie. No candidate
/// matches when even the best shares no word with the dataset title.
#[must_use]
pub fn best_lexical_match(context: &CandidateContext) -> Option<PublicationMatch> {
    let mut best: Option<(&str, f64)> = None;
    for candidate in &context.candidates {
        let score = word_overlap_score(
            &context.dataset_title,
            candidate.abstract_text.as_deref().unwrap_or_default(),
        );
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((candidate.external_id.as_str(), score));
        }
    }

    best.filter(|(_, score)| *score > 0.0)
        .map(|(external_id, score)| PublicationMatch {
            external_id: external_id.to_string(),
            method: MatchMethod::LexicalSimilarity,
            confidence: Some(score),
        })
}

#[async_trait]
impl ResolutionStrategy for LexicalSimilarity {
    fn name(&self) -> &'static str {
        "lexical_similarity"
    }

    async fn select(
        &self,
        context: &mut CandidateContext,
        _source: &mut dyn PublicationSource,
    ) -> Result<Option<PublicationMatch>, ResolveError> {
        Ok(best_lexical_match(context))
    }
}
