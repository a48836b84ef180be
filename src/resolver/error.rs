//! Error types for dataset resolution.

use thiserror::Error;

use crate::download::DownloadError;
use crate::extract::ExtractError;
use crate::fetcher::FetchError;

/// Collaborator failures that abort a resolution.
///
/// Finding nothing is not an error; see [`super::ResolutionOutcome::NotFound`].
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The detail fetcher failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Retrieving a candidate's PDF failed fatally.
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// A stored PDF could not be read.
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

impl ResolveError {
    /// True for failures local to one candidate's stored file.
    #[must_use]
    pub fn is_candidate_local(&self) -> bool {
        matches!(self, Self::Extract(_))
    }
}
