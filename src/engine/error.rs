//! Errors surfaced by [`super::Engine`] operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::download::BrowserError;
use crate::extract::ExtractError;
use crate::fetcher::FetchError;
use crate::registry::RegistryError;
use crate::resolver::ResolveError;

/// Top-level engine failure.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The identifier is neither a DOI nor a numeric PMID.
    #[error(
        "'{identifier}' is not a publication identifier\n  Suggestion: Use a DOI such as 10.1093/hmg/ddt076 (or 10.1093_slashhmg_slashddt076) or a numeric PubMed id"
    )]
    InvalidIdentifier { identifier: String },

    /// Dataset ids are numeric GEO uids.
    #[error("'{dataset_id}' is not a dataset id\n  Suggestion: Use the numeric GEO DataSets uid, e.g. 200011474")]
    InvalidDatasetId { dataset_id: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// The working directory layout could not be created.
    #[error("cannot prepare {path}: {source}\n  Suggestion: Check that the working directory is writable")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    pub(crate) fn invalid_identifier(identifier: &str) -> Self {
        Self::InvalidIdentifier {
            identifier: identifier.to_string(),
        }
    }

    pub(crate) fn invalid_dataset_id(dataset_id: &str) -> Self {
        Self::InvalidDatasetId {
            dataset_id: dataset_id.to_string(),
        }
    }

    /// True when the registry database is held by another connection.
    #[must_use]
    pub fn is_registry_busy(&self) -> bool {
        matches!(self, Self::Registry(e) if e.is_busy_or_locked())
    }
}
