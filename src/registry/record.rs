//! Registry record types and the download status tri-state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of the retrieval attempts for one publication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    /// No retrieval attempted (closed access or not yet tried).
    #[default]
    Unknown,
    /// At least one source produced a PDF.
    Success,
    /// Sources were attempted and none produced a PDF.
    Failure,
}

impl DownloadStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DownloadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            _ => Err(format!("invalid download status: {s}")),
        }
    }
}

/// A dataset and, once resolved, the DOI of the publication describing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
    /// Dataset uid (GEO `gds` identifier).
    pub dataset_id: String,
    /// DOI of the linked publication, unescaped.
    pub doi: Option<String>,
}

impl DatasetRecord {
    /// Creates a dataset record linked to `doi`.
    #[must_use]
    pub fn linked(dataset_id: impl Into<String>, doi: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            doi: Some(doi.into()),
        }
    }
}

/// A publication discovered through the detail fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationRecord {
    /// DOI, unescaped.
    pub doi: String,
    /// `PubMed` id.
    pub external_id: String,
    /// Whether free full text is advertised.
    pub is_open_access: bool,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub download_status: DownloadStatus,
}

impl PublicationRecord {
    /// Creates a publication with `Unknown` download status.
    #[must_use]
    pub fn new(
        doi: impl Into<String>,
        external_id: impl Into<String>,
        is_open_access: bool,
        title: impl Into<String>,
        abstract_text: impl Into<String>,
    ) -> Self {
        Self {
            doi: doi.into(),
            external_id: external_id.into(),
            is_open_access,
            title: title.into(),
            abstract_text: abstract_text.into(),
            download_status: DownloadStatus::Unknown,
        }
    }
}

/// One hosting location for a publication's full text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// DOI of the owning publication.
    pub doi: String,
    /// Host name of the mirror, e.g. `www.ncbi.nlm.nih.gov`.
    pub hosting_domain: String,
    /// Link as scraped; may be relative to the hosting domain.
    pub link: String,
}

impl SourceRecord {
    #[must_use]
    pub fn new(
        doi: impl Into<String>,
        hosting_domain: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        Self {
            doi: doi.into(),
            hosting_domain: hosting_domain.into(),
            link: link.into(),
        }
    }
}
