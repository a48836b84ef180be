//! NCBI query templates.

use std::fmt;

/// Default NCBI web root.
pub const DEFAULT_NCBI_BASE_URL: &str = "https://www.ncbi.nlm.nih.gov";

/// The page queries the fetcher knows how to issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryTemplate {
    /// A single `PubMed` abstract by PMID.
    ByExternalId,
    /// Publications cross-referenced from a dataset.
    LinkedToDataset,
    /// Publications authored by a contributor.
    ByContributor,
    /// The dataset's descriptive listing.
    DatasetPage,
}

impl QueryTemplate {
    /// Path template with a single `%s` placeholder.
    #[must_use]
    pub fn pattern(self) -> &'static str {
        match self {
            Self::ByExternalId => "/pubmed/%s",
            Self::LinkedToDataset => "/pubmed?LinkName=gds_pubmed&from_uid=%s",
            Self::ByContributor => "/pubmed/?term=%s[Author]",
            Self::DatasetPage => "/gds/?term=%s[uid]",
        }
    }

    /// Substitutes the percent-encoded `param` into the template.
    #[must_use]
    pub fn render(self, param: &str) -> String {
        self.pattern()
            .replace("%s", &urlencoding::encode(param.trim()))
    }
}

impl fmt::Display for QueryTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ByExternalId => "by_external_id",
            Self::LinkedToDataset => "linked_to_dataset",
            Self::ByContributor => "by_contributor",
            Self::DatasetPage => "dataset_page",
        };
        write!(f, "{label}")
    }
}
