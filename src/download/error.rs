//! Error types for PDF retrieval.
//!
//! Only failures that make further attempts pointless surface as
//! [`DownloadError`]. A single link failing is an [`AttemptFailure`] recorded
//! in the report.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use super::browser::BrowserError;

/// Fatal retrieval errors that abort the current operation.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The browsing session is gone.
    #[error("browser session lost while retrieving {link} for {doi}: {source}")]
    SessionLost {
        /// DOI being retrieved.
        doi: String,
        /// Link being attempted.
        link: String,
        #[source]
        source: BrowserError,
    },

    /// The download directory could not be listed.
    #[error(
        "cannot list download directory {path}: {source}\n  Suggestion: Check that the working directory exists and is writable"
    )]
    Directory {
        /// The directory being listed.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    /// Creates a `Directory` error.
    pub fn directory(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Directory {
            path: path.into(),
            source,
        }
    }
}

/// Why one link did not produce a stored PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    /// The publisher page could not be opened.
    Navigation(String),
    /// The domain strategy found no PDF address.
    Strategy(String),
    /// No new PDF appeared within the poll budget.
    TimedOut,
    /// A PDF appeared but could not be moved to its canonical name.
    Rename(String),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Navigation(reason) => write!(f, "navigation failed: {reason}"),
            Self::Strategy(reason) => write!(f, "no PDF address: {reason}"),
            Self::TimedOut => write!(f, "no PDF appeared before the poll limit"),
            Self::Rename(reason) => write!(f, "rename failed: {reason}"),
        }
    }
}
