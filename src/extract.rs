//! Full-text extraction from stored PDFs.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Errors raised while reading a stored PDF.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not a readable PDF.
    #[error("cannot extract text from {path}: {reason}\n  Suggestion: Delete the file so it is downloaded again")]
    Pdf {
        path: PathBuf,
        reason: String,
    },
}

impl ExtractError {
    fn pdf(path: &Path, reason: impl ToString) -> Self {
        Self::Pdf {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

/// Turns a stored document into plain text.
pub trait TextExtractor: Send + Sync {
    /// Text of every page of the document at `path`, in page order.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError`] when the file cannot be read or parsed.
    fn extract_text(&self, path: &Path) -> Result<String, ExtractError>;
}

/// [`TextExtractor`] backed by `pdf-extract`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let text = pdf_extract::extract_text_from_mem(&bytes).map_err(|e| ExtractError::pdf(path, e))?;
        if text.trim().is_empty() {
            // Scanned documents parse but carry no text layer.
            return Err(ExtractError::pdf(path, "document has no text layer"));
        }
        debug!(path = %path.display(), bytes = bytes.len(), chars = text.len(), "Extracted text");
        Ok(text)
    }
}
