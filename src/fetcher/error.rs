//! Error types for detail fetching.

use thiserror::Error;

use crate::http_client::ClientBuildError;

/// Errors that can occur while fetching NCBI pages.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP client could not be built.
    #[error(transparent)]
    Client(#[from] ClientBuildError),

    /// The configured base URL is unusable.
    #[error("invalid fetcher base URL '{url}': {reason}\n  Suggestion: Use an absolute http(s) URL")]
    InvalidBaseUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The request did not complete.
    #[error(
        "request to {url} failed: {source}\n  Suggestion: Check network connectivity and retry"
    )]
    Request {
        /// The requested URL.
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("{url} returned HTTP {status}\n  Suggestion: {suggestion}")]
    HttpStatus {
        /// The requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// How to fix the issue.
        suggestion: &'static str,
    },
}

impl FetchError {
    /// Creates a `Request` error.
    #[must_use]
    pub fn request(url: &str, source: reqwest::Error) -> Self {
        Self::Request {
            url: url.to_string(),
            source,
        }
    }

    /// Creates an `HttpStatus` error with a status-specific suggestion.
    #[must_use]
    pub fn http_status(url: &str, status: u16) -> Self {
        let suggestion = match status {
            429 => "NCBI is rate limiting; wait a minute before retrying",
            500..=599 => "NCBI is having trouble; retry later",
            _ => "Check the identifier and retry",
        };
        Self::HttpStatus {
            url: url.to_string(),
            status,
            suggestion,
        }
    }

    /// Creates an `InvalidBaseUrl` error.
    #[must_use]
    pub fn invalid_base_url(url: &str, reason: impl Into<String>) -> Self {
        Self::InvalidBaseUrl {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}
