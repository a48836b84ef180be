//! Browsing session seam used by the download orchestrator.
//!
//! - [`BrowserSession`] - Async trait over a single shared browsing session
//! - [`HttpBrowser`] - Cookie-carrying reqwest session that saves PDF responses
//!   into the download directory the way a browser download would

mod http;

pub use http::HttpBrowser;

use async_trait::async_trait;
use thiserror::Error;

use crate::http_client::ClientBuildError;

/// Errors raised by a browsing session.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// The session can no longer be driven.
    #[error("browser session lost: {reason}\n  Suggestion: Restart the run")]
    SessionLost {
        /// What happened to the session.
        reason: String,
    },

    /// A page could not be loaded.
    #[error("failed to open {url}: {reason}")]
    Navigation {
        /// The page address.
        url: String,
        /// Why loading failed.
        reason: String,
    },

    /// No element on the current page matches.
    #[error("no element matching '{selector}' on {url}")]
    ElementNotFound {
        /// CSS selector that matched nothing.
        selector: String,
        /// Page that was searched.
        url: String,
    },

    /// The current page has no PDF link.
    #[error("no PDF link on {url}")]
    NoPdfLink {
        /// Page that was searched.
        url: String,
    },

    /// The action is not possible in the current state.
    #[error("cannot {action}: {reason}")]
    Unsupported {
        /// The requested action.
        action: &'static str,
        /// Why it cannot be done.
        reason: String,
    },

    /// The session could not be created.
    #[error(transparent)]
    Client(#[from] ClientBuildError),
}

impl BrowserError {
    #[must_use]
    pub fn session_lost(reason: impl Into<String>) -> Self {
        Self::SessionLost {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn navigation(url: &str, reason: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn element_not_found(selector: &str, url: &str) -> Self {
        Self::ElementNotFound {
            selector: selector.to_string(),
            url: url.to_string(),
        }
    }

    #[must_use]
    pub fn unsupported(action: &'static str, reason: impl Into<String>) -> Self {
        Self::Unsupported {
            action,
            reason: reason.into(),
        }
    }

    /// True when the session cannot be used for further attempts.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SessionLost { .. } | Self::Client(_))
    }
}

/// A single browsing session reused across download attempts.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Loads `url`. Responses the browser would download land in the download directory.
    async fn open(&mut self, url: &str) -> Result<(), BrowserError>;

    /// Address of the current page after redirects.
    fn current_url(&self) -> Option<String>;

    /// Host of the current page.
    fn current_domain(&self) -> Option<String>;

    /// First `href` on the current page that points at a PDF.
    async fn find_pdf_link(&mut self) -> Result<String, BrowserError>;

    /// Clicks the first element matching `selector`.
    async fn click(&mut self, selector: &str) -> Result<(), BrowserError>;

    /// Resolved `href` of the first element matching `selector`.
    async fn element_href(&mut self, selector: &str) -> Result<String, BrowserError>;

    /// Saves the current page through the print/save action.
    async fn print_page(&mut self) -> Result<(), BrowserError>;
}
