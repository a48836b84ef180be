//! Browser-driven PDF retrieval.
//!
//! # Overview
//!
//! - [`DownloadOrchestrator`] - Tries each publication's sources in fallback
//!   order and records the resulting [`crate::registry::DownloadStatus`]
//! - [`BrowserSession`] - The single browsing session reused across attempts
//! - [`DownloadListing`] and [`poll_for_new_pdf`] - Completion detection over
//!   the download directory
//! - [`strategy_for_domain`] - Per-publisher PDF address extraction
//!
//! Stored PDFs are named `<escaped-doi>.pdf` inside the download directory.

pub mod browser;
mod error;
mod filename;
mod orchestrator;
mod poll;
mod strategy;

pub use browser::{BrowserError, BrowserSession, HttpBrowser};
pub use error::{AttemptFailure, DownloadError};
pub use filename::PARTIAL_SUFFIX;
pub use orchestrator::{
    DEFAULT_CLICK_SETTLE, DEFAULT_PRIMARY_DOMAIN, DownloadOrchestrator, DownloadReport,
    DownloadSettings, LinkAttempt,
};
pub use poll::{
    DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL, DownloadListing, LocalDownloadDir, PollOutcome,
    PollPolicy, is_pdf, poll_for_new_pdf,
};
pub use strategy::{LinkStrategy, strategy_for_domain};
