//! Fallback-ordered PDF retrieval for a batch of publications.
//!
//! Primary-domain links are attempted one by one and every outcome is kept.
//! Links on other domains form one fallback chain per DOI that stops at the
//! first success and is skipped entirely when the DOI already has a PDF.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::identifier::pdf_file_name;
use crate::registry::{DownloadStatus, PublicationBatch, SourceRecord};
use crate::utils::absolutize_url;

use super::browser::{BrowserError, BrowserSession};
use super::error::{AttemptFailure, DownloadError};
use super::poll::{DownloadListing, PollOutcome, PollPolicy, new_pdf, poll_counting};
use super::strategy::strategy_for_domain;

/// Default primary (most trusted) hosting domain.
pub const DEFAULT_PRIMARY_DOMAIN: &str = "www.ncbi.nlm.nih.gov";

/// Default wait after each click of a click-through strategy.
pub const DEFAULT_CLICK_SETTLE: Duration = Duration::from_secs(5);

/// Tunables for [`DownloadOrchestrator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    /// Links on this host are attempted individually.
    pub primary_domain: String,
    /// Completion detection budget per attempt.
    pub poll: PollPolicy,
    /// Wait after each UI click.
    pub click_settle: Duration,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            primary_domain: DEFAULT_PRIMARY_DOMAIN.to_string(),
            poll: PollPolicy::default(),
            click_settle: DEFAULT_CLICK_SETTLE,
        }
    }
}

/// Outcome of one link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkAttempt {
    pub doi: String,
    pub link: String,
    pub succeeded: bool,
    /// Directory listings made while waiting.
    pub ticks: u32,
    pub failure: Option<AttemptFailure>,
    /// Canonical path of the stored PDF.
    pub stored: Option<PathBuf>,
}

impl LinkAttempt {
    fn started(source: &SourceRecord) -> Self {
        Self {
            doi: source.doi.clone(),
            link: source.link.clone(),
            succeeded: false,
            ticks: 0,
            failure: None,
            stored: None,
        }
    }

    fn failed(mut self, failure: AttemptFailure) -> Self {
        self.failure = Some(failure);
        self
    }
}

/// Everything [`DownloadOrchestrator::retrieve`] did for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    /// Attempts in execution order.
    pub attempts: Vec<LinkAttempt>,
    /// Links that were never attempted.
    pub skipped: Vec<SourceRecord>,
}

impl DownloadReport {
    /// Number of successful attempts.
    #[must_use]
    pub fn successes(&self) -> usize {
        self.attempts.iter().filter(|attempt| attempt.succeeded).count()
    }
}

/// Drives one browsing session over a download directory.
pub struct DownloadOrchestrator {
    browser: Box<dyn BrowserSession>,
    listing: Box<dyn DownloadListing>,
    settings: DownloadSettings,
}

impl std::fmt::Debug for DownloadOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadOrchestrator")
            .field("directory", &self.listing.directory())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl DownloadOrchestrator {
    #[must_use]
    pub fn new(
        browser: Box<dyn BrowserSession>,
        listing: Box<dyn DownloadListing>,
        settings: DownloadSettings,
    ) -> Self {
        Self {
            browser,
            listing,
            settings,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &DownloadSettings {
        &self.settings
    }

    /// Canonical stored path for `doi`.
    #[must_use]
    pub fn stored_path(&self, doi: &str) -> PathBuf {
        self.listing.directory().join(pdf_file_name(doi))
    }

    /// Retrieves PDFs for the open-access publications in `batch` and writes
    /// the resulting download status back into each attempted record.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::SessionLost`] when the browser is gone and
    /// [`DownloadError::Directory`] when the download directory cannot be
    /// listed. Individual link failures are recorded in the report instead.
    #[instrument(skip(self, batch), fields(publications = batch.publications.len(), sources = batch.sources.len()))]
    pub async fn retrieve(&mut self, batch: &mut PublicationBatch) -> Result<DownloadReport, DownloadError> {
        let open_access: HashSet<&str> = batch
            .publications
            .iter()
            .filter(|publication| publication.is_open_access)
            .map(|publication| publication.doi.as_str())
            .collect();

        let mut report = DownloadReport::default();
        let mut primary = Vec::new();
        let mut chains: Vec<(&str, Vec<&SourceRecord>)> = Vec::new();
        for source in &batch.sources {
            if !open_access.contains(source.doi.as_str()) {
                report.skipped.push(source.clone());
            } else if source.hosting_domain.eq_ignore_ascii_case(&self.settings.primary_domain) {
                primary.push(source);
            } else if let Some((_, links)) = chains.iter_mut().find(|(doi, _)| *doi == source.doi) {
                links.push(source);
            } else {
                chains.push((source.doi.as_str(), vec![source]));
            }
        }

        let mut attempted: HashSet<String> = HashSet::new();
        let mut succeeded: HashSet<String> = HashSet::new();

        for source in primary {
            let attempt = self.attempt(source).await?;
            attempted.insert(attempt.doi.clone());
            if attempt.succeeded {
                succeeded.insert(attempt.doi.clone());
            }
            report.attempts.push(attempt);
        }

        for (doi, links) in chains {
            if succeeded.contains(doi) {
                debug!(doi, skipped = links.len(), "Already retrieved, skipping fallbacks");
                report.skipped.extend(links.into_iter().cloned());
                continue;
            }
            let mut remaining = links.into_iter();
            for source in remaining.by_ref() {
                let attempt = self.attempt(source).await?;
                attempted.insert(attempt.doi.clone());
                let done = attempt.succeeded;
                report.attempts.push(attempt);
                if done {
                    succeeded.insert(doi.to_string());
                    break;
                }
            }
            report.skipped.extend(remaining.cloned());
        }

        for publication in &mut batch.publications {
            if succeeded.contains(&publication.doi) {
                publication.download_status = DownloadStatus::Success;
            } else if attempted.contains(&publication.doi) {
                publication.download_status = DownloadStatus::Failure;
            }
        }

        info!(
            attempts = report.attempts.len(),
            successes = report.successes(),
            skipped = report.skipped.len(),
            "Retrieval finished"
        );
        Ok(report)
    }

    #[instrument(skip(self, source), fields(doi = %source.doi, link = %source.link))]
    async fn attempt(&mut self, source: &SourceRecord) -> Result<LinkAttempt, DownloadError> {
        let attempt = LinkAttempt::started(source);
        let snapshot = self.entries().await?;

        if let Err(failure) = self.navigate(source, &snapshot).await? {
            warn!(%failure, "Attempt failed");
            return Ok(attempt.failed(failure));
        }

        let (outcome, ticks) = poll_counting(self.listing.as_ref(), &snapshot, self.settings.poll)
            .await
            .map_err(|e| DownloadError::directory(self.listing.directory(), e))?;
        let attempt = LinkAttempt { ticks, ..attempt };

        let found = match outcome {
            PollOutcome::Found(path) => path,
            PollOutcome::TimedOut { ticks } => {
                warn!(ticks, "No PDF appeared");
                return Ok(attempt.failed(AttemptFailure::TimedOut));
            }
        };

        let target = self.stored_path(&source.doi);
        if let Err(e) = self.listing.rename(&found, &target).await {
            warn!(from = %found.display(), error = %e, "Could not store PDF");
            return Ok(attempt.failed(AttemptFailure::Rename(e.to_string())));
        }

        info!(path = %target.display(), "Stored PDF");
        Ok(LinkAttempt {
            succeeded: true,
            stored: Some(target),
            ..attempt
        })
    }

    /// Opens the link and gets the browser to download the PDF.
    ///
    /// The outer `Result` carries fatal errors, the inner one attempt failures.
    async fn navigate(
        &mut self,
        source: &SourceRecord,
        snapshot: &HashSet<PathBuf>,
    ) -> Result<Result<(), AttemptFailure>, DownloadError> {
        let link = link_address(source);
        if let Err(e) = self.browser.open(&link).await {
            return Ok(Err(AttemptFailure::Navigation(escalate(source, e)?)));
        }

        let entries = self.entries().await?;
        if new_pdf(&entries, snapshot).is_some() {
            debug!("Link downloaded a PDF directly");
            return Ok(Ok(()));
        }

        let domain = self
            .browser
            .current_domain()
            .unwrap_or_else(|| source.hosting_domain.to_ascii_lowercase());
        let strategy = strategy_for_domain(&domain);
        debug!(domain = %domain, ?strategy, "Locating PDF address");

        let address = match strategy
            .locate(self.browser.as_mut(), self.settings.click_settle)
            .await
        {
            Ok(address) => address,
            Err(e) => {
                let reason = escalate(source, e)?;
                // A click may itself have started the download.
                if new_pdf(&self.entries().await?, snapshot).is_some() {
                    debug!(%reason, "Click downloaded a PDF before the address was read");
                    return Ok(Ok(()));
                }
                return Ok(Err(AttemptFailure::Strategy(reason)));
            }
        };
        let address = self
            .browser
            .current_url()
            .and_then(|current| Url::parse(&current).ok())
            .and_then(|base| absolutize_url(&address, &base))
            .unwrap_or(address);

        if let Err(e) = self.browser.open(&address).await {
            return Ok(Err(AttemptFailure::Navigation(escalate(source, e)?)));
        }

        let entries = self.entries().await?;
        if entries.is_subset(snapshot) {
            debug!(address = %address, "No download started, trying print fallback");
            if let Err(e) = self.browser.print_page().await {
                let reason = escalate(source, e)?;
                debug!(%reason, "Print fallback unavailable");
            }
        }
        Ok(Ok(()))
    }

    async fn entries(&self) -> Result<HashSet<PathBuf>, DownloadError> {
        self.listing
            .entries()
            .await
            .map_err(|e| DownloadError::directory(self.listing.directory(), e))
    }
}

fn link_address(source: &SourceRecord) -> String {
    if Url::parse(&source.link).is_ok() {
        return source.link.clone();
    }
    Url::parse(&format!("https://{}/", source.hosting_domain))
        .ok()
        .and_then(|base| absolutize_url(&source.link, &base))
        .unwrap_or_else(|| source.link.clone())
}

/// Turns fatal browser errors into [`DownloadError::SessionLost`]; passes
/// through the message of everything else.
fn escalate(source: &SourceRecord, error: BrowserError) -> Result<String, DownloadError> {
    if error.is_fatal() {
        return Err(DownloadError::SessionLost {
            doi: source.doi.clone(),
            link: source.link.clone(),
            source: error,
        });
    }
    Ok(error.to_string())
}
