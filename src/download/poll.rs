//! Completion detection for browser downloads.
//!
//! A download is complete when a new `.pdf` entry shows up in the download
//! directory relative to a snapshot taken before the attempt. In-progress
//! files (`.crdownload`) and other new entries are ignored.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

/// Default delay between directory listings.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default number of directory listings per attempt.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 10;

/// How long to wait for a download to land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep between two listings.
    pub interval: Duration,
    /// Number of listings before giving up.
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }
}

/// Result of waiting for a new PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A new PDF entry appeared.
    Found(PathBuf),
    /// The budget ran out after `ticks` listings.
    TimedOut {
        /// Listings performed.
        ticks: u32,
    },
}

/// The directory a browser saves downloads into.
#[async_trait]
pub trait DownloadListing: Send + Sync {
    /// The directory being listed.
    fn directory(&self) -> &Path;

    /// Current entries of the directory.
    async fn entries(&self) -> std::io::Result<HashSet<PathBuf>>;

    /// Moves an entry to a new path.
    async fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()>;
}

/// [`DownloadListing`] over a local directory.
#[derive(Debug, Clone)]
pub struct LocalDownloadDir {
    directory: PathBuf,
}

impl LocalDownloadDir {
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

#[async_trait]
impl DownloadListing for LocalDownloadDir {
    fn directory(&self) -> &Path {
        &self.directory
    }

    async fn entries(&self) -> std::io::Result<HashSet<PathBuf>> {
        let mut entries = HashSet::new();
        let mut dir = tokio::fs::read_dir(&self.directory).await?;
        while let Some(entry) = dir.next_entry().await? {
            entries.insert(entry.path());
        }
        Ok(entries)
    }

    async fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        tokio::fs::rename(from, to).await
    }
}

/// True for paths with a `.pdf` extension in any case.
#[must_use]
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// First new PDF in `entries` relative to `snapshot`, in path order.
#[must_use]
pub fn new_pdf(entries: &HashSet<PathBuf>, snapshot: &HashSet<PathBuf>) -> Option<PathBuf> {
    entries
        .difference(snapshot)
        .filter(|path| is_pdf(path))
        .min()
        .cloned()
}

/// Waits for a new PDF to appear in `listing`.
///
/// Lists the directory up to `policy.max_attempts` times with
/// `policy.interval` between listings. No sleep follows the last listing.
///
/// # Errors
///
/// Returns the I/O error of a failed listing.
pub async fn poll_for_new_pdf(
    listing: &dyn DownloadListing,
    snapshot: &HashSet<PathBuf>,
    policy: PollPolicy,
) -> std::io::Result<PollOutcome> {
    poll_counting(listing, snapshot, policy)
        .await
        .map(|(outcome, _)| outcome)
}

/// [`poll_for_new_pdf`] that also reports how many listings were made.
#[instrument(skip(listing, snapshot), fields(dir = %listing.directory().display()))]
pub(crate) async fn poll_counting(
    listing: &dyn DownloadListing,
    snapshot: &HashSet<PathBuf>,
    policy: PollPolicy,
) -> std::io::Result<(PollOutcome, u32)> {
    for tick in 1..=policy.max_attempts {
        let entries = listing.entries().await?;
        if let Some(path) = new_pdf(&entries, snapshot) {
            debug!(tick, path = %path.display(), "New PDF detected");
            return Ok((PollOutcome::Found(path), tick));
        }
        if tick < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }
    let ticks = policy.max_attempts;
    debug!(ticks, "No PDF appeared");
    Ok((PollOutcome::TimedOut { ticks }, ticks))
}
