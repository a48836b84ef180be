//! Scripted collaborators for engine-level tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nspider_core::download::{BrowserError, BrowserSession, LocalDownloadDir, PollPolicy};
use nspider_core::fetcher::{CandidateSummary, DatasetProfile};
use nspider_core::registry::SqliteRegistryStore;
use nspider_core::{
    Collaborators, Database, DetailFetcher, Engine, EngineConfig, ExtractError, FetchError,
    FetchedDetails, QueryTemplate, TextExtractor,
};

pub type Calls = Arc<Mutex<Vec<String>>>;

/// Fetcher answering from fixed tables and recording every call.
#[derive(Default)]
pub struct StubFetcher {
    pub responses: HashMap<(QueryTemplate, String), FetchedDetails>,
    pub profiles: HashMap<String, DatasetProfile>,
    pub listings: HashMap<String, Vec<CandidateSummary>>,
    pub calls: Calls,
}

impl StubFetcher {
    pub fn respond(mut self, template: QueryTemplate, param: &str, details: FetchedDetails) -> Self {
        self.responses.insert((template, param.to_string()), details);
        self
    }

    pub fn profile(mut self, dataset_id: &str, profile: DatasetProfile) -> Self {
        self.profiles.insert(dataset_id.to_string(), profile);
        self
    }

    pub fn listing(mut self, name: &str, listing: Vec<CandidateSummary>) -> Self {
        self.listings.insert(name.to_string(), listing);
        self
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl DetailFetcher for StubFetcher {
    async fn fetch(&self, template: QueryTemplate, param: &str) -> Result<FetchedDetails, FetchError> {
        self.record(format!("fetch {template} {param}"));
        Ok(self
            .responses
            .get(&(template, param.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn dataset_profile(&self, dataset_id: &str) -> Result<Option<DatasetProfile>, FetchError> {
        self.record(format!("profile {dataset_id}"));
        Ok(self.profiles.get(dataset_id).cloned())
    }

    async fn search_by_contributor(&self, name: &str) -> Result<Vec<CandidateSummary>, FetchError> {
        self.record(format!("contributor {name}"));
        Ok(self.listings.get(name).cloned().unwrap_or_default())
    }
}

/// Browser whose links either land a file in the download directory or
/// show a page with a PDF link.
pub struct StubBrowser {
    download_dir: PathBuf,
    downloads: HashMap<String, Vec<u8>>,
    pages: HashMap<String, String>,
    current: Option<String>,
    pub opened: Calls,
}

impl StubBrowser {
    pub fn new(download_dir: &Path) -> Self {
        Self {
            download_dir: download_dir.to_path_buf(),
            downloads: HashMap::new(),
            pages: HashMap::new(),
            current: None,
            opened: Calls::default(),
        }
    }

    /// Opening `url` saves `body` under the URL's last path segment.
    pub fn download(mut self, url: &str, body: &[u8]) -> Self {
        self.downloads.insert(url.to_string(), body.to_vec());
        self
    }

    /// Opening `url` shows a page whose PDF link is `pdf_href`.
    pub fn page(mut self, url: &str, pdf_href: &str) -> Self {
        self.pages.insert(url.to_string(), pdf_href.to_string());
        self
    }
}

#[async_trait]
impl BrowserSession for StubBrowser {
    async fn open(&mut self, url: &str) -> Result<(), BrowserError> {
        self.opened.lock().unwrap().push(url.to_string());
        if let Some(body) = self.downloads.get(url) {
            let name = url.rsplit('/').next().unwrap_or("download.pdf");
            std::fs::write(self.download_dir.join(name), body)
                .map_err(|e| BrowserError::navigation(url, e.to_string()))?;
        } else if !self.pages.contains_key(url) {
            return Err(BrowserError::navigation(url, "HTTP 404"));
        }
        self.current = Some(url.to_string());
        Ok(())
    }

    fn current_url(&self) -> Option<String> {
        self.current.clone()
    }

    fn current_domain(&self) -> Option<String> {
        self.current
            .as_deref()
            .and_then(|url| url::Url::parse(url).ok())
            .and_then(|url| url.host_str().map(str::to_string))
    }

    async fn find_pdf_link(&mut self) -> Result<String, BrowserError> {
        let url = self.current.clone().unwrap_or_default();
        self.pages
            .get(&url)
            .cloned()
            .ok_or(BrowserError::NoPdfLink { url })
    }

    async fn click(&mut self, selector: &str) -> Result<(), BrowserError> {
        Err(BrowserError::element_not_found(selector, "stub"))
    }

    async fn element_href(&mut self, selector: &str) -> Result<String, BrowserError> {
        Err(BrowserError::element_not_found(selector, "stub"))
    }

    async fn print_page(&mut self) -> Result<(), BrowserError> {
        Err(BrowserError::unsupported("print page", "stub"))
    }
}

/// Treats stored files as UTF-8 text.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, ExtractError> {
        std::fs::read(path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .map_err(|source| ExtractError::Io {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// Config with an instant poll and no click delay.
pub fn fast_config(working_dir: &Path) -> EngineConfig {
    let mut config = EngineConfig::new(working_dir);
    config.poll = PollPolicy {
        interval: Duration::ZERO,
        max_attempts: 2,
    };
    config.click_settle = Duration::ZERO;
    config
}

/// Engine over the on-disk registry in `working_dir` with stub network collaborators.
pub async fn open_engine(working_dir: &Path, fetcher: StubFetcher, browser: StubBrowser) -> Engine {
    let config = fast_config(working_dir);
    std::fs::create_dir_all(config.download_dir()).unwrap();
    let db = Database::new(&config.database_path()).await.unwrap();
    let collaborators = Collaborators {
        store: Box::new(SqliteRegistryStore::new(db)),
        fetcher: Box::new(fetcher),
        browser: Box::new(browser),
        listing: Box::new(LocalDownloadDir::new(config.download_dir())),
        extractor: Box::new(PlainTextExtractor),
    };
    Engine::with_collaborators(config, collaborators).await.unwrap()
}
