//! HTTP-only browsing session.
//!
//! Navigation is a GET with a shared cookie jar. HTML responses become the
//! current page; anything else is saved into the download directory as a
//! `.crdownload` file and renamed into place once complete, so the directory
//! poll sees the same sequence a real browser download produces. Clicks follow
//! the element's `href`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use regex::Regex;
use reqwest::Client;
use reqwest::cookie::Jar;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderName};
use scraper::{Html, Selector};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::download::filename::{download_filename, partial_path, resolve_unique_path};
use crate::http_client::{HttpTimeouts, build_http_client};
use crate::user_agent;
use crate::utils::{absolutize_url, compile_static_regex, compile_static_selector};

use super::{BrowserError, BrowserSession};

/// Path ends in `.pdf` or a `/pdf` segment, before any query or fragment.
static PDF_HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?i)[./]pdf/?(?:[?#].*)?$"));

static HREF_ELEMENTS: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("[href]"));

struct CurrentPage {
    url: Url,
    /// Body of a rendered page; `None` when the response was downloaded.
    html: Option<String>,
}

/// reqwest-backed [`BrowserSession`].
pub struct HttpBrowser {
    client: Client,
    download_dir: PathBuf,
    page: Option<CurrentPage>,
}

impl std::fmt::Debug for HttpBrowser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBrowser")
            .field("download_dir", &self.download_dir)
            .field("current_url", &self.current_url())
            .finish_non_exhaustive()
    }
}

impl HttpBrowser {
    /// Creates a session that saves downloads into `download_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`BrowserError::Client`] when HTTP client construction fails.
    pub fn new(download_dir: impl Into<PathBuf>, timeouts: HttpTimeouts) -> Result<Self, BrowserError> {
        let client = build_http_client(
            "browser",
            user_agent::default_browser_user_agent(),
            timeouts,
            Some(Arc::new(Jar::default())),
        )?;
        Ok(Self {
            client,
            download_dir: download_dir.into(),
            page: None,
        })
    }

    fn page(&self, action: &'static str) -> Result<&CurrentPage, BrowserError> {
        self.page
            .as_ref()
            .ok_or_else(|| BrowserError::unsupported(action, "no page open"))
    }

    fn html(&self, action: &'static str) -> Result<(&Url, &str), BrowserError> {
        let page = self.page(action)?;
        match &page.html {
            Some(html) => Ok((&page.url, html.as_str())),
            None => Err(BrowserError::unsupported(
                action,
                format!("{} is a downloaded document, not a page", page.url),
            )),
        }
    }

    #[instrument(skip(self, url, response), fields(url = %url))]
    async fn save_download(&self, url: &Url, response: reqwest::Response) -> Result<PathBuf, BrowserError> {
        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let filename = download_filename(
            url,
            header(CONTENT_DISPOSITION).as_deref(),
            header(CONTENT_TYPE).as_deref(),
        );
        let target = resolve_unique_path(&self.download_dir, &filename);
        let partial = partial_path(&target);

        stream_to_file(response.bytes_stream(), url.as_str(), &partial).await?;
        tokio::fs::rename(&partial, &target)
            .await
            .map_err(|e| BrowserError::navigation(url.as_str(), format!("finishing download: {e}")))?;

        debug!(path = %target.display(), "Saved download");
        Ok(target)
    }
}

/// Writes `stream` to `path`, removing the partial file when the write fails.
async fn stream_to_file<S, B, E>(stream: S, url: &str, path: &Path) -> Result<u64, BrowserError>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let result = write_stream(stream, url, path).await;
    if result.is_err()
        && let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "Could not remove partial download");
    }
    result
}

async fn write_stream<S, B, E>(mut stream: S, url: &str, path: &Path) -> Result<u64, BrowserError>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let io_error = |e: std::io::Error| BrowserError::navigation(url, format!("writing {}: {e}", path.display()));

    let file = File::create(path).await.map_err(io_error)?;
    let mut writer = BufWriter::new(file);
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| BrowserError::navigation(url, e.to_string()))?;
        let chunk = chunk.as_ref();
        writer.write_all(chunk).await.map_err(io_error)?;
        bytes_written += chunk.len() as u64;
    }

    writer.flush().await.map_err(io_error)?;
    Ok(bytes_written)
}

fn is_rendered(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return true;
    };
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    matches!(mime.as_str(), "text/html" | "application/xhtml+xml" | "text/plain")
}

fn first_pdf_href(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&HREF_ELEMENTS)
        .filter_map(|element| element.value().attr("href"))
        .find(|href| PDF_HREF_RE.is_match(href))
        .map(str::to_string)
}

enum ElementLookup {
    Href(String),
    NoHref,
    Missing,
}

fn lookup_element_href(html: &str, selector: &str) -> Result<ElementLookup, BrowserError> {
    let selector = Selector::parse(selector)
        .map_err(|e| BrowserError::unsupported("query element", format!("invalid selector '{selector}': {e}")))?;
    let document = Html::parse_document(html);
    Ok(match document.select(&selector).next() {
        Some(element) => match element.value().attr("href") {
            Some(href) => ElementLookup::Href(href.to_string()),
            None => ElementLookup::NoHref,
        },
        None => ElementLookup::Missing,
    })
}

impl HttpBrowser {
    fn resolved_element_href(&self, action: &'static str, selector: &str) -> Result<String, BrowserError> {
        let (url, html) = self.html(action)?;
        match lookup_element_href(html, selector)? {
            ElementLookup::Href(href) => absolutize_url(&href, url).ok_or_else(|| {
                BrowserError::navigation(url.as_str(), format!("cannot resolve href '{href}'"))
            }),
            ElementLookup::NoHref => Err(BrowserError::unsupported(
                action,
                format!("'{selector}' has no href; scripted elements need a real browser"),
            )),
            ElementLookup::Missing => Err(BrowserError::element_not_found(selector, url.as_str())),
        }
    }
}

#[async_trait]
impl BrowserSession for HttpBrowser {
    #[instrument(skip(self))]
    async fn open(&mut self, url: &str) -> Result<(), BrowserError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BrowserError::navigation(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BrowserError::navigation(url, format!("HTTP {}", status.as_u16())));
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        if is_rendered(content_type.as_deref()) {
            let html = response
                .text()
                .await
                .map_err(|e| BrowserError::navigation(url, e.to_string()))?;
            self.page = Some(CurrentPage {
                url: final_url,
                html: Some(html),
            });
        } else {
            self.save_download(&final_url, response).await?;
            self.page = Some(CurrentPage {
                url: final_url,
                html: None,
            });
        }
        Ok(())
    }

    fn current_url(&self) -> Option<String> {
        self.page.as_ref().map(|page| page.url.to_string())
    }

    fn current_domain(&self) -> Option<String> {
        self.page
            .as_ref()
            .and_then(|page| page.url.host_str().map(str::to_ascii_lowercase))
    }

    async fn find_pdf_link(&mut self) -> Result<String, BrowserError> {
        let (url, html) = self.html("find a PDF link")?;
        let href = first_pdf_href(html).ok_or_else(|| BrowserError::NoPdfLink {
            url: url.to_string(),
        })?;
        absolutize_url(&href, url)
            .ok_or_else(|| BrowserError::navigation(url.as_str(), format!("cannot resolve href '{href}'")))
    }

    async fn click(&mut self, selector: &str) -> Result<(), BrowserError> {
        let target = self.resolved_element_href("click", selector)?;
        debug!(selector, target = %target, "Following clicked element");
        self.open(&target).await
    }

    async fn element_href(&mut self, selector: &str) -> Result<String, BrowserError> {
        self.resolved_element_href("read element href", selector)
    }

    /// Always fails: an HTTP session has no renderer, so the print fallback
    /// never produces a file with this browser.
    async fn print_page(&mut self) -> Result<(), BrowserError> {
        let page = self.page("print page")?;
        Err(BrowserError::unsupported(
            "print page",
            format!("an HTTP session cannot render {} to PDF", page.url),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_first_pdf_href_matches_pdf_paths() {
        let html = r#"
            <a href="/about">About</a>
            <link href="/static/site.css">
            <a href="/pmc/articles/PMC1/pdf/hmg.pdf">PDF</a>
            <a href="/other.pdf">Other</a>"#;
        assert_eq!(
            first_pdf_href(html).as_deref(),
            Some("/pmc/articles/PMC1/pdf/hmg.pdf")
        );
        assert_eq!(first_pdf_href("<a href='/x.html'>x</a>"), None);
    }

    #[test]
    fn test_pdf_href_must_end_in_pdf() {
        assert!(PDF_HREF_RE.is_match("/content/1.full.PDF"));
        assert!(PDF_HREF_RE.is_match("/article/file.pdf?download=1"));
        assert!(PDF_HREF_RE.is_match("/pmc/articles/PMC3/pdf/"));
        assert!(!PDF_HREF_RE.is_match("/about/pdf-policy"));
        assert!(!PDF_HREF_RE.is_match("/help/pdf.html"));
        assert_eq!(
            first_pdf_href(r#"<a href="/pdf-help">Help</a><a href="/paper.pdf#page=1">PDF</a>"#).as_deref(),
            Some("/paper.pdf#page=1")
        );
    }

    #[tokio::test]
    async fn test_failed_stream_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let partial = partial_path(&dir.path().join("paper.pdf"));
        let chunks = futures_util::stream::iter(vec![
            Ok(b"%PDF-1.4".to_vec()),
            Err("connection reset".to_string()),
        ]);

        let err = stream_to_file(chunks, "https://a.org/paper.pdf", &partial)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("connection reset"));
        assert!(!partial.exists());
    }

    #[tokio::test]
    async fn test_complete_stream_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper.pdf");
        let chunks = futures_util::stream::iter(vec![
            Ok::<_, String>(b"%PDF-".to_vec()),
            Ok(b"1.4".to_vec()),
        ]);

        let written = stream_to_file(chunks, "https://a.org/paper.pdf", &path).await.unwrap();

        assert_eq!(written, 8);
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4");
    }

    #[test]
    fn test_lookup_element_href_variants() {
        let html = r#"<div id="downloadPdf" href="/file?id=1"></div><button id="pdfLink">PDF</button>"#;
        assert!(matches!(
            lookup_element_href(html, "#downloadPdf").unwrap(),
            ElementLookup::Href(href) if href == "/file?id=1"
        ));
        assert!(matches!(
            lookup_element_href(html, "#pdfLink").unwrap(),
            ElementLookup::NoHref
        ));
        assert!(matches!(
            lookup_element_href(html, "#missing").unwrap(),
            ElementLookup::Missing
        ));
        assert!(lookup_element_href(html, "[[").is_err());
    }

    #[test]
    fn test_is_rendered() {
        assert!(is_rendered(Some("text/html; charset=utf-8")));
        assert!(is_rendered(None));
        assert!(!is_rendered(Some("application/pdf")));
        assert!(!is_rendered(Some("application/octet-stream")));
    }

    #[tokio::test]
    async fn test_actions_without_page_are_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let mut browser = HttpBrowser::new(dir.path(), HttpTimeouts::default()).unwrap();
        assert!(browser.current_url().is_none());
        assert!(matches!(
            browser.find_pdf_link().await,
            Err(BrowserError::Unsupported { .. })
        ));
        assert!(matches!(
            browser.print_page().await,
            Err(BrowserError::Unsupported { .. })
        ));
    }
}
