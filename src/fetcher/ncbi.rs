//! NCBI web page fetcher.
//!
//! Pages are fetched with reqwest and parsed with scraper. Parsing happens in
//! synchronous helpers so no DOM is held across an await point.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use reqwest::Client;
use reqwest::header::ACCEPT;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::http_client::{HttpTimeouts, build_http_client};
use crate::registry::{PublicationRecord, SourceRecord};
use crate::user_agent;
use crate::utils::{absolutize_url, compile_static_regex, compile_static_selector, host_of};

use super::query::DEFAULT_NCBI_BASE_URL;
use super::{CandidateSummary, DatasetProfile, DetailFetcher, FetchError, FetchedDetails, QueryTemplate};

const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

macro_rules! static_selector {
    ($name:ident, $css:expr) => {
        static $name: LazyLock<Selector> = LazyLock::new(|| compile_static_selector($css));
    };
}

static_selector!(ABSTRACT_MARKER, ".abstr");
static_selector!(LISTING_TITLE_LINK, ".rprt > .title > a");
static_selector!(REPORT_ID, ".rprtid");
static_selector!(ANCHOR, "a");
static_selector!(AUX, ".aux");
static_selector!(STATUS_ICON, ".status_icon");
static_selector!(ABSTRACT_BODY, ".abstr > div > p");
static_selector!(ABSTRACT_TITLE, ".abstract > h1");
static_selector!(PORTLET_LINK, ".portlet > a");
static_selector!(REPORT_ID_VALUE, ".rprtid > dd");
static_selector!(TITLE_LINK, ".title > a");
static_selector!(REPORT, ".rprt");
static_selector!(REPORT_DESC, ".desc");
static_selector!(REPORT_DETAILS, ".details");
static_selector!(REPORT_TITLE_LINK, ".title a");

static DOI_HREF_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(?i)doi\.org/"));
static PMID_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"PMID:\s*(\d+)"));
static AUTHOR_TERM_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"([a-zA-Z ]+)\[Author\]"));
static PUBLIC_ON_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r"Public on\s*([A-Za-z]{3})[a-z]*\s+(\d{1,2}),?\s+(\d{4})")
});
static YEAR_MONTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r"(\d{4}) (Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)")
});

/// HTTP + HTML scraping client for the NCBI legacy web pages.
pub struct NcbiFetcher {
    client: Client,
    base_url: Url,
}

impl std::fmt::Debug for NcbiFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NcbiFetcher")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl NcbiFetcher {
    /// Creates a fetcher against the public NCBI site.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when HTTP client construction fails.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_base_url(DEFAULT_NCBI_BASE_URL, HttpTimeouts::default())
    }

    /// Creates a fetcher against a custom web root (used by tests).
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when the URL is not absolute or the client cannot be built.
    pub fn with_base_url(base_url: &str, timeouts: HttpTimeouts) -> Result<Self, FetchError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| FetchError::invalid_base_url(base_url, e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::invalid_base_url(
                base_url,
                format!("unsupported scheme '{}'", parsed.scheme()),
            ));
        }

        Ok(Self {
            client: build_http_client(
                "ncbi",
                user_agent::default_fetcher_user_agent(),
                timeouts,
                None,
            )?,
            base_url: parsed,
        })
    }

    fn resolve(&self, path_or_url: &str) -> Result<String, FetchError> {
        absolutize_url(path_or_url, &self.base_url).ok_or_else(|| {
            FetchError::invalid_base_url(self.base_url.as_str(), format!("cannot join '{path_or_url}'"))
        })
    }

    /// GETs a page on the NCBI site and returns its final URL and body.
    async fn get_page(&self, path_or_url: &str) -> Result<(Url, String), FetchError> {
        let url = self.resolve(path_or_url)?;
        debug!(url = %url, "Fetching page");

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, HTML_ACCEPT)
            .send()
            .await
            .map_err(|e| FetchError::request(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(&url, status.as_u16()));
        }

        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::request(&url, e))?;
        Ok((final_url, body))
    }
}

#[async_trait]
impl DetailFetcher for NcbiFetcher {
    #[instrument(skip(self), fields(template = %template))]
    async fn fetch(
        &self,
        template: QueryTemplate,
        param: &str,
    ) -> Result<FetchedDetails, FetchError> {
        let (page_url, body) = self.get_page(&template.render(param)).await?;

        let abstract_pages = match classify_result_page(&body) {
            ResultPage::Abstract => vec![(page_url, body)],
            ResultPage::Listing(hrefs) => {
                debug!(results = hrefs.len(), "Following listing results");
                let mut pages = Vec::with_capacity(hrefs.len());
                for href in hrefs {
                    pages.push(self.get_page(&href).await?);
                }
                pages
            }
        };

        let mut details = FetchedDetails::default();
        for (page_url, body) in abstract_pages {
            match parse_abstract_page(&body, &page_url) {
                Some((publication, sources)) => {
                    details.publications.push(publication);
                    details.sources.extend(sources);
                }
                None => warn!(url = %page_url, "Abstract page has no DOI or PMID; skipping"),
            }
        }

        debug!(
            publications = details.publications.len(),
            sources = details.sources.len(),
            "Fetched publication details"
        );
        Ok(details)
    }

    #[instrument(skip(self))]
    async fn dataset_profile(
        &self,
        dataset_id: &str,
    ) -> Result<Option<DatasetProfile>, FetchError> {
        let (_, body) = self
            .get_page(&QueryTemplate::DatasetPage.render(dataset_id))
            .await?;
        let Some(entry) = parse_dataset_listing(&body) else {
            debug!("Dataset listing is empty");
            return Ok(None);
        };

        let (_, series_body) = self.get_page(&entry.series_href).await?;
        let series = parse_series_page(&series_body);

        Ok(Some(DatasetProfile {
            accession: entry.accession,
            title: entry.title,
            released: series.released,
            contributors: series.contributors,
        }))
    }

    #[instrument(skip(self))]
    async fn search_by_contributor(
        &self,
        name: &str,
    ) -> Result<Vec<CandidateSummary>, FetchError> {
        let (_, body) = self
            .get_page(&QueryTemplate::ByContributor.render(name))
            .await?;
        Ok(parse_contributor_listing(&body))
    }
}

enum ResultPage {
    Abstract,
    Listing(Vec<String>),
}

fn classify_result_page(body: &str) -> ResultPage {
    let document = Html::parse_document(body);
    if document.select(&ABSTRACT_MARKER).next().is_some() {
        return ResultPage::Abstract;
    }
    ResultPage::Listing(
        document
            .select(&LISTING_TITLE_LINK)
            .filter_map(|anchor| anchor.value().attr("href"))
            .map(str::to_string)
            .collect(),
    )
}

/// Collapses an element's text, dropping non-breaking spaces.
fn element_text(element: ElementRef<'_>) -> String {
    let raw: String = element.text().collect();
    raw.replace('\u{a0}', "").trim().to_string()
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document.select(selector).next().map(element_text)
}

fn parse_abstract_page(
    body: &str,
    page_url: &Url,
) -> Option<(PublicationRecord, Vec<SourceRecord>)> {
    let document = Html::parse_document(body);

    let doi = document
        .select(&REPORT_ID)
        .flat_map(|block| block.select(&ANCHOR))
        .find(|anchor| {
            anchor
                .value()
                .attr("href")
                .is_some_and(|href| DOI_HREF_RE.is_match(href))
        })
        .map(element_text)
        .filter(|doi| !doi.is_empty())?;

    let aux = first_text(&document, &AUX)?;
    let external_id = PMID_RE.captures(&aux)?.get(1)?.as_str().to_string();

    let is_open_access = document.select(&STATUS_ICON).next().is_some();
    let abstract_text = first_text(&document, &ABSTRACT_BODY).unwrap_or_default();
    let title = first_text(&document, &ABSTRACT_TITLE).unwrap_or_default();

    let sources = document
        .select(&PORTLET_LINK)
        .filter_map(|anchor| anchor.value().attr("href"))
        .filter_map(|href| {
            let link = absolutize_url(href, page_url)?;
            let hosting_domain = host_of(&link)?;
            Some(SourceRecord::new(doi.clone(), hosting_domain, link))
        })
        .collect();

    Some((
        PublicationRecord::new(doi.clone(), external_id, is_open_access, title, abstract_text),
        sources,
    ))
}

struct DatasetListingEntry {
    accession: String,
    title: String,
    series_href: String,
}

fn parse_dataset_listing(body: &str) -> Option<DatasetListingEntry> {
    let document = Html::parse_document(body);
    let accession = first_text(&document, &REPORT_ID_VALUE)?;
    let title_anchor = document.select(&TITLE_LINK).next()?;
    let series_href = title_anchor.value().attr("href")?.to_string();

    Some(DatasetListingEntry {
        accession,
        title: element_text(title_anchor),
        series_href,
    })
}

struct SeriesPage {
    released: Option<NaiveDate>,
    contributors: Vec<String>,
}

fn parse_series_page(body: &str) -> SeriesPage {
    let document = Html::parse_document(body);
    let page_text: String = document.root_element().text().collect();
    let page_text = page_text.replace('\u{a0}', "");

    let released = PUBLIC_ON_RE.captures(&page_text).and_then(|caps| {
        let stamp = format!("{} {} {}", &caps[1], &caps[2], &caps[3]);
        NaiveDate::parse_from_str(&stamp, "%b %d %Y").ok()
    });

    let mut contributors: Vec<String> = Vec::new();
    for href in document
        .select(&ANCHOR)
        .filter_map(|anchor| anchor.value().attr("href"))
    {
        let plus_as_space = href.replace('+', " ");
        let decoded = urlencoding::decode(&plus_as_space)
            .map(std::borrow::Cow::into_owned)
            .unwrap_or(plus_as_space);
        for caps in AUTHOR_TERM_RE.captures_iter(&decoded) {
            let name = caps[1].trim().to_string();
            if !name.is_empty() && !contributors.contains(&name) {
                contributors.push(name);
            }
        }
    }

    SeriesPage {
        released,
        contributors,
    }
}

/// Parses a "Jan"-style month abbreviation and year into day 1 of that month.
fn year_month_date(text: &str) -> Option<NaiveDate> {
    let caps = YEAR_MONTH_RE.captures(text)?;
    NaiveDate::parse_from_str(&format!("{} {} 1", &caps[1], &caps[2]), "%Y %b %d").ok()
}

fn parse_contributor_listing(body: &str) -> Vec<CandidateSummary> {
    let document = Html::parse_document(body);
    document
        .select(&REPORT)
        .filter_map(|report| {
            let href = report
                .select(&REPORT_TITLE_LINK)
                .next()?
                .value()
                .attr("href")?;
            let external_id = href
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .filter(|segment| !segment.is_empty())?
                .to_string();

            let authors = report
                .select(&REPORT_DESC)
                .next()
                .map(element_text)
                .map(|desc| {
                    desc.trim_end_matches('.')
                        .split(", ")
                        .map(str::trim)
                        .filter(|author| !author.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            let published = report
                .select(&REPORT_DETAILS)
                .next()
                .map(element_text)
                .and_then(|details| year_month_date(&details));

            Some(CandidateSummary {
                external_id,
                authors,
                published,
            })
        })
        .collect()
}
