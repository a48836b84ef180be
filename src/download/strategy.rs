//! Per-domain PDF address extraction.

use std::time::Duration;

use tracing::debug;

use super::browser::{BrowserError, BrowserSession};

/// How to find the PDF address on a publisher page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStrategy {
    /// First `href` on the page that points at a PDF.
    DomLookup,
    /// Click every selector but the last, then read the last element's `href`.
    ClickThrough(&'static [&'static str]),
}

const SCIENCEDIRECT: &[&str] = &[
    "#pdfLink",
    "#popover-content-download-pdf-popover > div > div > a:nth-of-type(1)",
];
const PLOS: &[&str] = &["#downloadPdf"];
const DMM: &[&str] = &[
    "#block-system-main > div > div > div > div > div:nth-of-type(1) > div > div > div:nth-of-type(5) > div > div > ul > li:nth-of-type(6) > a:nth-of-type(1)",
];
const ELIFE: &[&str] = &[
    "#maincontent > header > a",
    "#downloads > ul:nth-of-type(1) > li:nth-of-type(1) > a",
];

/// Strategy for a hosting domain. Unknown domains use [`LinkStrategy::DomLookup`].
#[must_use]
pub fn strategy_for_domain(domain: &str) -> LinkStrategy {
    match domain.to_ascii_lowercase().as_str() {
        "www.sciencedirect.com" => LinkStrategy::ClickThrough(SCIENCEDIRECT),
        "journals.plos.org" => LinkStrategy::ClickThrough(PLOS),
        "dmm.biologists.org" => LinkStrategy::ClickThrough(DMM),
        "elifesciences.org" => LinkStrategy::ClickThrough(ELIFE),
        // ncbi, academic.oup.com, www.jneurosci.org, www.mdpi.com,
        // stke.sciencemag.org and www.pnas.org link the PDF directly.
        _ => LinkStrategy::DomLookup,
    }
}

impl LinkStrategy {
    /// Finds the PDF address on the browser's current page.
    ///
    /// `settle` is waited after each click.
    ///
    /// # Errors
    ///
    /// Returns the browser error of the failing lookup or click.
    pub async fn locate(
        self,
        browser: &mut dyn BrowserSession,
        settle: Duration,
    ) -> Result<String, BrowserError> {
        match self {
            Self::DomLookup => browser.find_pdf_link().await,
            Self::ClickThrough(selectors) => {
                let Some((last, clicks)) = selectors.split_last() else {
                    return Err(BrowserError::unsupported("click through", "no selectors configured"));
                };
                for selector in clicks {
                    debug!(selector, "Clicking");
                    browser.click(selector).await?;
                    if !settle.is_zero() {
                        tokio::time::sleep(settle).await;
                    }
                }
                browser.element_href(last).await
            }
        }
    }
}
