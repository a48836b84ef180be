//! Shared User-Agent strings for page fetching and the HTTP browser.

/// Project URL for User-Agent identification (RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/nspider";

/// Default User-Agent for NCBI page fetches.
#[must_use]
pub(crate) fn default_fetcher_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("nspider/{version} (research-tool; +{PROJECT_UA_URL})")
}

/// Default User-Agent for the browsing session that visits publisher sites.
#[must_use]
pub(crate) fn default_browser_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("Mozilla/5.0 (compatible; nspider/{version}; academic-research-tool; +{PROJECT_UA_URL})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_format_consistency() {
        let fetcher_ua = default_fetcher_user_agent();
        let browser_ua = default_browser_user_agent();
        assert!(fetcher_ua.contains(PROJECT_UA_URL));
        assert!(browser_ua.contains(PROJECT_UA_URL));

        let version = env!("CARGO_PKG_VERSION");
        assert!(fetcher_ua.starts_with(&format!("nspider/{version} ")));
        assert!(browser_ua.contains(&format!("nspider/{version};")));
    }

    #[test]
    fn test_browser_ua_looks_like_a_browser() {
        assert!(default_browser_user_agent().starts_with("Mozilla/5.0"));
        assert!(!default_fetcher_user_agent().contains("Mozilla"));
    }
}
