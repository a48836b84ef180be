//! Shared HTTP client construction policy.
//!
//! The detail fetcher and the HTTP browser build their clients here so both
//! agree on timeouts, compression, proxy handling and cookie support.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::cookie::Jar;
use reqwest::{ClientBuilder, Proxy};
use thiserror::Error;
use tracing::warn;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const READ_TIMEOUT_SECS: u64 = 30;

/// Connect and whole-request timeouts for outbound HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read: Duration::from_secs(READ_TIMEOUT_SECS),
        }
    }
}

/// HTTP client construction failed.
#[derive(Debug, Error)]
pub enum ClientBuildError {
    /// The TLS/proxy backend panicked during construction, twice.
    #[error(
        "HTTP client construction panicked for {component}\n  Suggestion: Set HTTPS_PROXY explicitly or run outside the sandbox"
    )]
    Panicked {
        /// Component that requested the client.
        component: String,
    },

    /// reqwest rejected the configuration.
    #[error("HTTP client construction failed for {component}: {source}")]
    Build {
        /// Component that requested the client.
        component: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Builds an HTTP client using shared project policy.
///
/// `component` is used only for error messages and logging.
///
/// # Errors
///
/// Returns [`ClientBuildError`] when client construction fails.
pub fn build_http_client(
    component: &str,
    user_agent: impl Into<String>,
    timeouts: HttpTimeouts,
    cookie_jar: Option<Arc<Jar>>,
) -> Result<Client, ClientBuildError> {
    let user_agent = user_agent.into();

    match try_build_client(&user_agent, timeouts, cookie_jar.clone(), false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            // Restricted sandboxes can panic while reading system proxy
            // settings; env proxies still apply on the retry.
            warn!(
                component,
                "HTTP client hit system proxy panic; using env-proxy fallback builder"
            );
            try_build_client(&user_agent, timeouts, cookie_jar, true)
                .map_err(|failure| failure.into_error(component))
        }
        Err(failure) => Err(failure.into_error(component)),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

impl BuildClientFailure {
    fn into_error(self, component: &str) -> ClientBuildError {
        match self {
            Self::Panic => ClientBuildError::Panicked {
                component: component.to_string(),
            },
            Self::Build(source) => ClientBuildError::Build {
                component: component.to_string(),
                source,
            },
        }
    }
}

fn try_build_client(
    user_agent: &str,
    timeouts: HttpTimeouts,
    cookie_jar: Option<Arc<Jar>>,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    let user_agent = user_agent.to_string();
    catch_unwind(AssertUnwindSafe(move || {
        let mut builder = base_builder(user_agent, timeouts, cookie_jar);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn base_builder(
    user_agent: String,
    timeouts: HttpTimeouts,
    cookie_jar: Option<Arc<Jar>>,
) -> ClientBuilder {
    let mut builder = Client::builder()
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.read)
        .user_agent(user_agent)
        .gzip(true);

    if let Some(jar) = cookie_jar {
        builder = builder.cookie_provider(jar);
    }

    builder
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    let names: &[&str] = match scheme {
        "https" => &["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"],
        "http" => &["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"],
        _ => return None,
    };
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
