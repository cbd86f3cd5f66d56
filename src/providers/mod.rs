//! External book-metadata providers.
//!
//! Each provider maps its own JSON shape into [`BookMetadata`] through typed
//! intermediate structs. Unexpected shapes are rejected as
//! [`ProviderError::InvalidResponse`] rather than passed through.

pub mod google_books;
#[cfg(any(test, feature = "test-support"))]
pub mod mock;
pub mod open_library;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::{
    config::ProvidersConfig,
    error::{AppError, AppResult},
    isbn::Isbn,
    models::BookMetadata,
    resilience::Retryable,
};

pub use google_books::GoogleBooksProvider;
#[cfg(any(test, feature = "test-support"))]
pub use mock::MockProvider;
pub use open_library::OpenLibraryProvider;

/// Errors raised by a single provider call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{provider}: request timed out")]
    Timeout { provider: String },

    #[error("{provider}: network error: {message}")]
    Network { provider: String, message: String },

    #[error("{provider}: HTTP {status}")]
    Http { provider: String, status: u16 },

    #[error("{provider}: rate limited")]
    RateLimited { provider: String },

    #[error("{provider}: unexpected response: {message}")]
    InvalidResponse { provider: String, message: String },
}

impl ProviderError {
    pub fn provider(&self) -> &str {
        match self {
            ProviderError::Timeout { provider }
            | ProviderError::Network { provider, .. }
            | ProviderError::Http { provider, .. }
            | ProviderError::RateLimited { provider }
            | ProviderError::InvalidResponse { provider, .. } => provider,
        }
    }

    pub fn invalid(provider: &str, message: impl Into<String>) -> Self {
        ProviderError::InvalidResponse {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    fn from_reqwest(provider: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout {
                provider: provider.to_string(),
            }
        } else if err.is_decode() {
            ProviderError::invalid(provider, err.to_string())
        } else if let Some(status) = err.status() {
            ProviderError::Http {
                provider: provider.to_string(),
                status: status.as_u16(),
            }
        } else {
            ProviderError::Network {
                provider: provider.to_string(),
                message: err.to_string(),
            }
        }
    }
}

impl Retryable for ProviderError {
    /// Timeouts, network errors, 5xx and 429 may succeed on a later attempt
    fn is_transient(&self) -> bool {
        match self {
            ProviderError::Timeout { .. }
            | ProviderError::Network { .. }
            | ProviderError::RateLimited { .. } => true,
            ProviderError::Http { status, .. } => *status >= 500,
            ProviderError::InvalidResponse { .. } => false,
        }
    }
}

/// A source of book metadata keyed by ISBN
#[async_trait]
pub trait BookProvider: Send + Sync {
    /// Stable name, used as the `source` tag and in stats
    fn name(&self) -> &str;

    /// One outbound lookup. `Ok(None)` is an authoritative not-found.
    async fn lookup(&self, isbn: &Isbn) -> Result<Option<BookMetadata>, ProviderError>;

    /// Best-effort title search
    async fn search_by_title(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<BookMetadata>, ProviderError>;

    /// Cheap reachability probe
    async fn health_check(&self) -> Result<(), ProviderError>;
}

pub type ArcProvider = Arc<dyn BookProvider>;

/// Build an HTTP client with the given request timeout
pub fn http_client(timeout: Duration) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("isbn-resolver/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}

/// GET a JSON document. A 404 maps to `Ok(None)`.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    provider: &str,
    url: &str,
) -> Result<Option<T>, ProviderError> {
    tracing::debug!(provider, url, "Provider request");

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ProviderError::from_reqwest(provider, e))?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimited {
            provider: provider.to_string(),
        });
    }
    if !status.is_success() {
        return Err(ProviderError::Http {
            provider: provider.to_string(),
            status: status.as_u16(),
        });
    }

    response
        .json::<T>()
        .await
        .map(Some)
        .map_err(|e| ProviderError::from_reqwest(provider, e))
}

/// GET a URL and only check that the provider answers without a 5xx
pub(crate) async fn probe(
    client: &reqwest::Client,
    provider: &str,
    url: &str,
) -> Result<(), ProviderError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ProviderError::from_reqwest(provider, e))?;

    if response.status().is_server_error() {
        return Err(ProviderError::Http {
            provider: provider.to_string(),
            status: response.status().as_u16(),
        });
    }
    Ok(())
}

/// Parse the loose publication dates providers return:
/// `2017-09-10`, `2017-09`, `Sep 10, 2017`, `September 2017`, `2017`.
/// Partial dates resolve to the first day of the period.
pub(crate) fn parse_loose_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    for format in ["%Y-%m-%d", "%b %d, %Y", "%B %d, %Y", "%d %B %Y", "%d %b %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    for format in ["%Y-%m-%d", "%d %b %Y", "%d %B %Y"] {
        let candidate = match format {
            "%Y-%m-%d" => format!("{}-01", raw),
            _ => format!("01 {}", raw),
        };
        if let Ok(date) = NaiveDate::parse_from_str(&candidate, format) {
            return Some(date);
        }
    }

    // Fall back to the first four-digit year found
    let digits: Vec<char> = raw.chars().collect();
    digits
        .windows(4)
        .find(|w| w.iter().all(|c| c.is_ascii_digit()))
        .and_then(|w| w.iter().collect::<String>().parse::<i32>().ok())
        .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1))
}

/// Extract a leading edition number from strings like `2nd ed.` or `3`
pub(crate) fn parse_edition_number(raw: &str) -> Option<i32> {
    let digits: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok().filter(|n| *n > 0)
}

/// Instantiate the providers enabled in configuration, in lookup order
pub fn from_config(config: &ProvidersConfig, timeout: Duration) -> AppResult<Vec<ArcProvider>> {
    let client = http_client(timeout)?;
    let mut providers: Vec<ArcProvider> = Vec::new();

    if config.openlibrary.enabled {
        providers.push(Arc::new(OpenLibraryProvider::new(
            client.clone(),
            &config.openlibrary.base_url,
        )));
    }
    if config.googlebooks.enabled {
        providers.push(Arc::new(GoogleBooksProvider::new(
            client,
            &config.googlebooks.base_url,
            config.googlebooks.api_key.clone(),
        )));
    }

    if providers.is_empty() {
        tracing::warn!("No external ISBN providers enabled");
    }
    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> ProviderError {
        ProviderError::Http {
            provider: "p".into(),
            status,
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::Timeout { provider: "p".into() }.is_transient());
        assert!(ProviderError::RateLimited { provider: "p".into() }.is_transient());
        assert!(http(503).is_transient());
        assert!(!http(400).is_transient());
        assert!(!ProviderError::invalid("p", "missing title").is_transient());
    }

    #[test]
    fn test_parse_loose_date() {
        let ymd = |y, m, d| NaiveDate::from_ymd_opt(y, m, d);
        assert_eq!(parse_loose_date("2017-09-10"), ymd(2017, 9, 10));
        assert_eq!(parse_loose_date("2017-09"), ymd(2017, 9, 1));
        assert_eq!(parse_loose_date("Sep 10, 2017"), ymd(2017, 9, 10));
        assert_eq!(parse_loose_date("September 10, 2017"), ymd(2017, 9, 10));
        assert_eq!(parse_loose_date("September 2017"), ymd(2017, 9, 1));
        assert_eq!(parse_loose_date("2017"), ymd(2017, 1, 1));
        assert_eq!(parse_loose_date("c1999."), ymd(1999, 1, 1));
        assert_eq!(parse_loose_date("unknown"), None);
    }

    #[test]
    fn test_parse_edition_number() {
        assert_eq!(parse_edition_number("2nd ed."), Some(2));
        assert_eq!(parse_edition_number("10"), Some(10));
        assert_eq!(parse_edition_number("First edition"), None);
        assert_eq!(parse_edition_number("0"), None);
    }
}
