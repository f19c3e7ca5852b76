//! Shared error type for site detection and page/image fetching.

use thiserror::Error;

/// Errors from URL validation and HTTP fetching. Parse problems are not errors:
/// a missing reader region or chapter list yields an empty result instead.
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("Invalid URL: {input}: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("Unsupported site '{host}'. Use an asuracomics.com or manganato URL.")]
    UnrecognizedHost { host: String },

    #[error("Network error: could not reach {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to read response body from {url}: {reason}")]
    BodyRead { url: String, reason: String },
}

impl ScraperError {
    pub(crate) fn invalid_url(input: &str, reason: impl ToString) -> Self {
        ScraperError::InvalidUrl {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }
}
