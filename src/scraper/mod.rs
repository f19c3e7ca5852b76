//! Site adapters and fetching. Site detection, the fetcher seam, the shared client, and adapters.

mod client;
mod error;

pub mod asura;
pub mod manganato;

pub use client::{PoliteClient, PoliteClientBuilder};
pub use error::ScraperError;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use reqwest::header::HeaderMap;
use reqwest::Url;
use scraper::{Html, Selector};

/// Response body as a stream of chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes, ScraperError>>;

/// HTTP GET seam. [PoliteClient] is the real implementation; tests use an in-memory stub.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url` with extra `headers`. Non-2xx statuses are errors.
    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<ByteStream, ScraperError>;

    /// GET `url` and collect the body as (lossy) UTF-8 text.
    async fn get_text(&self, url: &str, headers: &HeaderMap) -> Result<String, ScraperError> {
        let body: Vec<u8> = self
            .get(url, headers)
            .await?
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

/// Supported source site, selected from the URL host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site {
    /// `src` attribute images inside `#readerarea`, no special headers.
    AsuraComics,
    /// `data-src` attribute images, requires browser headers and a referrer.
    Manganato,
}

impl Site {
    /// Ordered, absolute image URLs inside the reader region. Empty when the region is absent.
    pub fn extract_image_urls(self, html: &str, page_url: &Url) -> Vec<Url> {
        match self {
            Site::AsuraComics => asura::extract_image_urls(html, page_url),
            Site::Manganato => manganato::extract_image_urls(html, page_url),
        }
    }

    /// Headers to send with image requests.
    pub fn request_headers(self, image_url: &Url) -> HeaderMap {
        match self {
            Site::AsuraComics => HeaderMap::new(),
            Site::Manganato => manganato::request_headers(image_url),
        }
    }

    /// Chapter links from a series page in document order (newest first on both sites).
    pub fn chapter_links(self, html: &str, page_url: &Url) -> Vec<Url> {
        match self {
            Site::AsuraComics => asura::chapter_links(html, page_url),
            Site::Manganato => manganato::chapter_links(html, page_url),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Site::AsuraComics => "asuracomics",
            Site::Manganato => "manganato",
        }
    }
}

/// Parse `url_input` and pick the site from its host.
pub fn resolve_site(url_input: &str) -> Result<(Site, Url), ScraperError> {
    let url = Url::parse(url_input).map_err(|e| ScraperError::invalid_url(url_input, e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ScraperError::invalid_url(url_input, "URL must be http or https"));
    }
    let host = url
        .host_str()
        .ok_or_else(|| ScraperError::invalid_url(url_input, "URL has no host"))?;
    let site = if host_matches(host, asura::HOSTS) {
        Site::AsuraComics
    } else if host_matches(host, manganato::HOSTS) {
        Site::Manganato
    } else {
        return Err(ScraperError::UnrecognizedHost {
            host: host.to_string(),
        });
    };
    Ok((site, url))
}

/// `host` is one of `known` or a subdomain of one.
fn host_matches(host: &str, known: &[&str]) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    known.iter().any(|k| {
        host == *k
            || host
                .strip_suffix(k)
                .is_some_and(|rest| rest.ends_with('.'))
    })
}

/// Last non-empty path segment of `url`, if any.
pub fn last_segment(url: &Url) -> Option<&str> {
    url.path_segments()?.filter(|s| !s.is_empty()).last()
}

/// Folder/document base name for a chapter: the last path segment with a leading
/// `<digits>-` prefix removed, restricted to filesystem-safe characters.
///
/// `https://asuracomics.com/102-omniscient-reader/` gives `omniscient-reader`.
pub fn derive_key(chapter_url: &Url) -> String {
    let segment = last_segment(chapter_url).unwrap_or("");
    let digits = segment.bytes().take_while(u8::is_ascii_digit).count();
    let stripped = if digits > 0 && segment.as_bytes().get(digits) == Some(&b'-') {
        &segment[digits + 1..]
    } else {
        segment
    };
    let key: String = stripped
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let key = key.trim_matches('.').to_string();
    if key.is_empty() {
        "chapter".to_string()
    } else {
        key
    }
}

/// Chapter number: the run of ASCII digits ending the last path segment
/// (`.../omniscient-reader-chapter-12/` gives 12). None when the segment does not end in a digit.
pub fn trailing_number(chapter_url: &Url) -> Option<u32> {
    let segment = last_segment(chapter_url)?;
    let digits = segment
        .bytes()
        .rev()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits == 0 {
        return None;
    }
    segment[segment.len() - digits..].parse().ok()
}

/// Parse a static CSS selector. Selectors are crate constants, so a failure is logged and treated as "no match".
pub(crate) fn parse_selector(sel: &str) -> Option<Selector> {
    match Selector::parse(sel) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::error!("invalid selector {:?}: {}", sel, e);
            None
        }
    }
}

/// Collect `attr` from every element matching `item_sel` inside the first `region_sel`
/// match, resolved against `base`. Values that do not form a URL are skipped.
pub(crate) fn select_urls_in_region(
    html: &str,
    base: &Url,
    region_sel: &str,
    item_sel: &str,
    attr: &str,
) -> Option<Vec<Url>> {
    let region_sel = parse_selector(region_sel)?;
    let item_sel = parse_selector(item_sel)?;
    let doc = Html::parse_document(html);
    let region = doc.select(&region_sel).next()?;
    let urls = region
        .select(&item_sel)
        .filter_map(|el| el.value().attr(attr))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .filter_map(|v| match base.join(v) {
            Ok(u) => Some(u),
            Err(e) => {
                tracing::debug!("skipping unresolvable {} {:?}: {}", attr, v, e);
                None
            }
        })
        .collect();
    Some(urls)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn site_detection_asura() -> Result<(), ScraperError> {
        let (site, _) = resolve_site("https://asuracomics.com/102-omniscient-reader-chapter-1/")?;
        assert_eq!(site, Site::AsuraComics);
        Ok(())
    }

    #[test]
    fn site_detection_manganato() -> Result<(), ScraperError> {
        let (site, _) = resolve_site("https://chapmanganato.to/manga-ab123/chapter-7")?;
        assert_eq!(site, Site::Manganato);
        Ok(())
    }

    #[test]
    fn site_detection_unrecognized_host_errors() -> Result<(), String> {
        let result = resolve_site("https://example.com/foo");
        match &result {
            Err(ScraperError::UnrecognizedHost { host }) if host == "example.com" => Ok(()),
            _ => Err(format!("expected UnrecognizedHost, got {:?}", result)),
        }
    }

    #[test]
    fn site_detection_invalid_url_errors() -> Result<(), String> {
        let result = resolve_site("not-a-url");
        match &result {
            Err(ScraperError::InvalidUrl { input, .. }) if input == "not-a-url" => Ok(()),
            _ => Err(format!("expected InvalidUrl, got {:?}", result)),
        }
    }

    #[test]
    fn site_detection_matches_whole_host_labels() {
        assert!(matches!(
            resolve_site("https://www.asuracomics.com/1-a-chapter-1/"),
            Ok((Site::AsuraComics, _))
        ));
        for lookalike in [
            "https://asuracomics.com.evil.net/1-a-chapter-1/",
            "https://notasuracomics.com/1-a-chapter-1/",
            "https://manganato.com.example.org/manga-ab/chapter-1",
        ] {
            assert!(
                matches!(
                    resolve_site(lookalike),
                    Err(ScraperError::UnrecognizedHost { .. })
                ),
                "{lookalike} should be rejected"
            );
        }
    }

    #[test]
    fn site_detection_rejects_non_http_scheme() {
        assert!(matches!(
            resolve_site("ftp://asuracomics.com/1-a/"),
            Err(ScraperError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn derive_key_strips_numeric_prefix() {
        assert_eq!(
            derive_key(&url("https://asuracomics.com/102-omniscient-reader/")),
            "omniscient-reader"
        );
    }

    #[test]
    fn derive_key_is_deterministic_and_idempotent() {
        let u = url("https://asuracomics.com/7-solo-leveling-chapter-3/");
        let first = derive_key(&u);
        assert_eq!(first, derive_key(&u));
        let again = derive_key(&url(&format!("https://asuracomics.com/{}/", first)));
        assert_eq!(first, again);
    }

    #[test]
    fn derive_key_keeps_segments_without_prefix() {
        assert_eq!(
            derive_key(&url("https://chapmanganato.to/manga-ab123/chapter-10")),
            "chapter-10"
        );
        // Digits not followed by a hyphen are part of the name.
        assert_eq!(derive_key(&url("https://asuracomics.com/2024/")), "2024");
    }

    #[test]
    fn derive_key_is_filesystem_safe() {
        assert_eq!(
            derive_key(&url("https://asuracomics.com/5-a%20b:c/")),
            "a-20b-c"
        );
        assert_eq!(derive_key(&url("https://asuracomics.com/")), "chapter");
        assert_eq!(derive_key(&url("https://asuracomics.com/..")), "chapter");
    }

    #[test]
    fn trailing_number_reads_last_digits() {
        assert_eq!(
            trailing_number(&url("https://asuracomics.com/1-omniscient-reader-chapter-12/")),
            Some(12)
        );
        assert_eq!(
            trailing_number(&url("https://chapmanganato.to/manga-ab123/chapter-105")),
            Some(105)
        );
        assert_eq!(
            trailing_number(&url("https://asuracomics.com/1-omniscient-reader-prologue/")),
            None
        );
    }

    #[test]
    fn decimal_chapters_read_as_their_last_digit_run() {
        // Only the final run of digits counts, so half chapters are not 10.
        assert_eq!(
            trailing_number(&url("https://asuracomics.com/1-omniscient-reader-chapter-10-5/")),
            Some(5)
        );
        assert_eq!(
            trailing_number(&url("https://chapmanganato.to/manga-ab123/chapter-10.5")),
            Some(5)
        );
    }
}
