//! Manganato adapter. Page images are lazy-loaded through `data-src` inside
//! `div.container-chapter-reader`, and the image CDN refuses requests without a
//! browser User-Agent and a Manganato referrer.

use crate::scraper::select_urls_in_region;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use reqwest::Url;

pub(crate) const HOSTS: &[&str] = &["manganato.com", "chapmanganato.to", "chapmanganato.com"];

const READER_REGION: &str = "div.container-chapter-reader";
const READER_IMAGES: &str = "img[data-src]";
const IMAGE_ATTR: &str = "data-src";

const CHAPTER_LIST: &str = "ul.row-content-chapter";
const CHAPTER_LINKS: &str = "a.chapter-name[href]";

const REFERER_URL: &str = "https://chapmanganato.to/";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15";
const IMAGE_ACCEPT: &str = "image/avif,image/webp,image/png,image/svg+xml,image/*;q=0.8,*/*;q=0.5";

pub(crate) fn extract_image_urls(html: &str, page_url: &Url) -> Vec<Url> {
    select_urls_in_region(html, page_url, READER_REGION, READER_IMAGES, IMAGE_ATTR)
        .unwrap_or_else(|| {
            tracing::warn!("no chapter reader container at {}", page_url);
            Vec::new()
        })
}

pub(crate) fn chapter_links(html: &str, page_url: &Url) -> Vec<Url> {
    select_urls_in_region(html, page_url, CHAPTER_LIST, CHAPTER_LINKS, "href").unwrap_or_else(
        || {
            tracing::warn!("no chapter list at {}", page_url);
            Vec::new()
        },
    )
}

pub(crate) fn request_headers(_image_url: &Url) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static(IMAGE_ACCEPT));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(REFERER, HeaderValue::from_static(REFERER_URL));
    headers
}
