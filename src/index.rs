//! Chapter index discovery, range filtering, and the per-series index file.

use std::path::{Path, PathBuf};

use reqwest::header::HeaderMap;
use reqwest::Url;
use thiserror::Error;

use crate::model::ChapterIndex;
use crate::scraper::{derive_key, resolve_site, trailing_number, Fetcher, ScraperError, Site};

/// Fetch the series page and build its chapter index, oldest chapter first.
///
/// Both sites list chapters newest first, so the links are reversed. A page without
/// a chapter list yields an empty index.
pub async fn resolve_index(
    fetcher: &dyn Fetcher,
    series_url: &str,
) -> Result<ChapterIndex, ScraperError> {
    let (site, url) = resolve_site(series_url)?;
    let html = fetcher.get_text(url.as_str(), &HeaderMap::new()).await?;
    let index = index_from_html(site, &url, &html);
    if index.chapter_urls.is_empty() {
        tracing::warn!("no chapters found on {}", url);
    } else {
        tracing::info!(
            "resolved {} chapters for {}",
            index.chapter_urls.len(),
            index.series_name
        );
    }
    Ok(index)
}

fn index_from_html(site: Site, url: &Url, html: &str) -> ChapterIndex {
    let mut chapter_urls: Vec<String> = site
        .chapter_links(html, url)
        .into_iter()
        .map(String::from)
        .collect();
    chapter_urls.reverse();
    ChapterIndex {
        series_name: series_name(site, url),
        series_url: url.to_string(),
        chapter_urls,
    }
}

/// Stable name for a series, used for the index file.
pub fn series_name(site: Site, series_url: &Url) -> String {
    format!("{}-{}", site.name(), derive_key(series_url))
}

/// Chapters of `index` whose trailing number lies in `[start, end]`, in ascending
/// chapter order. URLs without a trailing number are left out.
pub fn filter_range(index: &ChapterIndex, start: u32, end: u32) -> Vec<(u32, Url)> {
    let mut selected: Vec<(u32, Url)> = index
        .chapter_urls
        .iter()
        .filter_map(|raw| Url::parse(raw).ok())
        .filter_map(|url| trailing_number(&url).map(|n| (n, url)))
        .filter(|(n, _)| (start..=end).contains(n))
        .collect();
    selected.sort_by_key(|(n, _)| *n);
    selected
}

/// Errors reading or writing the index file.
#[derive(Debug, Error)]
pub enum IndexCacheError {
    #[error("Cannot access index file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid index file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Directory of persisted chapter indexes, one JSON file per series.
#[derive(Debug, Clone)]
pub struct IndexCache {
    dir: PathBuf,
}

impl IndexCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, series_name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", series_name))
    }

    pub async fn save(&self, index: &ChapterIndex) -> Result<PathBuf, IndexCacheError> {
        let path = self.path_for(&index.series_name);
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;
        let json = serde_json::to_vec_pretty(index).map_err(|e| IndexCacheError::Json {
            path: path.clone(),
            source: e,
        })?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| io_error(&path, e))?;
        Ok(path)
    }

    /// Load a previously saved index. Missing file returns Ok(None).
    pub async fn load(&self, series_name: &str) -> Result<Option<ChapterIndex>, IndexCacheError> {
        let path = self.path_for(series_name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };
        let index = serde_json::from_slice(&bytes)
            .map_err(|e| IndexCacheError::Json { path, source: e })?;
        Ok(Some(index))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> IndexCacheError {
    IndexCacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubFetcher;

    const SERIES: &str = "https://asuracomics.com/manga/omniscient-reader/";

    fn series_page(chapters: &[u32]) -> String {
        let items: String = chapters
            .iter()
            .map(|n| {
                format!(
                    "<li><a href=\"/102-omniscient-reader-chapter-{n}/\">Chapter {n}</a></li>"
                )
            })
            .collect();
        format!("<html><body><div id=\"chapterlist\"><ul>{items}</ul></div></body></html>")
    }

    fn index_of(numbers: &[&str]) -> ChapterIndex {
        ChapterIndex {
            series_name: "asuracomics-omniscient-reader".into(),
            series_url: SERIES.into(),
            chapter_urls: numbers
                .iter()
                .map(|n| format!("https://asuracomics.com/102-omniscient-reader-{n}/"))
                .collect(),
        }
    }

    #[tokio::test]
    async fn resolve_reverses_newest_first_listing() -> Result<(), ScraperError> {
        let newest_first: Vec<u32> = (1..=10).rev().collect();
        let fetcher = StubFetcher::new().page(SERIES, &series_page(&newest_first));
        let index = resolve_index(&fetcher, SERIES).await?;
        let expected: Vec<String> = (1..=10)
            .map(|n| format!("https://asuracomics.com/102-omniscient-reader-chapter-{n}/"))
            .collect();
        assert_eq!(index.chapter_urls, expected);
        assert_eq!(index.series_name, "asuracomics-omniscient-reader");
        assert_eq!(index.series_url, SERIES);
        Ok(())
    }

    #[tokio::test]
    async fn resolve_without_chapter_list_is_empty_not_error() -> Result<(), ScraperError> {
        let fetcher = StubFetcher::new().page(SERIES, "<html><body>Not found</body></html>");
        let index = resolve_index(&fetcher, SERIES).await?;
        assert!(index.chapter_urls.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn resolve_propagates_fetch_failure() {
        let fetcher = StubFetcher::new().status(SERIES, 503);
        let result = resolve_index(&fetcher, SERIES).await;
        assert!(matches!(
            result,
            Err(ScraperError::HttpStatus { status: 503, .. })
        ));
    }

    #[test]
    fn filter_range_is_inclusive_and_ascending() {
        let index = index_of(&[
            "chapter-1",
            "chapter-2",
            "chapter-3",
            "prologue",
            "chapter-9",
            "chapter-10",
            "chapter-11",
        ]);
        let picked: Vec<u32> = filter_range(&index, 2, 10).into_iter().map(|(n, _)| n).collect();
        assert_eq!(picked, vec![2, 3, 9, 10]);
    }

    #[test]
    fn filter_range_matches_exactly_for_every_bound() {
        let numbers: Vec<String> = (1..=15).map(|n| format!("chapter-{n}")).collect();
        let refs: Vec<&str> = numbers.iter().map(String::as_str).collect();
        let index = index_of(&refs);
        for start in 1..=16 {
            for end in start..=16 {
                let picked: Vec<u32> =
                    filter_range(&index, start, end).into_iter().map(|(n, _)| n).collect();
                let expected: Vec<u32> = (start..=end.min(15)).collect();
                assert_eq!(picked, expected, "range {start}-{end}");
            }
        }
    }

    #[test]
    fn filter_range_excludes_unnumbered_urls() {
        let index = index_of(&["prologue", "side-story", "chapter-1"]);
        let picked = filter_range(&index, 0, u32::MAX);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].0, 1);
    }

    #[tokio::test]
    async fn cache_round_trip_and_missing() -> Result<(), IndexCacheError> {
        let tmp = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(tmp.path().join("index"));
        assert!(cache.load("asuracomics-omniscient-reader").await?.is_none());
        let index = index_of(&["chapter-1", "chapter-2"]);
        let path = cache.save(&index).await?;
        assert!(path.ends_with("asuracomics-omniscient-reader.json"));
        let loaded = cache.load("asuracomics-omniscient-reader").await?;
        assert_eq!(loaded, Some(index));
        Ok(())
    }
}
