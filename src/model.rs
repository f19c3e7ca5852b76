//! Data passed between the pipeline stages.

use std::path::PathBuf;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::scraper::derive_key;

/// Ordered chapter list of one series, oldest chapter first.
///
/// Persisted as JSON (`seriesName`, `seriesUrl`, `chapterUrls`). Every entry is absolute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterIndex {
    pub series_name: String,
    pub series_url: String,
    pub chapter_urls: Vec<String>,
}

/// One chapter to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterJob {
    pub chapter_url: Url,
    /// Directory and document base name, from [derive_key].
    pub key: String,
}

impl ChapterJob {
    pub fn new(chapter_url: Url) -> Self {
        let key = derive_key(&chapter_url);
        Self { chapter_url, key }
    }
}

/// A decoded page image, ready to become one PDF page.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    /// Stored file name (sequence prefix plus the source URL's basename).
    pub name: String,
    /// Bytes embedded in the PDF: the original JPEG, or raw RGB samples.
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// The PDF produced for one chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterDocument {
    pub path: PathBuf,
    pub page_count: usize,
}

impl ChapterDocument {
    /// File name shown to the recipient.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "chapter.pdf".to_string())
    }
}

/// How one chapter of a range request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterStatus {
    Completed { pages: usize },
    /// No images were found on the chapter page.
    Skipped,
    Failed { reason: String },
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterOutcome {
    pub number: u32,
    pub chapter_url: String,
    pub status: ChapterStatus,
}

/// Aggregate result of a range request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSummary {
    pub start: u32,
    pub end: u32,
    pub outcomes: Vec<ChapterOutcome>,
}

impl RangeSummary {
    fn count(&self, f: impl Fn(&ChapterStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| f(&o.status)).count()
    }

    pub fn completed(&self) -> usize {
        self.count(|s| matches!(s, ChapterStatus::Completed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, ChapterStatus::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ChapterStatus::Failed { .. }))
    }

    pub fn timed_out(&self) -> usize {
        self.count(|s| matches!(s, ChapterStatus::TimedOut))
    }

    /// One-line human-readable report.
    pub fn describe(&self) -> String {
        if self.outcomes.is_empty() {
            return format!("No chapters found between {} and {}.", self.start, self.end);
        }
        format!(
            "Chapters {}-{}: {} sent, {} skipped, {} failed, {} timed out.",
            self.start,
            self.end,
            self.completed(),
            self.skipped(),
            self.failed(),
            self.timed_out()
        )
    }
}
