//! Range requests: resolve a series index and deliver a span of chapters one by one.

use std::sync::Arc;
use std::time::Duration;

use crate::index::{filter_range, resolve_index, IndexCache};
use crate::model::{ChapterIndex, ChapterJob, ChapterOutcome, ChapterStatus, RangeSummary};
use crate::notify::Session;
use crate::pipeline::{ChapterPipeline, PipelineError};
use crate::scraper::resolve_site;
use crate::store::FileStore;

pub const DEFAULT_CHAPTER_TIMEOUT: Duration =
    Duration::from_secs(crate::config::DEFAULT_CHAPTER_TIMEOUT_SECS);

/// Reject empty or reversed ranges. Chapter numbers start at 1.
pub fn validate_range(start: u32, end: u32) -> Result<(), PipelineError> {
    if start == 0 {
        return Err(PipelineError::Validation(
            "Chapter numbers start at 1".to_string(),
        ));
    }
    if start > end {
        return Err(PipelineError::Validation(format!(
            "Start chapter {} is after end chapter {}",
            start, end
        )));
    }
    Ok(())
}

pub struct RangeOrchestrator {
    pipeline: Arc<ChapterPipeline>,
    index_cache: Option<IndexCache>,
    chapter_timeout: Duration,
}

impl RangeOrchestrator {
    pub fn new(pipeline: Arc<ChapterPipeline>) -> Self {
        Self {
            pipeline,
            index_cache: None,
            chapter_timeout: DEFAULT_CHAPTER_TIMEOUT,
        }
    }

    /// Save every resolved index under `cache`. Saved copies are never read back
    /// here: a range always uses the index it just resolved.
    pub fn with_index_cache(mut self, cache: IndexCache) -> Self {
        self.index_cache = Some(cache);
        self
    }

    pub fn with_chapter_timeout(mut self, timeout: Duration) -> Self {
        self.chapter_timeout = timeout;
        self
    }

    /// Deliver chapters `start..=end` of the series at `series_url`.
    ///
    /// Fails only on invalid input or when the index cannot be resolved. A chapter
    /// that fails or exceeds the chapter timeout is recorded and the next one runs.
    pub async fn run(
        &self,
        session: &Session,
        store: &FileStore,
        series_url: &str,
        start: u32,
        end: u32,
    ) -> Result<RangeSummary, PipelineError> {
        validate_range(start, end)?;
        resolve_site(series_url).map_err(|e| PipelineError::Validation(e.to_string()))?;

        let status = session.say("Fetching chapter list...").await;
        let index = match resolve_index(self.pipeline.fetcher(), series_url).await {
            Ok(index) => index,
            Err(e) => {
                tracing::error!("index for {} failed: {}", series_url, e);
                session
                    .update(status.as_ref(), &format!("Could not load chapter list: {}", e))
                    .await;
                return Err(e.into());
            }
        };
        self.save_index(&index).await;

        let chapters = filter_range(&index, start, end);
        tracing::info!(
            "{}: {} of {} chapters in {}-{}",
            index.series_name,
            chapters.len(),
            index.chapter_urls.len(),
            start,
            end
        );
        session
            .update(
                status.as_ref(),
                &format!(
                    "Found {} chapters between {} and {}.",
                    chapters.len(),
                    start,
                    end
                ),
            )
            .await;

        let mut summary = RangeSummary {
            start,
            end,
            outcomes: Vec::with_capacity(chapters.len()),
        };
        for (number, url) in chapters {
            let job = ChapterJob::new(url);
            let status = self.run_chapter(session, store, &job, number).await;
            summary.outcomes.push(ChapterOutcome {
                number,
                chapter_url: job.chapter_url.to_string(),
                status,
            });
        }

        tracing::info!("{}", summary.describe());
        session.say(&summary.describe()).await;
        Ok(summary)
    }

    async fn save_index(&self, index: &ChapterIndex) {
        if let Some(cache) = &self.index_cache {
            match cache.save(index).await {
                Ok(path) => tracing::debug!("saved index to {}", path.display()),
                Err(e) => tracing::warn!("index not saved: {}", e),
            }
        }
    }

    async fn run_chapter(
        &self,
        session: &Session,
        store: &FileStore,
        job: &ChapterJob,
        number: u32,
    ) -> ChapterStatus {
        let label = format!("Chapter {}: ", number);
        tracing::info!("chapter {} started: {}", number, job.chapter_url);
        let delivery = self.pipeline.deliver(session, store, job, &label);
        match tokio::time::timeout(self.chapter_timeout, delivery).await {
            Ok(Ok(doc)) => ChapterStatus::Completed {
                pages: doc.page_count,
            },
            Ok(Err(PipelineError::NoImages { .. })) => ChapterStatus::Skipped,
            Ok(Err(e)) => ChapterStatus::Failed {
                reason: e.to_string(),
            },
            Err(_) => {
                let err = PipelineError::Timeout {
                    url: job.chapter_url.to_string(),
                    secs: self.chapter_timeout.as_secs(),
                };
                tracing::warn!("{}", err);
                store.cleanup(&job.key).await;
                session
                    .say(&format!("{}Timed out, moving on to the next chapter.", label))
                    .await;
                ChapterStatus::TimedOut
            }
        }
    }
}
