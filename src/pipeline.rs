//! Single-chapter pipeline: scrape the chapter page, download its images,
//! assemble the PDF, deliver it, and clean up.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use thiserror::Error;

use crate::download::download_all;
use crate::model::{ChapterDocument, ChapterJob};
use crate::notify::{MessageRef, NotifyError, Session};
use crate::pdf::{AssemblyError, PdfAssembler};
use crate::scraper::{resolve_site, Fetcher, ScraperError};
use crate::store::{FileStore, StoreError};

/// How long the "ready" status message stays before it is deleted.
pub const READY_MESSAGE_TTL: Duration = Duration::from_secs(5);

/// Errors from processing a chapter or a range of chapters.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Fetch(#[from] ScraperError),

    #[error("No images found at {url}")]
    NoImages { url: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error("Chapter {url} did not finish within {secs}s")]
    Timeout { url: String, secs: u64 },

    #[error("Could not send document: {0}")]
    Delivery(#[from] NotifyError),
}

/// Composes scraping, downloading, and PDF assembly for one chapter.
pub struct ChapterPipeline {
    fetcher: Arc<dyn Fetcher>,
    assembler: PdfAssembler,
}

impl ChapterPipeline {
    pub fn new(fetcher: Arc<dyn Fetcher>, assembler: PdfAssembler) -> Self {
        Self { fetcher, assembler }
    }

    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }

    /// Produce the chapter's document in `store`. The caller owns the returned file
    /// and must call [FileStore::cleanup] for the job's key once done with it. On
    /// failure, everything written for the chapter is removed before returning.
    pub async fn run(&self, store: &FileStore, job: &ChapterJob) -> Result<ChapterDocument, PipelineError> {
        let result = self.process(store, job, None).await;
        if result.is_err() {
            store.cleanup(&job.key).await;
        }
        result
    }

    /// Run the chapter, send the document, and always clean up afterwards.
    ///
    /// Status messages are prefixed with `label` (e.g. `"Chapter 12: "`).
    pub async fn deliver(
        &self,
        session: &Session,
        store: &FileStore,
        job: &ChapterJob,
        label: &str,
    ) -> Result<ChapterDocument, PipelineError> {
        let status = session
            .say(&format!("{}Downloading, please wait...", label))
            .await;
        let result = self.process_and_send(session, store, job, status.as_ref()).await;
        store.cleanup(&job.key).await;

        match &result {
            Ok(doc) => {
                tracing::info!("delivered {} ({} pages)", job.key, doc.page_count);
                session
                    .update(
                        status.as_ref(),
                        &format!("{}Document file ready for download.", label),
                    )
                    .await;
                session.delete_later(status, READY_MESSAGE_TTL);
            }
            Err(PipelineError::NoImages { url }) => {
                tracing::warn!("no images at {}", url);
                session
                    .update(
                        status.as_ref(),
                        &format!("{}No images found, chapter skipped.", label),
                    )
                    .await;
            }
            Err(e) => {
                tracing::error!("chapter {} failed: {}", job.chapter_url, e);
                session
                    .update(status.as_ref(), &format!("{}Failed: {}", label, e))
                    .await;
            }
        }
        result
    }

    async fn process_and_send(
        &self,
        session: &Session,
        store: &FileStore,
        job: &ChapterJob,
        status: Option<&MessageRef>,
    ) -> Result<ChapterDocument, PipelineError> {
        let doc = self.process(store, job, Some((session, status))).await?;
        session.send_document(&doc.path, &doc.file_name()).await?;
        Ok(doc)
    }

    async fn process(
        &self,
        store: &FileStore,
        job: &ChapterJob,
        progress: Option<(&Session, Option<&MessageRef>)>,
    ) -> Result<ChapterDocument, PipelineError> {
        let (site, _) = resolve_site(job.chapter_url.as_str())?;
        let html = self
            .fetcher
            .get_text(job.chapter_url.as_str(), &HeaderMap::new())
            .await?;
        let urls = site.extract_image_urls(&html, &job.chapter_url);
        tracing::info!("{}: {} images on {}", job.key, urls.len(), job.chapter_url);
        let Some(first) = urls.first() else {
            return Err(PipelineError::NoImages {
                url: job.chapter_url.to_string(),
            });
        };
        let headers = site.request_headers(first);

        // Pages left over from an earlier attempt would end up in this document.
        store.remove_tree(&job.key).await?;
        download_all(self.fetcher.as_ref(), store, &urls, &job.key, &headers).await?;
        if let Some((session, status)) = progress {
            session
                .update(status, "Image downloading complete. Generating PDF...")
                .await;
        }

        let doc = self.assembler.build(store, &job.key).await?;
        if let Some((session, status)) = progress {
            session
                .update(status, "PDF generation complete. Sending document...")
                .await;
        }
        Ok(doc)
    }
}
