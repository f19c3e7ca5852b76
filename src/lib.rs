//! chapterpdf: download manga chapters from Asura Comics and Manganato and deliver
//! each chapter as a watermarked PDF.

pub mod cli;
pub mod config;
pub mod console;
pub mod download;
pub mod index;
pub mod logging;
pub mod model;
pub mod notify;
pub mod orchestrator;
pub mod pdf;
pub mod pipeline;
pub mod scraper;
pub mod store;

#[cfg(test)]
mod testing;

// Re-exports for CLI and consumers.
pub use index::{filter_range, resolve_index, IndexCache};
pub use model::{ChapterDocument, ChapterIndex, ChapterJob, RangeSummary};
pub use notify::{ChatRef, MessageRef, Notifier, NotifyError, Session};
pub use orchestrator::RangeOrchestrator;
pub use pdf::{AssemblyError, PdfAssembler};
pub use pipeline::{ChapterPipeline, PipelineError};
pub use scraper::{
    derive_key, resolve_site, trailing_number, Fetcher, PoliteClient, PoliteClientBuilder,
    ScraperError, Site,
};
pub use store::{FileStore, StoreError};
