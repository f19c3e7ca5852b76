//! CLI parsing and orchestration. Parses args, builds the services from settings,
//! runs one chapter, a chapter range, or an index listing. Maps errors to exit codes.

use crate::config::{self, Overrides, Settings};
use crate::console::ConsoleNotifier;
use crate::index::{resolve_index, series_name, IndexCache, IndexCacheError};
use crate::model::{ChapterIndex, ChapterJob};
use crate::notify::{ChatRef, Session};
use crate::orchestrator::RangeOrchestrator;
use crate::pdf::PdfAssembler;
use crate::pipeline::{ChapterPipeline, PipelineError};
use crate::scraper::{resolve_site, trailing_number, ScraperError, Site};
use crate::store::{FileStore, StoreError};
use crate::PoliteClient;
use clap::{Parser, Subcommand};
use reqwest::Url;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Scraper(#[from] ScraperError),

    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Index(#[from] IndexCacheError),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) | CliRunError::Pipeline(PipelineError::Validation(_)) => 1,
            CliRunError::Pipeline(PipelineError::Delivery(_))
            | CliRunError::Store(_)
            | CliRunError::Index(_) => 3,
            CliRunError::Scraper(_) | CliRunError::Pipeline(_) => 2,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "chapterpdf")]
#[command(about = "Download manga chapters from Asura Comics or Manganato as PDF files")]
#[command(
    after_help = "Config file keys (storage_dir, output_dir, user_agent, request_delay_ms, timeout_secs, chapter_timeout_secs, watermark) are read from ./chapterpdf.toml or the user config directory. CLI flags override config."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Directory for finished PDFs (overrides config; default: current directory).
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Directory for staged images and PDFs while a request runs (overrides config).
    #[arg(long, global = true)]
    pub storage_dir: Option<PathBuf>,

    /// HTTP User-Agent (overrides config).
    #[arg(long, global = true)]
    pub user_agent: Option<String>,

    /// Delay between requests in milliseconds (overrides config; default 250).
    #[arg(long, global = true)]
    pub delay: Option<u64>,

    /// Request timeout in seconds (overrides config; default 30).
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Per-chapter time limit for ranges, in seconds (overrides config; default 90).
    #[arg(long, global = true)]
    pub chapter_timeout: Option<u64>,

    /// Suppress progress output (errors only).
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print verbose error chain and debug logs.
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download one chapter as a PDF.
    Chapter {
        /// Chapter page URL.
        url: String,
    },
    /// Download a span of chapters from a series, one PDF per chapter.
    Range {
        /// Series page URL.
        url: String,
        /// First chapter, or the whole range as `start-end` / `start->end`.
        start: String,
        /// Last chapter (inclusive).
        end: Option<String>,
    },
    /// List the chapters of a series with their numbers.
    Index {
        /// Series page URL.
        url: String,
        /// Print the index saved by the last range or index run instead of fetching.
        #[arg(long)]
        cached: bool,
    },
}

impl Args {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            storage_dir: self.storage_dir.clone(),
            output_dir: self.output.clone(),
            user_agent: self.user_agent.clone(),
            request_delay_ms: self.delay,
            timeout_secs: self.timeout,
            chapter_timeout_secs: self.chapter_timeout,
        }
    }
}

/// Parse `from-to` or `from->to` (1-based, inclusive).
fn parse_chapter_range(s: &str) -> Result<(u32, u32), String> {
    let s = s.trim();
    let (from_str, to_str) = s
        .split_once("->")
        .or_else(|| s.split_once('-'))
        .ok_or_else(|| {
            format!(
                "Invalid range: expected 'from-to' or 'from->to' (e.g. 1-10), got '{}'",
                s
            )
        })?;
    let from = parse_chapter_number(from_str, "start")?;
    let to = parse_chapter_number(to_str, "end")?;
    check_bounds(from, to)?;
    Ok((from, to))
}

fn parse_chapter_number(s: &str, which: &str) -> Result<u32, String> {
    let s = s.trim();
    s.parse()
        .map_err(|_| format!("Invalid range: '{}' is not a valid {} chapter number", s, which))
}

fn check_bounds(from: u32, to: u32) -> Result<(), String> {
    if from == 0 {
        return Err("Invalid range: chapter numbers start at 1".to_string());
    }
    if from > to {
        return Err(format!(
            "Invalid range: start ({}) must be <= end ({})",
            from, to
        ));
    }
    Ok(())
}

/// Bounds from `range <url> <start> [end]`.
fn range_bounds(start: &str, end: Option<&str>) -> Result<(u32, u32), String> {
    match end {
        None => parse_chapter_range(start),
        Some(end) => {
            let from = parse_chapter_number(start, "start")?;
            let to = parse_chapter_number(end, "end")?;
            check_bounds(from, to)?;
            Ok((from, to))
        }
    }
}

/// Resolve the site or explain which URLs are accepted.
fn check_url(url: &str) -> Result<(Site, Url), CliRunError> {
    resolve_site(url).map_err(|e| match &e {
        ScraperError::InvalidUrl { input, reason } => CliRunError::InvalidInput(format!(
            "Invalid URL. Please provide a valid Asura Comics or Manganato URL. Invalid: {}: {}",
            input, reason
        )),
        ScraperError::UnrecognizedHost { host } => CliRunError::InvalidInput(format!(
            "Unsupported site: {}. Provide an Asura Comics or Manganato URL.",
            host
        )),
        _ => CliRunError::Scraper(e),
    })
}

fn build_client(settings: &Settings) -> Result<PoliteClient, CliRunError> {
    let mut builder = PoliteClient::builder()
        .delay_ms(settings.request_delay_ms)
        .timeout_secs(settings.timeout_secs);
    if let Some(ua) = &settings.user_agent {
        builder = builder.user_agent(ua.clone());
    }
    builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))
}

fn print_index(index: &ChapterIndex) {
    for raw in &index.chapter_urls {
        let number = Url::parse(raw)
            .ok()
            .and_then(|u| trailing_number(&u))
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{}\t{}", number, raw);
    }
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub async fn run(args: &Args) -> Result<(), CliRunError> {
    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let settings = Settings::resolve(config.as_ref(), &args.overrides());
    tracing::debug!("settings: {:?}", settings);

    match &args.command {
        Command::Chapter { url } => {
            let (_, url) = check_url(url)?;
            let client = build_client(&settings)?;
            let console = Arc::new(ConsoleNotifier::new(&settings.output_dir, args.quiet));
            let session = Session::new(console.clone(), ChatRef("console".to_string()));
            let store = FileStore::new(&settings.storage_dir).scoped(&session.chat().scope())?;
            let pipeline =
                ChapterPipeline::new(Arc::new(client), PdfAssembler::new(&settings.watermark));

            let result = pipeline
                .deliver(&session, &store, &ChapterJob::new(url), "")
                .await;
            console.finish_all();
            let doc = result?;
            if !args.quiet {
                eprintln!("{} pages", doc.page_count);
            }
        }
        Command::Range { url, start, end } => {
            let (start, end) =
                range_bounds(start, end.as_deref()).map_err(CliRunError::InvalidInput)?;
            check_url(url)?;
            let client = build_client(&settings)?;
            let console = Arc::new(ConsoleNotifier::new(&settings.output_dir, args.quiet));
            let session = Session::new(console.clone(), ChatRef("console".to_string()));
            let store = FileStore::new(&settings.storage_dir).scoped(&session.chat().scope())?;
            let pipeline =
                ChapterPipeline::new(Arc::new(client), PdfAssembler::new(&settings.watermark));
            let orchestrator = RangeOrchestrator::new(Arc::new(pipeline))
                .with_index_cache(IndexCache::new(settings.index_dir()))
                .with_chapter_timeout(settings.chapter_timeout);

            let result = orchestrator.run(&session, &store, url, start, end).await;
            console.finish_all();
            let summary = result?;
            if args.quiet {
                eprintln!("{}", summary.describe());
            }
        }
        Command::Index { url, cached } => {
            let (site, parsed) = check_url(url)?;
            let cache = IndexCache::new(settings.index_dir());
            let index = if *cached {
                let name = series_name(site, &parsed);
                cache.load(&name).await?.ok_or_else(|| {
                    CliRunError::InvalidInput(format!(
                        "No saved index for {}. Run without --cached first.",
                        url
                    ))
                })?
            } else {
                let client = build_client(&settings)?;
                let index = resolve_index(&client, url).await?;
                cache.save(&index).await?;
                index
            };
            print_index(&index);
            if !args.quiet {
                eprintln!("{}: {} chapters", index.series_name, index.chapter_urls.len());
            }
        }
    }
    Ok(())
}
