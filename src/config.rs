//! Optional config file loading. Search order: ./chapterpdf.toml, then
//! $XDG_CONFIG_HOME/chapterpdf/config.toml (or ~/.config/chapterpdf/config.toml).

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::pdf::DEFAULT_WATERMARK;

pub const DEFAULT_REQUEST_DELAY_MS: u64 = 250;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CHAPTER_TIMEOUT_SECS: u64 = 90;

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Where chapter images and PDFs are staged while a request runs.
    pub storage_dir: Option<PathBuf>,
    /// Where delivered PDFs are copied. Paths are relative to CWD.
    pub output_dir: Option<PathBuf>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Minimum delay in milliseconds between requests.
    pub request_delay_ms: Option<u64>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Upper bound for one chapter of a range request, in seconds.
    pub chapter_timeout_secs: Option<u64>,
    /// Text stamped on every page. Empty disables the watermark.
    pub watermark: Option<String>,
}

/// Search order: (1) ./chapterpdf.toml, (2) $XDG_CONFIG_HOME/chapterpdf/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("chapterpdf.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("chapterpdf").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            let s = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
            let config: Config = toml::from_str(&s)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
            tracing::debug!("loaded config from {}", path.display());
            return Ok(Some(config));
        }
    }
    Ok(None)
}

/// Values given on the command line. They win over the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub storage_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub user_agent: Option<String>,
    pub request_delay_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub chapter_timeout_secs: Option<u64>,
}

/// Fully resolved settings, passed to the services that need them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub storage_dir: PathBuf,
    pub output_dir: PathBuf,
    pub user_agent: Option<String>,
    pub request_delay_ms: u64,
    pub timeout_secs: u64,
    pub chapter_timeout: Duration,
    pub watermark: String,
}

impl Settings {
    /// CLI overrides first, then the config file, then defaults.
    pub fn resolve(config: Option<&Config>, overrides: &Overrides) -> Self {
        let storage_dir = overrides
            .storage_dir
            .clone()
            .or_else(|| config.and_then(|c| c.storage_dir.clone()))
            .unwrap_or_else(default_storage_dir);
        let output_dir = overrides
            .output_dir
            .clone()
            .or_else(|| config.and_then(|c| c.output_dir.clone()))
            .unwrap_or_else(|| PathBuf::from("."));
        let user_agent = overrides
            .user_agent
            .clone()
            .or_else(|| config.and_then(|c| c.user_agent.clone()));
        let request_delay_ms = overrides
            .request_delay_ms
            .or_else(|| config.and_then(|c| c.request_delay_ms))
            .unwrap_or(DEFAULT_REQUEST_DELAY_MS);
        let timeout_secs = overrides
            .timeout_secs
            .or_else(|| config.and_then(|c| c.timeout_secs))
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let chapter_timeout_secs = overrides
            .chapter_timeout_secs
            .or_else(|| config.and_then(|c| c.chapter_timeout_secs))
            .unwrap_or(DEFAULT_CHAPTER_TIMEOUT_SECS);
        let watermark = config
            .and_then(|c| c.watermark.clone())
            .unwrap_or_else(|| DEFAULT_WATERMARK.to_string());
        Self {
            storage_dir,
            output_dir,
            user_agent,
            request_delay_ms,
            timeout_secs,
            chapter_timeout: Duration::from_secs(chapter_timeout_secs.max(1)),
            watermark,
        }
    }

    /// Per-series chapter indexes live next to the staged chapters.
    pub fn index_dir(&self) -> PathBuf {
        self.storage_dir.join("indexes")
    }
}

fn default_storage_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join("chapterpdf"))
        .unwrap_or_else(|| PathBuf::from("storage"))
}
