//! Best-effort page image download into the file store.

use reqwest::header::HeaderMap;
use reqwest::Url;

use crate::scraper::Fetcher;
use crate::store::{sequenced_name, FileStore, StoreError};

/// A page image written to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub source_url: String,
    pub file_name: String,
    pub size: u64,
}

fn basename(url: &Url) -> &str {
    url.path_segments()
        .and_then(|mut s| s.next_back())
        .unwrap_or("")
}

/// Download `urls` in order into `dest_key`, one at a time.
///
/// Never fails as a whole: an image that cannot be fetched or written is logged and
/// left out. The only hard error is being unable to create the destination directory.
pub async fn download_all(
    fetcher: &dyn Fetcher,
    store: &FileStore,
    urls: &[Url],
    dest_key: &str,
    headers: &HeaderMap,
) -> Result<Vec<StoredImage>, StoreError> {
    store.ensure_dir(dest_key).await?;
    let mut stored = Vec::with_capacity(urls.len());
    for (seq, url) in urls.iter().enumerate() {
        let file_name = sequenced_name(seq, basename(url));
        let body = match fetcher.get(url.as_str(), headers).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("image {} of {}: {}. Skipped.", seq + 1, dest_key, e);
                continue;
            }
        };
        match store.write_stream(dest_key, &file_name, body).await {
            Ok(size) => {
                tracing::debug!("downloaded {}/{} ({} bytes)", dest_key, file_name, size);
                stored.push(StoredImage {
                    source_url: url.to_string(),
                    file_name,
                    size,
                });
            }
            Err(e) => tracing::warn!("image {} of {}: {}. Skipped.", seq + 1, dest_key, e),
        }
    }
    tracing::info!(
        "downloaded {}/{} images for {}",
        stored.len(),
        urls.len(),
        dest_key
    );
    Ok(stored)
}
