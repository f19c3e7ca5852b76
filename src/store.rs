//! Temporary on-disk storage for downloaded pages and produced documents.
//!
//! Layout under the store root: one directory per key holding the page files, and
//! `<key>.pdf` next to it. Page files carry a zero-padded sequence prefix
//! (`0007-page.jpg`) and [FileStore::list] orders by that number, so enumeration
//! always matches download order.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Errors from the file store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid storage key {key:?}: must be a single non-empty path component")]
    InvalidKey { key: String },

    #[error("Storage I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed while streaming {path}: {source}")]
    Source {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// File name for the `seq`-th page (0-based) of a chapter, keeping the source basename.
pub fn sequenced_name(seq: usize, basename: &str) -> String {
    let clean: String = basename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let clean = clean.trim_start_matches('.');
    if clean.is_empty() {
        format!("{:04}", seq)
    } else {
        format!("{:04}-{}", seq, clean)
    }
}

fn sequence_of(name: &str) -> Option<u64> {
    let digits: String = name.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn check_key(key: &str) -> Result<(), StoreError> {
    let bad = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains('/')
        || key.contains('\\')
        || key.contains('\0');
    if bad {
        return Err(StoreError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

/// Key-addressed directory store rooted at a base directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// A store nested under `scope`, so concurrent requests never share keys.
    pub fn scoped(&self, scope: &str) -> Result<FileStore, StoreError> {
        check_key(scope)?;
        Ok(FileStore::new(self.root.join(scope)))
    }

    pub fn dir_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        check_key(key)?;
        Ok(self.root.join(key))
    }

    /// Path of the document produced for `key`.
    pub fn document_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        check_key(key)?;
        Ok(self.root.join(format!("{}.pdf", key)))
    }

    pub async fn ensure_dir(&self, key: &str) -> Result<PathBuf, StoreError> {
        let dir = self.dir_path(key)?;
        tokio::fs::create_dir_all(&dir).await.map_err(io_err(&dir))?;
        Ok(dir)
    }

    pub async fn write(&self, key: &str, name: &str, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        check_key(name)?;
        let dir = self.ensure_dir(key).await?;
        let path = dir.join(name);
        tokio::fs::write(&path, bytes).await.map_err(io_err(&path))?;
        Ok(path)
    }

    /// Write a streamed body to `key/name`. Returns the byte count. A failed stream
    /// leaves no partial file behind.
    pub async fn write_stream<S, E>(&self, key: &str, name: &str, stream: S) -> Result<u64, StoreError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: std::error::Error + Send + Sync + 'static,
    {
        check_key(name)?;
        let dir = self.ensure_dir(key).await?;
        let path = dir.join(name);
        let result = copy_stream(&path, stream).await;
        if result.is_err() {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("could not remove partial file {}: {}", path.display(), e);
                }
            }
        }
        result
    }

    /// File names under `key`, ordered by their sequence prefix.
    pub async fn list(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.dir_path(key)?;
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(io_err(&dir))?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err(&dir))? {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if is_file {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort_by(|a, b| {
            sequence_of(a)
                .unwrap_or(u64::MAX)
                .cmp(&sequence_of(b).unwrap_or(u64::MAX))
                .then_with(|| a.cmp(b))
        });
        Ok(names)
    }

    /// Contents of every file under `key`, in [FileStore::list] order.
    pub async fn read_all(&self, key: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let dir = self.dir_path(key)?;
        let mut out = Vec::new();
        for name in self.list(key).await? {
            let path = dir.join(&name);
            let bytes = tokio::fs::read(&path).await.map_err(io_err(&path))?;
            out.push((name, bytes));
        }
        Ok(out)
    }

    /// Remove the directory for `key`. Missing directories are not an error.
    pub async fn remove_tree(&self, key: &str) -> Result<(), StoreError> {
        let dir = self.dir_path(key)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(io_err(&dir)(e)),
            _ => Ok(()),
        }
    }

    /// Remove a single file. Missing files are not an error.
    pub async fn remove_file(&self, path: &Path) -> Result<(), StoreError> {
        match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(io_err(path)(e)),
            _ => Ok(()),
        }
    }

    /// Remove everything stored for `key` (page directory and document), logging failures.
    pub async fn cleanup(&self, key: &str) {
        if let Err(e) = self.remove_tree(key).await {
            tracing::warn!("cleanup: {}", e);
        }
        match self.document_path(key) {
            Ok(doc) => {
                if let Err(e) = self.remove_file(&doc).await {
                    tracing::warn!("cleanup: {}", e);
                }
            }
            Err(e) => tracing::warn!("cleanup: {}", e),
        }
        tracing::debug!("cleaned up {}", key);
    }
}

async fn copy_stream<S, E>(path: &Path, mut stream: S) -> Result<u64, StoreError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut file = tokio::fs::File::create(path).await.map_err(io_err(path))?;
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| StoreError::Source {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        file.write_all(&chunk).await.map_err(io_err(path))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(io_err(path))?;
    Ok(written)
}
