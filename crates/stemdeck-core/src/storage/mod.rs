//! File storage capability
//!
//! Separation providers and chord analysis reach the file system only through
//! [`FileStorage`], so tests and alternative platforms can swap the backing
//! store. [`LocalStorage`] is the `tokio::fs` + `reqwest` implementation.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Errors from storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to {op} {path}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Download from {url} failed")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Download incomplete: expected {expected} bytes, got {actual}")]
    Incomplete { expected: u64, actual: u64 },
}

impl StorageError {
    fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// File system operations used by the separation pipeline
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Create a directory and any missing parents
    async fn make_dir(&self, path: &Path) -> Result<()>;

    /// Copy a file
    async fn copy(&self, src: &Path, dst: &Path) -> Result<()>;

    /// Write bytes to a file, replacing it
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Read a whole file
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Download `url` into `dest`
    ///
    /// Returns the HTTP status. Nothing is written unless the status is a
    /// success; callers decide what a non-success status means.
    async fn download(&self, url: &str, dest: &Path) -> Result<u16>;

    /// Delete a file or directory tree; deleting a missing path succeeds
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Whether the path exists
    async fn exists(&self, path: &Path) -> bool;
}

/// Local file system storage
pub struct LocalStorage {
    client: reqwest::Client,
}

impl LocalStorage {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for LocalStorage {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl FileStorage for LocalStorage {
    async fn make_dir(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| StorageError::io("create directory", path, e))
    }

    async fn copy(&self, src: &Path, dst: &Path) -> Result<()> {
        tokio::fs::copy(src, dst)
            .await
            .map(|_| ())
            .map_err(|e| StorageError::io("copy", src, e))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        tokio::fs::write(path, data)
            .await
            .map_err(|e| StorageError::io("write", path, e))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| StorageError::io("read", path, e))
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u16> {
        let download_err = |source| StorageError::Download {
            url: url.to_string(),
            source,
        };

        log::debug!("Downloading {} to {:?}", url, dest);
        let mut response = self.client.get(url).send().await.map_err(download_err)?;
        let status = response.status();
        if !status.is_success() {
            return Ok(status.as_u16());
        }

        let content_length = response.content_length();
        let temp_path = dest.with_extension("tmp");
        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| StorageError::io("create", &temp_path, e))?;

        let mut downloaded: u64 = 0;
        let body = async {
            while let Some(chunk) = response.chunk().await.map_err(download_err)? {
                file.write_all(&chunk)
                    .await
                    .map_err(|e| StorageError::io("write", &temp_path, e))?;
                downloaded += chunk.len() as u64;
            }
            file.flush()
                .await
                .map_err(|e| StorageError::io("flush", &temp_path, e))
        };

        if let Err(e) = body.await {
            tokio::fs::remove_file(&temp_path).await.ok();
            return Err(e);
        }
        drop(file);

        if let Some(expected) = content_length {
            if downloaded != expected {
                tokio::fs::remove_file(&temp_path).await.ok();
                return Err(StorageError::Incomplete {
                    expected,
                    actual: downloaded,
                });
            }
        }

        tokio::fs::rename(&temp_path, dest)
            .await
            .map_err(|e| StorageError::io("rename", &temp_path, e))?;

        log::debug!("Downloaded {:?} ({} bytes)", dest.file_name().unwrap_or_default(), downloaded);
        Ok(status.as_u16())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StorageError::io("inspect", path, e)),
        };
        let result = if metadata.is_dir() {
            tokio::fs::remove_dir_all(path).await
        } else {
            tokio::fs::remove_file(path).await
        };
        result.map_err(|e| StorageError::io("delete", path, e))
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}
