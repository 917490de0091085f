//! Per-call working directories
//!
//! Each `separate` call gets `<work_root>/<uuid>/`, with one subdirectory
//! per provider attempt. The guard removes the whole tree if the call is
//! dropped before it commits a result.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::storage::{FileStorage, Result};

pub(crate) struct AttemptDir {
    path: PathBuf,
    armed: bool,
}

impl AttemptDir {
    pub async fn create(storage: &dyn FileStorage, work_root: &Path) -> Result<Self> {
        let path = work_root.join(Uuid::new_v4().to_string());
        storage.make_dir(&path).await?;
        Ok(Self { path, armed: true })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory for one provider's attempt
    pub fn provider_dir(&self, provider: &str) -> PathBuf {
        self.path.join(provider)
    }

    /// Keep the directory; its files are now owned by the caller
    pub fn commit(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }

    /// Delete the directory through `storage`
    pub async fn remove(mut self, storage: &dyn FileStorage) {
        self.armed = false;
        if let Err(e) = storage.delete(&self.path).await {
            log::warn!("Failed to remove working directory {:?}: {}", self.path, e);
        }
    }
}

impl Drop for AttemptDir {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // Abandoned mid-call: no runtime guarantee here, so use blocking I/O
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => log::debug!("Removed abandoned working directory {:?}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "Failed to remove abandoned working directory {:?}: {}",
                self.path,
                e
            ),
        }
    }
}
