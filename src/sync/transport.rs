//! Transports move the store file to and from shared storage
//!
//! A transport fetches the remote copy into a temporary location, hands it to
//! the merge callback together with the local store, and uploads the
//! reconciled local store only when the merge succeeded.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{Result, SyncError};

/// Merge callback: `(local, cached, remote) -> success`
pub type MergeFn = dyn Fn(&Path, &Path, &Path) -> bool + Send + Sync;

/// Default name of the shared store file
pub const DEFAULT_REMOTE_NAME: &str = "readsync.sqlite3";

/// Moves the local store to/from a shared destination
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the remote snapshot, call `on_merge`, then upload the local store.
    ///
    /// `silent` marks background sessions; transports should not surface
    /// their own UI for those.
    async fn sync(
        &self,
        destination: &str,
        local_store: &Path,
        on_merge: &MergeFn,
        silent: bool,
    ) -> Result<()>;
}

/// Transport over a directory every device can reach (network mount, synced folder)
pub struct FolderTransport {
    remote_name: String,
    cache_dir: PathBuf,
}

impl FolderTransport {
    /// `cache_dir` keeps a copy of the last snapshot exchanged by this device
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            remote_name: DEFAULT_REMOTE_NAME.to_string(),
            cache_dir: cache_dir.into(),
        }
    }

    /// Use a different file name inside the destination
    pub fn with_remote_name(mut self, name: impl Into<String>) -> Self {
        self.remote_name = name.into();
        self
    }

    /// Path of the shared file for `destination`
    pub fn remote_path(&self, destination: &str) -> PathBuf {
        Path::new(destination).join(&self.remote_name)
    }

    fn cached_path(&self) -> PathBuf {
        self.cache_dir.join(format!("{}.cached", self.remote_name))
    }

    /// Copy the remote file into a fresh temp file; an absent remote yields an empty file
    async fn download(&self, remote: &Path) -> Result<tempfile::NamedTempFile> {
        let incoming = tempfile::Builder::new()
            .prefix("readsync-incoming-")
            .suffix(".sqlite3")
            .tempfile_in(&self.cache_dir)?;

        if tokio::fs::try_exists(remote).await? {
            let bytes = tokio::fs::copy(remote, incoming.path())
                .await
                .map_err(|e| SyncError::Transport(format!("download failed: {}", e)))?;
            tracing::debug!("Downloaded {} bytes from {}", bytes, remote.display());
        } else {
            tracing::info!("No remote store at {} yet, first upload", remote.display());
        }
        Ok(incoming)
    }

    /// Replace the remote file atomically with the local store
    async fn upload(&self, local: &Path, remote: &Path, dest_dir: &Path) -> Result<u64> {
        let staging = tempfile::Builder::new()
            .prefix(".readsync-upload-")
            .tempfile_in(dest_dir)
            .map_err(|e| SyncError::Transport(format!("cannot stage upload: {}", e)))?;

        let bytes = tokio::fs::copy(local, staging.path())
            .await
            .map_err(|e| SyncError::Transport(format!("upload failed: {}", e)))?;

        staging
            .persist(remote)
            .map_err(|e| SyncError::Transport(format!("cannot replace remote: {}", e.error)))?;
        Ok(bytes)
    }
}

#[async_trait]
impl Transport for FolderTransport {
    async fn sync(
        &self,
        destination: &str,
        local_store: &Path,
        on_merge: &MergeFn,
        silent: bool,
    ) -> Result<()> {
        let dest_dir = Path::new(destination);
        if !tokio::fs::try_exists(dest_dir).await.unwrap_or(false) {
            return Err(SyncError::Transport(format!(
                "destination {} is not reachable",
                dest_dir.display()
            )));
        }
        tokio::fs::create_dir_all(&self.cache_dir).await?;

        let remote = self.remote_path(destination);
        let cached = self.cached_path();
        let incoming = self.download(&remote).await?;

        if !on_merge(local_store, &cached, incoming.path()) {
            // Keep the shared copy untouched when the local store is unusable
            return Err(SyncError::LocalStoreInvalid(format!(
                "merge into {} failed, upload skipped",
                local_store.display()
            )));
        }

        let bytes = self.upload(local_store, &remote, dest_dir).await?;
        tokio::fs::copy(local_store, &cached).await?;

        if silent {
            tracing::debug!("Uploaded {} bytes to {}", bytes, remote.display());
        } else {
            tracing::info!("Uploaded {} bytes to {}", bytes, remote.display());
        }
        Ok(())
    }
}
