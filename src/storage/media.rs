//! Media storage on the local filesystem
//!
//! Handles validation, storage and removal of uploaded images.
//! Files are served from `/media` by the HTTP layer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::MediaConfig;
use crate::data::EntityId;
use crate::error::AppError;

/// Public URL prefix under which stored files are served
pub const PUBLIC_PREFIX: &str = "/media";

/// An uploaded file as received from the client
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// What an image is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    PostImage,
    Avatar,
}

impl MediaKind {
    fn dir(&self) -> &'static str {
        match self {
            MediaKind::PostImage => "posts",
            MediaKind::Avatar => "avatars",
        }
    }
}

/// Media storage service
///
/// Writes uploads under `<root>/<kind>/` with server-generated names and
/// returns their public URL.
pub struct MediaStorage {
    root: PathBuf,
    max_upload_bytes: usize,
    allowed_extensions: Vec<String>,
}

impl MediaStorage {
    /// Create the storage directories if needed.
    ///
    /// # Errors
    /// Returns error if the directories cannot be created
    pub async fn new(config: &MediaConfig) -> Result<Self, AppError> {
        for kind in [MediaKind::PostImage, MediaKind::Avatar] {
            let dir = config.root.join(kind.dir());
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                AppError::Storage(format!("failed to create {}: {}", dir.display(), e))
            })?;
        }

        Ok(Self {
            root: config.root.clone(),
            max_upload_bytes: config.max_upload_bytes,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|ext| ext.to_ascii_lowercase())
                .collect(),
        })
    }

    /// Root directory served under [`PUBLIC_PREFIX`].
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check an upload's extension and size.
    ///
    /// Returns the lowercase extension.
    pub fn validate(&self, upload: &UploadedFile) -> Result<String, AppError> {
        let extension = Path::new(&upload.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .filter(|ext| self.allowed_extensions.iter().any(|allowed| allowed == ext))
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "unsupported file type: {} (allowed: {})",
                    upload.file_name,
                    self.allowed_extensions.join(", ")
                ))
            })?;

        if upload.bytes.is_empty() {
            return Err(AppError::Validation(format!(
                "file is empty: {}",
                upload.file_name
            )));
        }
        if upload.bytes.len() > self.max_upload_bytes {
            return Err(AppError::Validation(format!(
                "file too large: {} ({} bytes, max {})",
                upload.file_name,
                upload.bytes.len(),
                self.max_upload_bytes
            )));
        }

        Ok(extension)
    }

    /// Validate and write an upload.
    ///
    /// # Returns
    /// Public URL of the stored file, e.g. `/media/posts/01ARZ3....png`
    pub async fn store(&self, kind: MediaKind, upload: &UploadedFile) -> Result<String, AppError> {
        let extension = self.validate(upload)?;
        let file_name = format!("{}.{}", EntityId::new().0.to_ascii_lowercase(), extension);
        let path = self.root.join(kind.dir()).join(&file_name);

        tokio::fs::write(&path, &upload.bytes)
            .await
            .map_err(|e| AppError::Storage(format!("failed to write {}: {}", path.display(), e)))?;

        tracing::debug!(path = %path.display(), bytes = upload.bytes.len(), "Stored upload");
        Ok(format!("{}/{}/{}", PUBLIC_PREFIX, kind.dir(), file_name))
    }

    /// Remove a stored file by its public URL.
    ///
    /// Missing files are not an error. URLs outside this storage are ignored.
    pub async fn remove(&self, url: &str) -> Result<(), AppError> {
        let Some(path) = self.path_for(url) else {
            tracing::debug!(url, "Not a stored media URL, skipping removal");
            return Ok(());
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(format!(
                "failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Map a public URL back to a file under the root.
    fn path_for(&self, url: &str) -> Option<PathBuf> {
        let rest = url.strip_prefix(PUBLIC_PREFIX)?.strip_prefix('/')?;
        let (dir, file_name) = rest.split_once('/')?;
        let kind = [MediaKind::PostImage, MediaKind::Avatar]
            .into_iter()
            .find(|kind| kind.dir() == dir)?;
        if file_name.is_empty() || file_name.contains(['/', '\\']) || file_name.starts_with('.') {
            return None;
        }
        Some(self.root.join(kind.dir()).join(file_name))
    }
}

/// Files written ahead of a database commit.
///
/// Unless [`PendingUploads::commit`] is called, dropping the guard removes
/// every file it stored. This covers failed commits as well as a request
/// future dropped between the write and the commit.
pub struct PendingUploads {
    storage: Arc<MediaStorage>,
    urls: Vec<String>,
}

impl PendingUploads {
    pub fn new(storage: Arc<MediaStorage>) -> Self {
        Self {
            storage,
            urls: Vec::new(),
        }
    }

    /// Write an upload and track it until commit.
    pub async fn store(&mut self, kind: MediaKind, upload: &UploadedFile) -> Result<String, AppError> {
        let url = self.storage.store(kind, upload).await?;
        self.urls.push(url.clone());
        Ok(url)
    }

    /// Public URLs of the files stored so far.
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Keep the files; they now belong to committed rows.
    pub fn commit(mut self) -> Vec<String> {
        std::mem::take(&mut self.urls)
    }
}

impl Drop for PendingUploads {
    fn drop(&mut self) {
        for url in self.urls.drain(..) {
            let Some(path) = self.storage.path_for(&url) else {
                continue;
            };
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!(url = %url, "Discarded uncommitted upload"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(url = %url, error = %e, "Failed to discard upload"),
            }
        }
    }
}
