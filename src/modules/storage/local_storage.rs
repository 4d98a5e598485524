//! Local filesystem storage client
//!
//! Originals go to the uploads directory, generated previews to the results
//! directory. Both are exposed by the router under `/static`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::config::StorageConfig;
use crate::core::error::AppError;

pub const UPLOADS_URL_PREFIX: &str = "/static/uploads";
pub const RESULTS_URL_PREFIX: &str = "/static/results";

#[derive(Debug, Clone)]
pub struct LocalStorage {
    upload_dir: PathBuf,
    results_dir: PathBuf,
    unique_filenames: bool,
}

impl LocalStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            upload_dir: config.upload_dir.clone(),
            results_dir: config.results_dir.clone(),
            unique_filenames: config.unique_filenames,
        }
    }

    /// Create the uploads and results directories if missing
    pub async fn ensure_dirs(&self) -> Result<(), AppError> {
        if !self.unique_filenames {
            warn!("UNIQUE_FILENAMES is off: uploads reusing a stored name are rejected");
        }
        for dir in [&self.upload_dir, &self.results_dir] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                AppError::Internal(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        info!(
            "Storage directories ready: uploads={}, results={}",
            self.upload_dir.display(),
            self.results_dir.display()
        );
        Ok(())
    }

    /// Name a sanitized upload is stored under
    pub fn stored_name(&self, sanitized: &str) -> String {
        if self.unique_filenames {
            format!("{}_{}", Uuid::new_v4().simple(), sanitized)
        } else {
            sanitized.to_string()
        }
    }

    /// Write a new upload, creating the directory on demand.
    ///
    /// Existing files are never replaced: a name that is already taken
    /// yields `Conflict`, so a failed upload only ever removes its own file.
    pub async fn save_upload(&self, stored_name: &str, bytes: &[u8]) -> Result<PathBuf, AppError> {
        tokio::fs::create_dir_all(&self.upload_dir)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create upload dir: {}", e)))?;

        let path = self.upload_path(stored_name);
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                warn!("Refusing to overwrite existing upload {}", path.display());
                return Err(AppError::Conflict(format!(
                    "A file named {} already exists",
                    stored_name
                )));
            }
            Err(e) => {
                return Err(AppError::Internal(format!(
                    "Failed to create {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let written = async {
            file.write_all(bytes).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = written {
            drop(file);
            self.remove_upload(stored_name).await;
            return Err(AppError::Internal(format!(
                "Failed to write {}: {}",
                path.display(),
                e
            )));
        }

        debug!("Stored upload {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    /// Best-effort removal of an upload whose row could not be written
    pub async fn remove_upload(&self, stored_name: &str) {
        let path = self.upload_path(stored_name);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            debug!("Could not remove {}: {}", path.display(), e);
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    pub fn upload_path(&self, stored_name: &str) -> PathBuf {
        self.upload_dir.join(stored_name)
    }

    pub fn upload_url(stored_name: &str) -> String {
        format!("{}/{}", UPLOADS_URL_PREFIX, stored_name)
    }

    /// `photo.jpg` previews as `photo_preview.png`
    pub fn preview_name(stored_name: &str) -> String {
        let stem = Path::new(stored_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(stored_name);
        format!("{}_preview.png", stem)
    }

    /// Create the results directory and return where `name` goes inside it
    pub async fn prepare_result(&self, name: &str) -> Result<PathBuf, AppError> {
        tokio::fs::create_dir_all(&self.results_dir)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create results dir: {}", e)))?;
        Ok(self.results_path(name))
    }

    pub fn results_path(&self, name: &str) -> PathBuf {
        self.results_dir.join(name)
    }

    pub fn results_url(name: &str) -> String {
        format!("{}/{}", RESULTS_URL_PREFIX, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_helpers::test_storage_config;

    #[test]
    fn test_stored_name_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_storage_config(dir.path());

        let storage = LocalStorage::new(&config);
        let name = storage.stored_name("photo.png");
        assert!(name.ends_with("_photo.png"));
        assert_eq!(name.len(), 32 + 1 + "photo.png".len());
        assert_ne!(name, storage.stored_name("photo.png"));

        config.unique_filenames = false;
        assert_eq!(LocalStorage::new(&config).stored_name("photo.png"), "photo.png");
    }

    #[test]
    fn test_urls_and_preview_name() {
        assert_eq!(LocalStorage::upload_url("a.png"), "/static/uploads/a.png");
        assert_eq!(LocalStorage::results_url("a_preview.png"), "/static/results/a_preview.png");
        assert_eq!(LocalStorage::preview_name("abc_photo.jpg"), "abc_photo_preview.png");
        assert_eq!(LocalStorage::preview_name("noext"), "noext_preview.png");
    }

    #[tokio::test]
    async fn test_save_upload_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(&test_storage_config(dir.path()));
        assert!(!storage.upload_dir().exists());

        let path = storage.save_upload("x.png", b"data").await.unwrap();
        assert_eq!(path, dir.path().join("uploads").join("x.png"));
        assert_eq!(std::fs::read(&path).unwrap(), b"data");

        storage.remove_upload("x.png").await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_save_upload_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_storage_config(dir.path());
        config.unique_filenames = false;
        let storage = LocalStorage::new(&config);

        let name = storage.stored_name("photo.png");
        let path = storage.save_upload(&name, b"first").await.unwrap();

        let second = storage.save_upload(&storage.stored_name("photo.png"), b"second").await;
        assert!(matches!(second, Err(AppError::Conflict(_))));
        assert_eq!(std::fs::read(&path).unwrap(), b"first");
    }
}
