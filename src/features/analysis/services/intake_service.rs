use std::sync::Arc;
use tracing::{info, warn};

use crate::core::config::StorageConfig;
use crate::core::error::{AppError, Result};
use crate::features::analysis::models::{Analysis, NewAnalysis};
use crate::features::analysis::services::AnalysisService;
use crate::features::audit::models::AuditAction;
use crate::features::audit::AuditService;
use crate::features::auth::model::CurrentUser;
use crate::modules::recognition::metadata::{self, FileMetadata};
use crate::modules::recognition::RecognitionPipeline;
use crate::modules::storage::LocalStorage;
use crate::shared::validation::{allowed_extension, secure_filename};

/// A file field read from a multipart upload
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Validates, stores and analyzes uploaded files
pub struct IntakeService {
    storage: LocalStorage,
    allowed_extensions: Vec<String>,
    max_content_length: usize,
    pipeline: RecognitionPipeline,
    analyses: Arc<AnalysisService>,
    audit: Arc<AuditService>,
}

impl IntakeService {
    pub fn new(
        config: &StorageConfig,
        pipeline: RecognitionPipeline,
        analyses: Arc<AnalysisService>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            storage: LocalStorage::new(config),
            allowed_extensions: config.allowed_extensions.clone(),
            max_content_length: config.max_content_length,
            pipeline,
            analyses,
            audit,
        }
    }

    pub fn storage(&self) -> &LocalStorage {
        &self.storage
    }

    /// Check an upload and return the sanitized filename.
    ///
    /// Nothing is written when this fails.
    pub fn validate(&self, file: Option<&UploadedFile>) -> Result<String> {
        let file = file.ok_or_else(|| AppError::BadRequest("No file uploaded".to_string()))?;

        if file.filename.trim().is_empty() {
            return Err(AppError::BadRequest("Empty filename".to_string()));
        }
        if file.bytes.is_empty() {
            return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
        }
        // The body limit leaves room for multipart framing, so check the file itself
        if file.bytes.len() > self.max_content_length {
            return Err(AppError::PayloadTooLarge("File too large".to_string()));
        }
        if !allowed_extension(&file.filename, &self.allowed_extensions) {
            return Err(AppError::BadRequest("File type not allowed".to_string()));
        }

        let sanitized = secure_filename(&file.filename);
        // A stem made only of non-ASCII leaves just the extension behind
        if sanitized.is_empty() || !allowed_extension(&sanitized, &self.allowed_extensions) {
            return Err(AppError::BadRequest("Invalid filename".to_string()));
        }

        Ok(sanitized)
    }

    /// Store a validated upload and create its pending analysis
    pub async fn accept(&self, user: &CurrentUser, file: UploadedFile) -> Result<Analysis> {
        let sanitized = self.validate(Some(&file))?;
        let stored_name = self.storage.stored_name(&sanitized);

        let meta = inspect_blocking(file.bytes.clone(), stored_name.clone()).await;
        self.storage.save_upload(&stored_name, &file.bytes).await?;

        let new = NewAnalysis {
            user_id: user.id,
            filename: stored_name.clone(),
            file_type: meta.mime_type.clone(),
            dimensions: meta.dimensions_label(),
            image_url: LocalStorage::upload_url(&stored_name),
            lat: meta.gps.map(|(lat, _)| lat),
            lng: meta.gps.map(|(_, lng)| lng),
            exif: meta.exif_json(),
        };

        let analysis = match self.analyses.create_pending(&new).await {
            Ok(analysis) => analysis,
            Err(e) => {
                self.storage.remove_upload(&stored_name).await;
                return Err(e);
            }
        };

        info!(
            "Upload accepted: analysis_id={}, user_id={}, type={}, size={}",
            analysis.id,
            user.id,
            meta.mime_type,
            file.bytes.len()
        );

        Ok(analysis)
    }

    /// Run recognition on a pending analysis and record the outcome.
    ///
    /// Adapter failures end in a `failed` analysis, never in an error.
    pub async fn run_analysis(&self, analysis: &Analysis) -> Result<Analysis> {
        if analysis.status.is_finished() {
            return Err(AppError::Conflict(format!(
                "Analysis {} is already {}",
                analysis.id, analysis.status
            )));
        }

        let path = self.storage.upload_path(&analysis.filename);
        let mime_type = analysis.file_type.as_deref().unwrap_or("unknown");

        let outcome = self.pipeline.analyze(&path, mime_type).await;
        let preview_url = if mime_type.starts_with("image/") {
            self.write_preview(&analysis.filename).await
        } else {
            None
        };

        let finished = self
            .analyses
            .finish(analysis.id, &outcome, preview_url.as_deref())
            .await?;

        let (action, detail) = if outcome.failed() {
            (AuditAction::AnalysisFailed, outcome.errors.join("; "))
        } else {
            (
                AuditAction::AnalysisCompleted,
                format!("Analysis {} completed via {}", finished.id, outcome.method),
            )
        };
        self.audit.record(finished.user_id, action, &detail).await?;

        Ok(finished)
    }

    /// Accept an upload and, unless deferred, analyze it right away
    pub async fn upload(
        &self,
        user: &CurrentUser,
        file: Option<UploadedFile>,
        analyze: bool,
    ) -> Result<Analysis> {
        let file = file.ok_or_else(|| AppError::BadRequest("No file uploaded".to_string()))?;
        let analysis = self.accept(user, file).await?;

        if analyze {
            self.run_analysis(&analysis).await
        } else {
            Ok(analysis)
        }
    }

    async fn write_preview(&self, stored_name: &str) -> Option<String> {
        let preview_name = LocalStorage::preview_name(stored_name);
        let destination = match self.storage.prepare_result(&preview_name).await {
            Ok(path) => path,
            Err(e) => {
                warn!("Skipping preview for {}: {}", stored_name, e);
                return None;
            }
        };
        let source = self.storage.upload_path(stored_name);

        let written = tokio::task::spawn_blocking(move || {
            metadata::write_preview(&source, &destination)
        })
        .await;

        match written {
            Ok(Ok(())) => Some(LocalStorage::results_url(&preview_name)),
            Ok(Err(e)) => {
                warn!("Failed to write preview for {}: {:#}", stored_name, e);
                None
            }
            Err(e) => {
                warn!("Preview task for {} panicked: {}", stored_name, e);
                None
            }
        }
    }
}

/// Metadata parsing decodes image headers and EXIF; keep it off the runtime
async fn inspect_blocking(bytes: Vec<u8>, filename: String) -> FileMetadata {
    let fallback = filename.clone();
    tokio::task::spawn_blocking(move || metadata::inspect(&bytes, &filename))
        .await
        .unwrap_or_else(|e| {
            warn!("Metadata task failed: {}", e);
            FileMetadata {
                mime_type: metadata::detect_mime(&[], &fallback),
                dimensions: None,
                gps: None,
                exif: Default::default(),
            }
        })
}
