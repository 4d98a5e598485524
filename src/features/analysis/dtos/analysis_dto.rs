use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::features::analysis::models::{Analysis, AnalysisStatus};

/// Schema for upload multipart form (OpenAPI documentation only).
/// The actual handler uses axum's Multipart extractor directly.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct UploadAnalysisDto {
    /// The image to analyze
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
    /// Run recognition immediately: "true" (default) or "false"
    #[schema(example = "true")]
    pub analyze: Option<String>,
}

/// Response DTO for an analysis
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnalysisResponseDto {
    pub id: i64,
    pub user_id: i64,
    pub filename: String,
    pub file_type: Option<String>,
    pub dimensions: Option<String>,
    pub extracted_text: Option<String>,
    pub detected_objects: Vec<String>,
    pub image_url: Option<String>,
    pub preview_url: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// EXIF tags of the uploaded image, keyed by tag name
    pub exif: BTreeMap<String, String>,
    pub confidence: Option<f64>,
    pub status: AnalysisStatus,
    pub method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Stored object lists are comma-joined labels; a failed run stores the
/// error message instead, which is reported as-is.
pub fn split_objects(stored: Option<&str>, status: AnalysisStatus) -> Vec<String> {
    match stored {
        None | Some("") => Vec::new(),
        Some(s) if status == AnalysisStatus::Failed && s.starts_with("Detection failed") => {
            vec![s.to_string()]
        }
        Some(s) => s
            .split(',')
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty())
            .collect(),
    }
}

impl From<Analysis> for AnalysisResponseDto {
    fn from(a: Analysis) -> Self {
        Self {
            detected_objects: split_objects(a.detected_objects.as_deref(), a.status),
            exif: parse_exif(a.exif.as_deref()),
            id: a.id,
            user_id: a.user_id,
            filename: a.filename,
            file_type: a.file_type,
            dimensions: a.dimensions,
            extracted_text: a.extracted_text,
            image_url: a.image_url,
            preview_url: a.preview_url,
            lat: a.lat,
            lng: a.lng,
            confidence: a.confidence,
            status: a.status,
            method: a.method,
            created_at: a.created_at,
            completed_at: a.completed_at,
        }
    }
}

/// Rows written before EXIF capture, or with unreadable JSON, show no tags
pub fn parse_exif(stored: Option<&str>) -> BTreeMap<String, String> {
    stored
        .and_then(|json| serde_json::from_str(json).ok())
        .unwrap_or_default()
}

/// Parse the optional `analyze` form field; anything unrecognised means yes
pub fn parse_analyze_flag(value: &str) -> bool {
    crate::core::config::parse_flag(value).unwrap_or(true)
}
