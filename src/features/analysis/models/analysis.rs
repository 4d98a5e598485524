use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use utoipa::ToSchema;

/// Analysis status stored in `analysis.status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, AnalysisStatus::Pending)
    }
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisStatus::Pending => write!(f, "pending"),
            AnalysisStatus::Completed => write!(f, "completed"),
            AnalysisStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Database model for analysis
#[derive(Debug, Clone, FromRow)]
pub struct Analysis {
    pub id: i64,
    pub user_id: i64,
    pub filename: String,
    pub file_type: Option<String>,
    pub dimensions: Option<String>,
    pub extracted_text: Option<String>,
    pub detected_objects: Option<String>,
    pub image_url: Option<String>,
    pub preview_url: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// JSON object of EXIF tag name to value
    pub exif: Option<String>,
    pub confidence: Option<f64>,
    pub status: AnalysisStatus,
    pub method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Fields written when an upload is accepted
#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub user_id: i64,
    pub filename: String,
    pub file_type: String,
    pub dimensions: Option<String>,
    pub image_url: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub exif: Option<String>,
}

/// Per-status totals for one user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct StatusCounts {
    pub pending: i64,
    pub completed: i64,
    pub failed: i64,
}

impl StatusCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.completed + self.failed
    }
}
