use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use utoipa::ToSchema;

/// Significant user actions that are recorded in `audit_logs.action`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Register,
    Login,
    Logout,
    Upload,
    AnalysisCompleted,
    AnalysisFailed,
    PasswordResetRequested,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditAction::Register => write!(f, "register"),
            AuditAction::Login => write!(f, "login"),
            AuditAction::Logout => write!(f, "logout"),
            AuditAction::Upload => write!(f, "upload"),
            AuditAction::AnalysisCompleted => write!(f, "analysis_completed"),
            AuditAction::AnalysisFailed => write!(f, "analysis_failed"),
            AuditAction::PasswordResetRequested => write!(f, "password_reset_requested"),
        }
    }
}

/// Database model for audit_logs; rows are never updated
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct AuditLog {
    pub id: i64,
    pub user_id: i64,
    pub action: AuditAction,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}
