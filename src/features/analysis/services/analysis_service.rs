use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::core::error::{AppError, Result};
use crate::features::analysis::models::{Analysis, AnalysisStatus, NewAnalysis, StatusCounts};
use crate::features::audit::models::AuditAction;
use crate::features::audit::AuditService;
use crate::features::auth::model::CurrentUser;
use crate::modules::recognition::RecognitionOutcome;

/// Reads and writes `analysis` rows
pub struct AnalysisService {
    pool: SqlitePool,
}

impl AnalysisService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a pending row together with its `upload` audit entry
    pub async fn create_pending(&self, new: &NewAnalysis) -> Result<Analysis> {
        let mut tx = self.pool.begin().await?;

        let analysis = sqlx::query_as::<_, Analysis>(
            r#"
            INSERT INTO analysis
                (user_id, filename, file_type, dimensions, image_url, lat, lng, exif, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(new.user_id)
        .bind(&new.filename)
        .bind(&new.file_type)
        .bind(&new.dimensions)
        .bind(&new.image_url)
        .bind(new.lat)
        .bind(new.lng)
        .bind(&new.exif)
        .bind(AnalysisStatus::Pending)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        AuditService::record_in(
            &mut *tx,
            new.user_id,
            AuditAction::Upload,
            &format!("Uploaded {}", new.filename),
        )
        .await?;
        tx.commit().await?;

        debug!(
            "Analysis created: id={}, user_id={}, file={}",
            analysis.id, analysis.user_id, analysis.filename
        );

        Ok(analysis)
    }

    /// Store a recognition outcome and leave `pending`.
    ///
    /// Only a pending row is updated; finished analyses are immutable and
    /// yield `Conflict`.
    pub async fn finish(
        &self,
        id: i64,
        outcome: &RecognitionOutcome,
        preview_url: Option<&str>,
    ) -> Result<Analysis> {
        let status = if outcome.failed() {
            AnalysisStatus::Failed
        } else {
            AnalysisStatus::Completed
        };

        let updated = sqlx::query_as::<_, Analysis>(
            r#"
            UPDATE analysis
            SET extracted_text = $1,
                detected_objects = $2,
                confidence = $3,
                method = $4,
                preview_url = COALESCE($5, preview_url),
                status = $6,
                completed_at = $7
            WHERE id = $8 AND status = $9
            RETURNING *
            "#,
        )
        .bind(&outcome.extracted_text)
        .bind(&outcome.detected_objects)
        .bind(outcome.confidence)
        .bind(&outcome.method)
        .bind(preview_url)
        .bind(status)
        .bind(Utc::now())
        .bind(id)
        .bind(AnalysisStatus::Pending)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(analysis) => {
                info!(
                    "Analysis {} {}: method={}, objects={:?}",
                    analysis.id, analysis.status, outcome.method, outcome.detected_objects
                );
                Ok(analysis)
            }
            None => {
                // Distinguish a missing row from one that already finished
                let existing = self.find_by_id(id).await?;
                Err(AppError::Conflict(format!(
                    "Analysis {} is already {}",
                    existing.id, existing.status
                )))
            }
        }
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Analysis> {
        sqlx::query_as::<_, Analysis>("SELECT * FROM analysis WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Analysis not found".to_string()))
    }

    /// Load an analysis the user is allowed to see: the owner or an admin
    pub async fn get_for_user(&self, id: i64, user: &CurrentUser) -> Result<Analysis> {
        let analysis = self.find_by_id(id).await?;

        if !user.can_access(analysis.user_id) {
            debug!(
                "User {} denied access to analysis {} owned by {}",
                user.id, analysis.id, analysis.user_id
            );
            return Err(AppError::Forbidden(
                "You do not have access to this analysis".to_string(),
            ));
        }

        Ok(analysis)
    }

    /// All of a user's analyses, newest first
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<Analysis>> {
        let analyses = sqlx::query_as::<_, Analysis>(
            r#"
            SELECT * FROM analysis
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(analyses)
    }

    pub async fn status_counts(&self, user_id: i64) -> Result<StatusCounts> {
        let rows = sqlx::query_as::<_, (AnalysisStatus, i64)>(
            r#"
            SELECT status, COUNT(*) FROM analysis
            WHERE user_id = $1
            GROUP BY status
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            match status {
                AnalysisStatus::Pending => counts.pending = count,
                AnalysisStatus::Completed => counts.completed = count,
                AnalysisStatus::Failed => counts.failed = count,
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::auth::model::Role;
    use crate::shared::test_helpers::{insert_user, insert_user_with_role, test_pool};

    fn new_analysis(user_id: i64, filename: &str) -> NewAnalysis {
        NewAnalysis {
            user_id,
            filename: filename.to_string(),
            file_type: "image/png".to_string(),
            dimensions: Some("4x3".to_string()),
            image_url: format!("/static/uploads/{}", filename),
            lat: None,
            lng: None,
            exif: None,
        }
    }

    fn outcome(errors: Vec<String>) -> RecognitionOutcome {
        RecognitionOutcome {
            extracted_text: "STOP".to_string(),
            detected_objects: "person,car".to_string(),
            confidence: Some(0.9),
            method: "ocr+yolo".to_string(),
            errors,
        }
    }

    #[tokio::test]
    async fn test_finish_only_from_pending() {
        let pool = test_pool().await;
        let user = insert_user(&pool, "ada@example.com", "secret1").await;
        let service = AnalysisService::new(pool);

        let pending = service
            .create_pending(&new_analysis(user.id, "a.png"))
            .await
            .unwrap();
        assert_eq!(pending.status, AnalysisStatus::Pending);
        assert!(pending.completed_at.is_none());

        let done = service
            .finish(pending.id, &outcome(vec![]), Some("/static/results/a_preview.png"))
            .await
            .unwrap();
        assert_eq!(done.status, AnalysisStatus::Completed);
        assert_eq!(done.detected_objects.as_deref(), Some("person,car"));
        assert_eq!(done.preview_url.as_deref(), Some("/static/results/a_preview.png"));
        assert!(done.completed_at.is_some());

        let again = service.finish(pending.id, &outcome(vec![]), None).await;
        assert!(matches!(again, Err(AppError::Conflict(_))));

        let missing = service.finish(9999, &outcome(vec![]), None).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    async fn count(pool: &SqlitePool, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_pending_writes_upload_audit() {
        let pool = test_pool().await;
        let user = insert_user(&pool, "ada@example.com", "secret1").await;
        let service = AnalysisService::new(pool.clone());

        service
            .create_pending(&new_analysis(user.id, "c.png"))
            .await
            .unwrap();

        assert_eq!(
            count(&pool, "SELECT COUNT(*) FROM audit_logs WHERE action = 'upload'").await,
            1
        );
    }

    #[tokio::test]
    async fn test_pending_row_rolls_back_when_audit_insert_fails() {
        let pool = test_pool().await;
        let user = insert_user(&pool, "ada@example.com", "secret1").await;
        sqlx::query(
            r#"
            CREATE TRIGGER reject_upload_audit BEFORE INSERT ON audit_logs
            WHEN NEW.action = 'upload'
            BEGIN SELECT RAISE(ABORT, 'audit unavailable'); END
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        let service = AnalysisService::new(pool.clone());

        let result = service.create_pending(&new_analysis(user.id, "d.png")).await;

        assert!(matches!(result, Err(AppError::Database(_))));
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM analysis").await, 0);
    }

    #[tokio::test]
    async fn test_failed_outcome_marks_failed() {
        let pool = test_pool().await;
        let user = insert_user(&pool, "ada@example.com", "secret1").await;
        let service = AnalysisService::new(pool);

        let pending = service
            .create_pending(&new_analysis(user.id, "b.png"))
            .await
            .unwrap();
        let failed = service
            .finish(pending.id, &outcome(vec!["OCR failed: boom".to_string()]), None)
            .await
            .unwrap();
        assert_eq!(failed.status, AnalysisStatus::Failed);
    }

    #[tokio::test]
    async fn test_access_is_owner_or_admin() {
        let pool = test_pool().await;
        let owner = insert_user(&pool, "owner@example.com", "secret1").await;
        let other = insert_user(&pool, "other@example.com", "secret1").await;
        let admin = insert_user_with_role(&pool, "admin@example.com", "secret1", Role::Admin).await;
        let service = AnalysisService::new(pool);

        let analysis = service
            .create_pending(&new_analysis(owner.id, "c.png"))
            .await
            .unwrap();

        assert!(service
            .get_for_user(analysis.id, &CurrentUser::from(owner))
            .await
            .is_ok());
        assert!(service
            .get_for_user(analysis.id, &CurrentUser::from(admin))
            .await
            .is_ok());
        assert!(matches!(
            service
                .get_for_user(analysis.id, &CurrentUser::from(other.clone()))
                .await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            service.get_for_user(424242, &CurrentUser::from(other)).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_newest_first_and_counts() {
        let pool = test_pool().await;
        let user = insert_user(&pool, "ada@example.com", "secret1").await;
        let service = AnalysisService::new(pool);

        let first = service
            .create_pending(&new_analysis(user.id, "1.png"))
            .await
            .unwrap();
        let second = service
            .create_pending(&new_analysis(user.id, "2.png"))
            .await
            .unwrap();
        service
            .finish(first.id, &outcome(vec![]), None)
            .await
            .unwrap();

        let list = service.list_for_user(user.id).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, second.id);

        let counts = service.status_counts(user.id).await.unwrap();
        assert_eq!(
            counts,
            StatusCounts {
                pending: 1,
                completed: 1,
                failed: 0
            }
        );
        assert_eq!(counts.total(), 2);
    }
}
