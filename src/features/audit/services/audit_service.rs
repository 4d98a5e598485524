use chrono::Utc;
use sqlx::{SqliteConnection, SqliteExecutor, SqlitePool};
use tracing::debug;

use crate::core::error::Result;
use crate::features::audit::models::{AuditAction, AuditLog};

/// Append-only record of significant user actions
pub struct AuditService {
    pool: SqlitePool,
}

impl AuditService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record one action for a user
    pub async fn record(&self, user_id: i64, action: AuditAction, detail: &str) -> Result<AuditLog> {
        insert_log(&self.pool, user_id, action, detail).await
    }

    /// Record inside the caller's transaction, so the entry commits or rolls
    /// back with the change it describes
    pub async fn record_in(
        conn: &mut SqliteConnection,
        user_id: i64,
        action: AuditAction,
        detail: &str,
    ) -> Result<AuditLog> {
        insert_log(conn, user_id, action, detail).await
    }

    /// Most recent entries for a user, newest first
    pub async fn list_for_user(&self, user_id: i64, limit: i64) -> Result<Vec<AuditLog>> {
        let logs = sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT * FROM audit_logs
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(logs)
    }

    /// Number of entries of one kind for a user
    #[cfg(test)]
    pub async fn count_for_user(&self, user_id: i64, action: AuditAction) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM audit_logs
            WHERE user_id = $1 AND action = $2
            "#,
        )
        .bind(user_id)
        .bind(action)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

async fn insert_log<'e, E>(
    executor: E,
    user_id: i64,
    action: AuditAction,
    detail: &str,
) -> Result<AuditLog>
where
    E: SqliteExecutor<'e>,
{
    let log = sqlx::query_as::<_, AuditLog>(
        r#"
        INSERT INTO audit_logs (user_id, action, detail, created_at)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(action)
    .bind(detail)
    .bind(Utc::now())
    .fetch_one(executor)
    .await?;

    debug!(user_id, action = %action, "Audit log recorded: {}", detail);

    Ok(log)
}
