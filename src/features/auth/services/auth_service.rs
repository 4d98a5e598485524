use axum::http::HeaderMap;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::error::{AppError, Result};
use crate::core::session::SessionManager;
use crate::features::audit::models::AuditAction;
use crate::features::audit::AuditService;
use crate::features::auth::dtos::{normalize_email, RegisterForm};
use crate::features::auth::model::{CurrentUser, Role, User};
use crate::features::auth::services::password::{hash_password, verify_password};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// Registration, login/logout and per-request session resolution
pub struct AuthService {
    pool: SqlitePool,
    sessions: SessionManager,
    audit: Arc<AuditService>,
    admin_emails: Vec<String>,
}

impl AuthService {
    pub fn new(
        pool: SqlitePool,
        sessions: SessionManager,
        audit: Arc<AuditService>,
        admin_emails: Vec<String>,
    ) -> Self {
        Self {
            pool,
            sessions,
            audit,
            admin_emails,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Register a new user. The form must already be validated.
    pub async fn register(&self, form: &RegisterForm) -> Result<User> {
        let email = normalize_email(&form.email);

        if self.find_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let password_hash = hash_password(&form.password)?;
        let role = if self.admin_emails.contains(&email) {
            Role::Admin
        } else {
            Role::User
        };

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash, role, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(form.name.trim())
        .bind(&email)
        .bind(&password_hash)
        .bind(role)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            // Lost a race with a concurrent registration
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Conflict("Email already registered".to_string())
            }
            other => AppError::Database(other),
        })?;

        self.audit
            .record(user.id, AuditAction::Register, &format!("Registered as {}", user.role))
            .await?;

        info!("User registered: id={}, role={}", user.id, user.role);

        Ok(user)
    }

    /// Check credentials without starting a session
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let user = self
            .find_by_email(&normalize_email(email))
            .await?
            .ok_or_else(|| AppError::Unauthorized(INVALID_CREDENTIALS.to_string()))?;

        if !verify_password(password, &user.password_hash) {
            debug!("Password mismatch for user id={}", user.id);
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        Ok(user)
    }

    /// Check credentials and issue a session token
    pub async fn login(&self, email: &str, password: &str) -> Result<(User, String)> {
        let user = self.authenticate(email, password).await?;
        let token = self.sessions.issue(user.id)?;

        self.audit
            .record(user.id, AuditAction::Login, "Logged in")
            .await?;

        info!("User logged in: id={}", user.id);

        Ok((user, token))
    }

    pub async fn logout(&self, user: &CurrentUser) -> Result<()> {
        self.audit
            .record(user.id, AuditAction::Logout, "Logged out")
            .await?;

        info!("User logged out: id={}", user.id);

        Ok(())
    }

    /// Record a reset request for an existing account.
    ///
    /// Returns quietly for unknown emails so the response never reveals
    /// whether an account exists.
    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        if let Some(user) = self.find_by_email(&normalize_email(email)).await? {
            self.audit
                .record(
                    user.id,
                    AuditAction::PasswordResetRequested,
                    "Password reset requested",
                )
                .await?;
            info!("Password reset requested for user id={}", user.id);
        }
        Ok(())
    }

    /// Resolve the session cookie into the user it belongs to
    pub async fn resolve_session(&self, headers: &HeaderMap) -> Result<Option<CurrentUser>> {
        let Some(user_id) = self.sessions.user_id_from_headers(headers) else {
            return Ok(None);
        };

        Ok(self.find_by_id(user_id).await?.map(CurrentUser::from))
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }
}
