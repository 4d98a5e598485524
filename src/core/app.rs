//! Service wiring and the application router.

use axum::{
    middleware::{from_fn, from_fn_with_state},
    Router,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::services::ServeDir;

use crate::core::config::{MapConfig, SessionConfig, StorageConfig};
use crate::core::middleware;
use crate::core::session::SessionManager;
use crate::features::analysis::{self, AnalysisService, IntakeService};
use crate::features::audit::AuditService;
use crate::features::auth::{self, AuthService};
use crate::features::pages;
use crate::modules::recognition::RecognitionPipeline;
use crate::modules::storage::{RESULTS_URL_PREFIX, UPLOADS_URL_PREFIX};

/// Shared services, built once at start-up
#[derive(Clone)]
pub struct AppServices {
    pub auth: Arc<AuthService>,
    pub audit: Arc<AuditService>,
    pub analyses: Arc<AnalysisService>,
    pub intake: Arc<IntakeService>,
    pub map: MapConfig,
    pub max_content_length: usize,
}

impl AppServices {
    pub fn new(
        pool: SqlitePool,
        session: &SessionConfig,
        storage: StorageConfig,
        map: MapConfig,
        pipeline: RecognitionPipeline,
        admin_emails: Vec<String>,
    ) -> Self {
        let audit = Arc::new(AuditService::new(pool.clone()));
        let auth = Arc::new(AuthService::new(
            pool.clone(),
            SessionManager::new(session),
            Arc::clone(&audit),
            admin_emails,
        ));
        let analyses = Arc::new(AnalysisService::new(pool));
        let intake = Arc::new(IntakeService::new(
            &storage,
            pipeline,
            Arc::clone(&analyses),
            Arc::clone(&audit),
        ));

        Self {
            auth,
            audit,
            analyses,
            intake,
            map,
            max_content_length: storage.max_content_length,
        }
    }
}

/// Build every route of the application.
///
/// Request ids, tracing and CORS are layered on by `main`.
pub fn build_router(services: &AppServices) -> Router {
    // Protected routes (require a session)
    let protected_routes = Router::new()
        .merge(auth::protected_routes(Arc::clone(&services.auth)))
        .merge(analysis::routes(
            Arc::clone(&services.analyses),
            Arc::clone(&services.intake),
            services.max_content_length,
        ))
        .merge(pages::protected_routes(
            Arc::clone(&services.analyses),
            Arc::clone(&services.audit),
            services.map,
        ))
        .route_layer(from_fn(middleware::require_login));

    // Public routes (no session required)
    let public_routes = Router::new()
        .merge(auth::public_routes(Arc::clone(&services.auth)))
        .merge(pages::public_routes());

    let storage = services.intake.storage();
    let static_files = Router::new()
        .nest_service(UPLOADS_URL_PREFIX, ServeDir::new(storage.upload_dir()))
        .nest_service(RESULTS_URL_PREFIX, ServeDir::new(storage.results_dir()));

    Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .merge(static_files)
        .fallback(pages::handlers::not_found)
        .layer(from_fn_with_state(
            Arc::clone(&services.auth),
            middleware::session_middleware,
        ))
}
