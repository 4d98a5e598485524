use axum::{routing::get, Router};
use std::sync::Arc;

use crate::core::config::MapConfig;
use crate::features::analysis::AnalysisService;
use crate::features::audit::AuditService;
use crate::features::pages::handlers::{self, DashboardState};

/// Pages open to anonymous visitors
pub fn public_routes() -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/about", get(handlers::about))
        .route("/ping", get(handlers::ping))
}

/// The dashboard; requires a session
pub fn protected_routes(
    analysis_service: Arc<AnalysisService>,
    audit_service: Arc<AuditService>,
    map: MapConfig,
) -> Router {
    let state = DashboardState {
        analyses: analysis_service,
        audit: audit_service,
        map,
    };

    Router::new()
        .route("/dashboard", get(handlers::dashboard))
        .with_state(state)
}
