use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::features::analysis::handlers::{
    analyze, get_result, list_analyses, upload, AnalysisState,
};
use crate::features::analysis::services::{AnalysisService, IntakeService};
use crate::shared::constants::MULTIPART_OVERHEAD;

/// Create routes for the analysis feature; all of them require a session
pub fn routes(
    analysis_service: Arc<AnalysisService>,
    intake_service: Arc<IntakeService>,
    max_content_length: usize,
) -> Router {
    let state = AnalysisState {
        analyses: analysis_service,
        intake: intake_service,
    };

    Router::new()
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(max_content_length + MULTIPART_OVERHEAD)),
        )
        .route("/analyze/{id}", post(analyze))
        .route("/results/{id}", get(get_result))
        .route("/result/{id}", get(get_result))
        .route("/api/analyses", get(list_analyses))
        .with_state(state)
}
