use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use minijinja::context;
use std::sync::Arc;

use crate::core::config::MapConfig;
use crate::core::error::{AppError, PageError};
use crate::core::extractor::ResponseFormat;
use crate::core::flash::Flashes;
use crate::core::templates::{render_page, PageContext};
use crate::features::analysis::dtos::AnalysisResponseDto;
use crate::features::analysis::AnalysisService;
use crate::features::audit::AuditService;
use crate::features::auth::model::CurrentUser;
use crate::features::pages::dtos::{DashboardDto, MapDefaultsDto, PingDto};
use crate::shared::constants::DASHBOARD_AUDIT_LIMIT;
use crate::shared::types::ApiResponse;

#[derive(Clone)]
pub struct DashboardState {
    pub analyses: Arc<AnalysisService>,
    pub audit: Arc<AuditService>,
    pub map: MapConfig,
}

pub async fn index(user: Option<CurrentUser>, flashes: Flashes) -> Result<Response, PageError> {
    render_page(
        "index.html",
        PageContext {
            user: user.as_ref(),
            flashes: &flashes,
        },
        context! {},
    )
}

pub async fn about(user: Option<CurrentUser>, flashes: Flashes) -> Result<Response, PageError> {
    render_page(
        "about.html",
        PageContext {
            user: user.as_ref(),
            flashes: &flashes,
        },
        context! {},
    )
}

/// Liveness check
#[utoipa::path(
    get,
    path = "/ping",
    tag = "pages",
    responses(
        (status = 200, description = "Service is up", body = ApiResponse<PingDto>)
    )
)]
pub async fn ping() -> Json<ApiResponse<PingDto>> {
    Json(ApiResponse::success(
        Some(PingDto {
            status: "ok".to_string(),
        }),
        None,
        None,
    ))
}

async fn load_dashboard(state: &DashboardState, user: &CurrentUser) -> Result<DashboardDto, AppError> {
    let analyses: Vec<AnalysisResponseDto> = state
        .analyses
        .list_for_user(user.id)
        .await?
        .into_iter()
        .map(AnalysisResponseDto::from)
        .collect();
    let counts = state.analyses.status_counts(user.id).await?;
    let recent_activity = state
        .audit
        .list_for_user(user.id, DASHBOARD_AUDIT_LIMIT)
        .await?;

    Ok(DashboardDto {
        analyses,
        total: counts.total(),
        counts,
        recent_activity,
        map: MapDefaultsDto::from(state.map),
    })
}

/// The user's analyses, status counts and recent activity
#[utoipa::path(
    get,
    path = "/dashboard",
    tag = "pages",
    responses(
        (status = 200, description = "Dashboard data", body = ApiResponse<DashboardDto>),
        (status = 401, description = "Authentication required")
    ),
    security(
        ("session_cookie" = [])
    )
)]
pub async fn dashboard(
    user: CurrentUser,
    format: ResponseFormat,
    flashes: Flashes,
    State(state): State<DashboardState>,
) -> Response {
    let data = match load_dashboard(&state, &user).await {
        Ok(data) => data,
        Err(e) if format.is_json() => return e.into_response(),
        Err(e) => return PageError(e).into_response(),
    };

    if format.is_json() {
        return Json(ApiResponse::success(Some(data), None, None)).into_response();
    }

    render_page(
        "dashboard.html",
        PageContext {
            user: Some(&user),
            flashes: &flashes,
        },
        context! { dashboard => data },
    )
    .into_response()
}

/// Fallback for unknown routes
pub async fn not_found(format: ResponseFormat) -> Response {
    let err = AppError::NotFound("Page not found".to_string());
    if format.is_json() {
        err.into_response()
    } else {
        PageError(err).into_response()
    }
}
