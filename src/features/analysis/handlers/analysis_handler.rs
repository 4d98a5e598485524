use axum::{
    extract::{multipart::MultipartRejection, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use minijinja::context;
use std::sync::Arc;
use tracing::debug;

use crate::core::error::{respond_with_error, AppError, PageError};
use crate::core::extractor::ResponseFormat;
use crate::core::flash::{self, Flash, Flashes};
use crate::core::templates::{render_page, PageContext};
use crate::features::analysis::dtos::{parse_analyze_flag, AnalysisResponseDto, UploadAnalysisDto};
use crate::features::analysis::models::AnalysisStatus;
use crate::features::analysis::services::{AnalysisService, IntakeService, UploadedFile};
use crate::features::auth::model::CurrentUser;
use crate::shared::types::{ApiResponse, Meta};

#[derive(Clone)]
pub struct AnalysisState {
    pub analyses: Arc<AnalysisService>,
    pub intake: Arc<IntakeService>,
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    debug!("Failed to read multipart data: {}", err);
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("File too large".to_string())
    } else {
        AppError::BadRequest(format!("Failed to read upload: {}", err.body_text()))
    }
}

/// Read the `file` and `analyze` fields of an upload form
async fn read_upload(mut multipart: Multipart) -> Result<(Option<UploadedFile>, bool), AppError> {
    let mut file: Option<UploadedFile> = None;
    let mut analyze = true;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("").to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some(UploadedFile {
                    filename,
                    bytes: bytes.to_vec(),
                });
            }
            "analyze" => {
                let text = field.text().await.map_err(multipart_error)?;
                analyze = parse_analyze_flag(&text);
            }
            _ => {
                debug!("Ignoring unknown field: {}", field_name);
            }
        }
    }

    Ok((file, analyze))
}

/// Upload an image
///
/// Accepts multipart/form-data with:
/// - `file`: The image to analyze (required)
/// - `analyze`: "false" to store the image and analyze it later (optional)
#[utoipa::path(
    post,
    path = "/upload",
    tag = "analysis",
    request_body(
        content = UploadAnalysisDto,
        content_type = "multipart/form-data",
        description = "Image upload form with optional analyze flag",
    ),
    responses(
        (status = 201, description = "Image stored and analyzed", body = ApiResponse<AnalysisResponseDto>),
        (status = 400, description = "Missing file, empty file or disallowed type"),
        (status = 401, description = "Authentication required"),
        (status = 413, description = "File too large")
    ),
    security(
        ("session_cookie" = [])
    )
)]
pub async fn upload(
    user: CurrentUser,
    format: ResponseFormat,
    State(state): State<AnalysisState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let result = async {
        let multipart = multipart.map_err(|e| {
            debug!("Upload without multipart body: {}", e);
            AppError::BadRequest("No file uploaded".to_string())
        })?;
        let (file, analyze) = read_upload(multipart).await?;
        state.intake.upload(&user, file, analyze).await
    }
    .await;

    let analysis = match result {
        Ok(analysis) => analysis,
        Err(e) => return respond_with_error(format, e, "/dashboard"),
    };

    if format.is_json() {
        return (
            StatusCode::CREATED,
            Json(ApiResponse::success(
                Some(AnalysisResponseDto::from(analysis)),
                Some("File uploaded".to_string()),
                None,
            )),
        )
            .into_response();
    }

    let message = match analysis.status {
        AnalysisStatus::Completed => Flash::success("File uploaded and analyzed"),
        AnalysisStatus::Failed => Flash::warning("File uploaded, but analysis failed"),
        AnalysisStatus::Pending => Flash::info("File uploaded; analysis pending"),
    };
    flash::redirect_with(&format!("/results/{}", analysis.id), message)
}

/// Run recognition on a pending analysis
#[utoipa::path(
    post,
    path = "/analyze/{id}",
    tag = "analysis",
    params(
        ("id" = i64, Path, description = "Analysis ID")
    ),
    responses(
        (status = 200, description = "Analysis finished (completed or failed)", body = ApiResponse<AnalysisResponseDto>),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Not the owner of this analysis"),
        (status = 404, description = "Analysis not found"),
        (status = 409, description = "Analysis already finished")
    ),
    security(
        ("session_cookie" = [])
    )
)]
pub async fn analyze(
    user: CurrentUser,
    format: ResponseFormat,
    State(state): State<AnalysisState>,
    Path(id): Path<i64>,
) -> Response {
    let result_page = format!("/results/{}", id);

    let result = async {
        let analysis = state.analyses.get_for_user(id, &user).await?;
        state.intake.run_analysis(&analysis).await
    }
    .await;

    let analysis = match result {
        Ok(analysis) => analysis,
        Err(e) => return respond_with_error(format, e, &result_page),
    };

    if format.is_json() {
        return Json(ApiResponse::success(
            Some(AnalysisResponseDto::from(analysis)),
            None,
            None,
        ))
        .into_response();
    }

    let message = if analysis.status == AnalysisStatus::Failed {
        Flash::warning("Analysis failed")
    } else {
        Flash::success("Analysis completed")
    };
    flash::redirect_with(&result_page, message)
}

/// Get one analysis
///
/// Visible to its owner and to admins. Also served at `/result/{id}`.
#[utoipa::path(
    get,
    path = "/results/{id}",
    tag = "analysis",
    params(
        ("id" = i64, Path, description = "Analysis ID")
    ),
    responses(
        (status = 200, description = "Analysis found", body = ApiResponse<AnalysisResponseDto>),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Not the owner of this analysis"),
        (status = 404, description = "Analysis not found")
    ),
    security(
        ("session_cookie" = [])
    )
)]
pub async fn get_result(
    user: CurrentUser,
    format: ResponseFormat,
    flashes: Flashes,
    State(state): State<AnalysisState>,
    Path(id): Path<i64>,
) -> Response {
    let analysis = match state.analyses.get_for_user(id, &user).await {
        Ok(analysis) => AnalysisResponseDto::from(analysis),
        Err(e) if format.is_json() => return e.into_response(),
        Err(e) => return PageError(e).into_response(),
    };

    if format.is_json() {
        return Json(ApiResponse::success(Some(analysis), None, None)).into_response();
    }

    render_page(
        "result.html",
        PageContext {
            user: Some(&user),
            flashes: &flashes,
        },
        context! { analysis => analysis },
    )
    .into_response()
}

/// List the caller's analyses, newest first
#[utoipa::path(
    get,
    path = "/api/analyses",
    tag = "analysis",
    responses(
        (status = 200, description = "Analyses of the current user", body = ApiResponse<Vec<AnalysisResponseDto>>),
        (status = 401, description = "Authentication required")
    ),
    security(
        ("session_cookie" = [])
    )
)]
pub async fn list_analyses(
    user: CurrentUser,
    State(state): State<AnalysisState>,
) -> Result<Json<ApiResponse<Vec<AnalysisResponseDto>>>, AppError> {
    let analyses: Vec<AnalysisResponseDto> = state
        .analyses
        .list_for_user(user.id)
        .await?
        .into_iter()
        .map(AnalysisResponseDto::from)
        .collect();

    let total = analyses.len() as i64;
    Ok(Json(ApiResponse::success(
        Some(analyses),
        None,
        Some(Meta { total }),
    )))
}
