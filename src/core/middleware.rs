use crate::core::error::AppError;
use crate::core::extractor::ResponseFormat;
use crate::core::flash;
use crate::features::auth::model::CurrentUser;
use crate::features::auth::AuthService;
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::SignedCookieJar;
use base64::prelude::*;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::Span;
use uuid::Uuid;

/// Request ID generator using UUID v7 (time-ordered)
#[derive(Clone, Copy)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Custom MakeSpan that includes request_id in the tracing span
#[derive(Clone, Debug)]
pub struct MakeSpanWithRequestId;

impl<B> tower_http::trace::MakeSpan<B> for MakeSpanWithRequestId {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> Span {
        let request_id = request
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");

        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

pub fn cors_layer(allowed_origins: Vec<String>) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    // If origins list contains "*", allow any origin
    if allowed_origins.iter().any(|o| o == "*") {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(AllowOrigin::list(origins))
    }
}

pub fn basic_auth_middleware(
    valid_credentials: Arc<String>,
) -> impl Fn(
    Request,
    Next,
)
    -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, Response>> + Send>>
       + Clone {
    move |req: Request, next: Next| {
        let credentials = valid_credentials.clone();
        Box::pin(async move {
            let auth_header = req
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|header| header.to_str().ok());

            if let Some(auth_header) = auth_header {
                if let Some(encoded) = auth_header.strip_prefix("Basic ") {
                    if let Ok(decoded) = BASE64_STANDARD.decode(encoded) {
                        if let Ok(creds) = String::from_utf8(decoded) {
                            if creds == *credentials {
                                return Ok(next.run(req).await);
                            }
                        }
                    }
                }
            }

            Err((
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"Swagger UI\"")],
                "Unauthorized",
            )
                .into_response())
        })
    }
}

/// Resolve the session cookie into a [`CurrentUser`] request extension.
///
/// Invalid or expired sessions, and sessions of users that no longer exist,
/// leave the request anonymous. Signed flash messages travel through here
/// in both directions.
pub async fn session_middleware(
    State(auth): State<Arc<AuthService>>,
    mut req: Request,
    next: Next,
) -> Response {
    match auth.resolve_session(req.headers()).await {
        Ok(Some(user)) => {
            tracing::debug!(user_id = user.id, "Session resolved");
            req.extensions_mut().insert(user);
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("Failed to resolve session: {}", e),
    }

    let jar = SignedCookieJar::from_headers(req.headers(), auth.sessions().cookie_key().clone());
    req.extensions_mut().insert(flash::read(&jar));

    let response = next.run(req).await;
    flash::commit(jar, response)
}

/// Gate for protected routes.
///
/// Browsers are sent to `/login?next=<path>`; JSON clients and `/api/`
/// paths get 401.
pub async fn require_login(req: Request, next: Next) -> Response {
    if req.extensions().get::<CurrentUser>().is_some() {
        return next.run(req).await;
    }

    let wants_json = ResponseFormat::from_headers(req.headers()).is_json()
        || req.uri().path().starts_with("/api/");
    if wants_json {
        return AppError::Unauthorized("Authentication required".to_string()).into_response();
    }

    let next_path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    Redirect::to(&login_redirect(next_path)).into_response()
}

pub fn login_redirect(next_path: &str) -> String {
    format!("/login?next={}", urlencoding::encode(next_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_redirect_encodes_next() {
        assert_eq!(login_redirect("/dashboard"), "/login?next=%2Fdashboard");
        assert_eq!(
            login_redirect("/results/3?x=1"),
            "/login?next=%2Fresults%2F3%3Fx%3D1"
        );
    }

    #[test]
    fn test_request_ids_are_unique() {
        let request = axum::http::Request::new(());
        let mut maker = MakeRequestUuid;
        let a = maker.make_request_id(&request).unwrap();
        let b = maker.make_request_id(&request).unwrap();
        assert_ne!(a.header_value(), b.header_value());
    }
}
