use axum::{
    body::Body,
    extract::{
        rejection::FormRejection, FromRequest, FromRequestParts, OptionalFromRequestParts, Request,
    },
    http::{header, request::Parts, HeaderMap},
    response::{IntoResponse, Response},
    Form,
};
use serde::de::DeserializeOwned;
use std::convert::Infallible;

use crate::core::error::AppError;
use crate::features::auth::model::CurrentUser;

/// Custom form extractor that provides consistent error responses
pub struct AppForm<T>(pub T);

impl<T, S> FromRequest<S> for AppForm<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppFormRejection;

    async fn from_request(req: Request<Body>, state: &S) -> Result<Self, Self::Rejection> {
        match Form::<T>::from_request(req, state).await {
            Ok(value) => Ok(Self(value.0)),
            Err(rejection) => Err(AppFormRejection(rejection)),
        }
    }
}

pub struct AppFormRejection(FormRejection);

impl IntoResponse for AppFormRejection {
    fn into_response(self) -> Response {
        let message = match self.0 {
            FormRejection::FailedToDeserializeForm(err) => {
                format!("Invalid form data: {}", err.body_text())
            }
            FormRejection::FailedToDeserializeFormBody(err) => {
                format!("Invalid form data: {}", err.body_text())
            }
            FormRejection::InvalidFormContentType(_) => {
                "Expected application/x-www-form-urlencoded".to_string()
            }
            _ => "Failed to parse form body".to_string(),
        };

        AppError::BadRequest(message).into_response()
    }
}

/// Required user, resolved by the session middleware
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}

/// `Option<CurrentUser>` for pages open to anonymous visitors
impl<S> OptionalFromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<CurrentUser>().cloned())
    }
}

/// Which representation the client asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Html,
    Json,
}

impl ResponseFormat {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let wants_json = headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.contains("application/json"));

        if wants_json {
            ResponseFormat::Json
        } else {
            ResponseFormat::Html
        }
    }

    pub fn is_json(&self) -> bool {
        *self == ResponseFormat::Json
    }
}

impl<S> FromRequestParts<S> for ResponseFormat
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Sample {
        name: String,
        age: u32,
    }

    async fn reject(body: &'static str, content_type: &str) -> serde_json::Value {
        let req = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap();
        let rejection = AppForm::<Sample>::from_request(req, &())
            .await
            .err()
            .expect("form must be rejected");
        let response = rejection.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_malformed_form_body_is_bad_request() {
        let body = reject("name=ada&age=old", "application/x-www-form-urlencoded").await;
        assert_eq!(body["success"], false);
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid form data"));
    }

    #[tokio::test]
    async fn test_wrong_content_type_is_bad_request() {
        let body = reject("{}", "application/json").await;
        assert_eq!(
            body["message"],
            "Expected application/x-www-form-urlencoded"
        );
    }

    #[test]
    fn test_response_format_from_accept() {
        let mut headers = HeaderMap::new();
        assert_eq!(ResponseFormat::from_headers(&headers), ResponseFormat::Html);

        headers.insert(header::ACCEPT, "text/html,application/xhtml+xml".parse().unwrap());
        assert_eq!(ResponseFormat::from_headers(&headers), ResponseFormat::Html);

        headers.insert(header::ACCEPT, "application/json".parse().unwrap());
        assert!(ResponseFormat::from_headers(&headers).is_json());
    }
}
