use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use minijinja::context;
use std::sync::Arc;
use validator::Validate;

use crate::core::error::{respond_with_error, AppError};
use crate::core::extractor::{AppForm, ResponseFormat};
use crate::core::flash::{self, Flash, Flashes};
use crate::core::middleware::login_redirect;
use crate::core::templates::{render_page, PageContext};
use crate::features::auth::dtos::{
    safe_next, validation_messages, ForgotPasswordForm, LoginForm, NextQuery, RegisterForm,
};
use crate::features::auth::model::CurrentUser;
use crate::features::auth::services::AuthService;
use crate::shared::constants::PASSWORD_RESET_MESSAGE;
use crate::shared::types::ApiResponse;

fn validate_form(form: &impl Validate) -> Result<(), AppError> {
    form.validate()
        .map_err(|errors| AppError::Validation(validation_messages(&errors).join("; ")))
}

fn anonymous_page(
    name: &str,
    user: Option<CurrentUser>,
    flashes: &Flashes,
    ctx: minijinja::Value,
) -> Response {
    // Signed-in visitors have no use for the login/register pages
    if user.is_some() {
        return Redirect::to("/dashboard").into_response();
    }
    render_page(name, PageContext { user: None, flashes }, ctx).into_response()
}

pub async fn login_page(
    user: Option<CurrentUser>,
    flashes: Flashes,
    Query(query): Query<NextQuery>,
) -> Response {
    let next = safe_next(query.next.as_deref());
    anonymous_page("login.html", user, &flashes, context! { next => next })
}

/// Log in with email and password
///
/// Sets the `session` cookie. Browsers are redirected to `next` (if it is a
/// local path) or to the dashboard.
#[utoipa::path(
    post,
    path = "/login",
    tag = "auth",
    request_body(
        content = LoginForm,
        content_type = "application/x-www-form-urlencoded",
    ),
    responses(
        (status = 200, description = "Logged in", body = ApiResponse<CurrentUser>),
        (status = 303, description = "Logged in (browser), redirect to next page"),
        (status = 400, description = "Invalid form data"),
        (status = 401, description = "Invalid email or password")
    )
)]
pub async fn login(
    format: ResponseFormat,
    State(service): State<Arc<AuthService>>,
    AppForm(form): AppForm<LoginForm>,
) -> Response {
    let next = safe_next(form.next.as_deref());
    let retry_url = next
        .as_deref()
        .map(login_redirect)
        .unwrap_or_else(|| "/login".to_string());

    let result = async {
        validate_form(&form)?;
        service.login(&form.email, &form.password).await
    }
    .await;

    let (user, token) = match result {
        Ok(logged_in) => logged_in,
        Err(e) => return respond_with_error(format, e, &retry_url),
    };

    let response = if format.is_json() {
        Json(ApiResponse::success(
            Some(CurrentUser::from(user)),
            Some("Logged in".to_string()),
            None,
        ))
        .into_response()
    } else {
        flash::redirect_with(
            next.as_deref().unwrap_or("/dashboard"),
            Flash::success(format!("Welcome back, {}!", user.name)),
        )
    };
    let jar = CookieJar::new().add(service.sessions().session_cookie(token));
    (jar, response).into_response()
}

pub async fn register_page(user: Option<CurrentUser>, flashes: Flashes) -> Response {
    anonymous_page("register.html", user, &flashes, context! {})
}

/// Create an account
#[utoipa::path(
    post,
    path = "/register",
    tag = "auth",
    request_body(
        content = RegisterForm,
        content_type = "application/x-www-form-urlencoded",
    ),
    responses(
        (status = 201, description = "Account created", body = ApiResponse<CurrentUser>),
        (status = 303, description = "Account created (browser), redirect to login"),
        (status = 400, description = "Invalid form data"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn register(
    format: ResponseFormat,
    State(service): State<Arc<AuthService>>,
    AppForm(form): AppForm<RegisterForm>,
) -> Response {
    let result = async {
        validate_form(&form)?;
        service.register(&form).await
    }
    .await;

    let user = match result {
        Ok(user) => user,
        Err(e) => return respond_with_error(format, e, "/register"),
    };

    if format.is_json() {
        return (
            StatusCode::CREATED,
            Json(ApiResponse::success(
                Some(CurrentUser::from(user)),
                Some("Registration successful".to_string()),
                None,
            )),
        )
            .into_response();
    }

    flash::redirect_with(
        "/login",
        Flash::success("Registration successful. Please log in."),
    )
}

/// Log out
///
/// Clears the `session` cookie. Also accepts GET so a plain link works.
#[utoipa::path(
    post,
    path = "/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Logged out"),
        (status = 303, description = "Logged out (browser), redirect to home"),
        (status = 401, description = "Authentication required")
    ),
    security(
        ("session_cookie" = [])
    )
)]
pub async fn logout(
    user: CurrentUser,
    format: ResponseFormat,
    jar: CookieJar,
    State(service): State<Arc<AuthService>>,
) -> Response {
    if let Err(e) = service.logout(&user).await {
        // The cookie is cleared even when the audit write fails
        tracing::error!("Failed to record logout for user id={}: {}", user.id, e);
    }

    let response = if format.is_json() {
        Json(ApiResponse::<()>::success(
            None,
            Some("Logged out".to_string()),
            None,
        ))
        .into_response()
    } else {
        flash::redirect_with("/", Flash::info("You have been logged out"))
    };
    let jar = jar.remove(service.sessions().removal_cookie());
    (jar, response).into_response()
}

pub async fn forgot_password_page(user: Option<CurrentUser>, flashes: Flashes) -> Response {
    anonymous_page("forgot_password.html", user, &flashes, context! {})
}

/// Request a password reset
///
/// The response is the same whether or not the email belongs to an account.
#[utoipa::path(
    post,
    path = "/forgot-password",
    tag = "auth",
    request_body(
        content = ForgotPasswordForm,
        content_type = "application/x-www-form-urlencoded",
    ),
    responses(
        (status = 200, description = "Request accepted"),
        (status = 303, description = "Request accepted (browser), redirect to login"),
        (status = 400, description = "Invalid email")
    )
)]
pub async fn forgot_password(
    format: ResponseFormat,
    State(service): State<Arc<AuthService>>,
    AppForm(form): AppForm<ForgotPasswordForm>,
) -> Response {
    let result = async {
        validate_form(&form)?;
        service.request_password_reset(&form.email).await
    }
    .await;

    if let Err(e) = result {
        return respond_with_error(format, e, "/forgot-password");
    }

    if format.is_json() {
        return Json(ApiResponse::<()>::success(
            None,
            Some(PASSWORD_RESET_MESSAGE.to_string()),
            None,
        ))
        .into_response();
    }

    flash::redirect_with("/login", Flash::info(PASSWORD_RESET_MESSAGE))
}

/// Get the logged-in user
#[utoipa::path(
    get,
    path = "/api/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = ApiResponse<CurrentUser>),
        (status = 401, description = "Authentication required")
    ),
    security(
        ("session_cookie" = [])
    )
)]
pub async fn get_me(user: CurrentUser) -> Json<ApiResponse<CurrentUser>> {
    Json(ApiResponse::success(Some(user), None, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::audit::models::AuditAction;
    use crate::features::auth::model::Role;
    use crate::shared::test_helpers::{stub_pipeline, TestApp};
    use axum::http::header;
    use fake::faker::internet::en::SafeEmail;
    use fake::Fake;

    fn register_fields<'a>(email: &'a str, password: &'a str) -> [(&'a str, &'a str); 4] {
        [
            ("name", "Test User"),
            ("email", email),
            ("password", password),
            ("confirm_password", password),
        ]
    }

    #[tokio::test]
    async fn test_register_then_login_sets_session() {
        let app = TestApp::new().await;
        let email: String = SafeEmail().fake();

        let response = app
            .server
            .post("/register")
            .form(&register_fields(&email, "secret123"))
            .await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.header(header::LOCATION), "/login");

        let page = app.server.get("/login").await;
        page.assert_status_ok();
        page.assert_text_contains("Registration successful");

        let response = app
            .server
            .post("/login")
            .form(&[("email", email.as_str()), ("password", "secret123")])
            .await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.header(header::LOCATION), "/dashboard");

        let me: ApiResponse<CurrentUser> = app.server.get("/api/me").await.json();
        let me = me.data.unwrap();
        assert_eq!(me.email, email.to_lowercase());
        assert_eq!(me.role, Role::User);
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_rejected() {
        let app = TestApp::new().await;

        app.server
            .post("/register")
            .form(&register_fields("dup@example.com", "secret123"))
            .await
            .assert_status(StatusCode::SEE_OTHER);

        let response = app
            .server
            .post("/register")
            .add_header(header::ACCEPT, "application/json")
            .form(&register_fields("DUP@example.com", "secret123"))
            .await;
        response.assert_status(StatusCode::CONFLICT);
        assert_eq!(app.count("SELECT COUNT(*) FROM users").await, 1);

        let response = app
            .server
            .post("/register")
            .form(&register_fields("dup@example.com", "secret123"))
            .await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.header(header::LOCATION), "/register");
        app.server
            .get("/register")
            .await
            .assert_text_contains("Email already registered");
    }

    #[tokio::test]
    async fn test_register_validation_errors() {
        let app = TestApp::new().await;

        let response = app
            .server
            .post("/register")
            .add_header(header::ACCEPT, "application/json")
            .form(&[
                ("name", "A"),
                ("email", "nope"),
                ("password", "123"),
                ("confirm_password", "456"),
            ])
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        let message = body["message"].as_str().unwrap();
        assert!(message.contains("Invalid email format"));
        assert!(message.contains("Passwords must match"));
        assert_eq!(app.count("SELECT COUNT(*) FROM users").await, 0);
    }

    #[tokio::test]
    async fn test_wrong_password_keeps_next() {
        let app = TestApp::new().await;
        let email: String = SafeEmail().fake();
        app.sign_in(&email, "secret123").await;
        app.server.get("/logout").await;

        let response = app
            .server
            .post("/login")
            .form(&[
                ("email", email.as_str()),
                ("password", "wrong-password"),
                ("next", "/results/7"),
            ])
            .await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.header(header::LOCATION), "/login?next=%2Fresults%2F7");

        let page = app.server.get("/login?next=%2Fresults%2F7").await;
        page.assert_text_contains("Invalid email or password");
        page.assert_text_contains(r#"name="next""#);

        app.server
            .get("/api/me")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_follows_local_next_only() {
        let app = TestApp::new().await;
        let email: String = SafeEmail().fake();
        app.sign_in(&email, "secret123").await;

        let response = app
            .server
            .post("/login")
            .form(&[
                ("email", email.as_str()),
                ("password", "secret123"),
                ("next", "/results/3"),
            ])
            .await;
        assert_eq!(response.header(header::LOCATION), "/results/3");

        let response = app
            .server
            .post("/login")
            .form(&[
                ("email", email.as_str()),
                ("password", "secret123"),
                ("next", "//evil.example/steal"),
            ])
            .await;
        assert_eq!(response.header(header::LOCATION), "/dashboard");
    }

    #[tokio::test]
    async fn test_login_and_logout_are_audited() {
        let app = TestApp::new().await;
        let email: String = SafeEmail().fake();
        app.sign_in(&email, "secret123").await;

        let response = app
            .server
            .post("/logout")
            .add_header(header::ACCEPT, "application/json")
            .await;
        response.assert_status_ok();

        app.server
            .get("/api/me")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        let user = app
            .services
            .auth
            .find_by_email(&email.to_lowercase())
            .await
            .unwrap()
            .unwrap();
        for action in [AuditAction::Register, AuditAction::Login, AuditAction::Logout] {
            assert_eq!(
                app.services
                    .audit
                    .count_for_user(user.id, action)
                    .await
                    .unwrap(),
                1,
                "{:?}",
                action
            );
        }
    }

    #[tokio::test]
    async fn test_logout_requires_login() {
        let app = TestApp::new().await;

        let response = app.server.get("/logout").await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.header(header::LOCATION), "/login?next=%2Flogout");
    }

    #[tokio::test]
    async fn test_signed_in_user_skips_login_page() {
        let app = TestApp::new().await;
        let email: String = SafeEmail().fake();
        app.sign_in(&email, "secret123").await;

        let response = app.server.get("/login").await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.header(header::LOCATION), "/dashboard");
    }

    #[tokio::test]
    async fn test_forgot_password_response_is_neutral() {
        let app = TestApp::new().await;
        app.sign_in("known@example.com", "secret123").await;
        app.server.get("/logout").await;

        for email in ["known@example.com", "unknown@example.com"] {
            let response = app
                .server
                .post("/forgot-password")
                .add_header(header::ACCEPT, "application/json")
                .form(&[("email", email)])
                .await;
            response.assert_status_ok();
            let body: serde_json::Value = response.json();
            assert_eq!(body["message"], PASSWORD_RESET_MESSAGE);
        }

        let response = app
            .server
            .post("/forgot-password")
            .form(&[("email", "unknown@example.com")])
            .await;
        assert_eq!(response.header(header::LOCATION), "/login");

        let user = app
            .services
            .auth
            .find_by_email("known@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            app.services
                .audit
                .count_for_user(user.id, AuditAction::PasswordResetRequested)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_admin_emails_get_admin_role() {
        let app =
            TestApp::with_pipeline(stub_pipeline(), vec!["boss@example.com".to_string()]).await;
        app.sign_in("boss@example.com", "secret123").await;

        let me: ApiResponse<CurrentUser> = app.server.get("/api/me").await.json();
        assert_eq!(me.data.unwrap().role, Role::Admin);
    }
}
