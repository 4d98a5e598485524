use axum::{routing::get, Router};
use std::sync::Arc;

use crate::features::auth::handlers;
use crate::features::auth::services::AuthService;

/// Login, registration and password reset pages (no session required)
pub fn public_routes(service: Arc<AuthService>) -> Router {
    Router::new()
        .route("/login", get(handlers::login_page).post(handlers::login))
        .route(
            "/register",
            get(handlers::register_page).post(handlers::register),
        )
        .route(
            "/forgot-password",
            get(handlers::forgot_password_page).post(handlers::forgot_password),
        )
        .with_state(service)
}

/// Routes that require a session
pub fn protected_routes(service: Arc<AuthService>) -> Router {
    Router::new()
        .route("/logout", get(handlers::logout).post(handlers::logout))
        .route("/api/me", get(handlers::get_me))
        .with_state(service)
}
