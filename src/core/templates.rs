//! Server-rendered pages using Jinja2 syntax.
//!
//! Templates are embedded at compile time and registered into a single
//! process-wide environment on first use.

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use minijinja::{context, Environment, Value};
use std::sync::OnceLock;
use thiserror::Error;

use crate::core::error::{AppError, PageError};
use crate::core::flash::{Flashes, FlashesShown};
use crate::features::auth::model::CurrentUser;

/// Global template environment
static TEMPLATE_ENV: OnceLock<Environment<'static>> = OnceLock::new();

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../../templates/base.html")),
    ("index.html", include_str!("../../templates/index.html")),
    ("about.html", include_str!("../../templates/about.html")),
    ("dashboard.html", include_str!("../../templates/dashboard.html")),
    ("result.html", include_str!("../../templates/result.html")),
    ("login.html", include_str!("../../templates/login.html")),
    ("register.html", include_str!("../../templates/register.html")),
    (
        "forgot_password.html",
        include_str!("../../templates/forgot_password.html"),
    ),
    ("error.html", include_str!("../../templates/error.html")),
];

/// Errors that can occur during template operations
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template '{0}' not found")]
    NotFound(String),

    #[error("Failed to render template: {0}")]
    RenderError(String),
}

impl From<TemplateError> for AppError {
    fn from(err: TemplateError) -> Self {
        AppError::Internal(err.to_string())
    }
}

fn init_environment() -> Environment<'static> {
    let mut env = Environment::new();

    for (name, source) in TEMPLATES {
        if let Err(e) = env.add_template(name, source) {
            tracing::warn!("Failed to load template {}: {}", name, e);
        } else {
            tracing::debug!("Loaded template: {}", name);
        }
    }

    env
}

fn get_environment() -> &'static Environment<'static> {
    TEMPLATE_ENV.get_or_init(init_environment)
}

/// Render a template with the given context.
pub fn render(template_name: &str, ctx: Value) -> Result<String, TemplateError> {
    let template = get_environment()
        .get_template(template_name)
        .map_err(|_| TemplateError::NotFound(template_name.to_string()))?;

    template
        .render(ctx)
        .map_err(|e| TemplateError::RenderError(e.to_string()))
}

/// Per-request values every page layout needs.
pub struct PageContext<'a> {
    pub user: Option<&'a CurrentUser>,
    pub flashes: &'a Flashes,
}

/// Render a full page, merging the layout context into `ctx`.
///
/// Flash messages shown by this page are consumed; the session middleware
/// then removes the flash cookie.
pub fn render_page(name: &str, page: PageContext<'_>, ctx: Value) -> Result<Response, PageError> {
    let body = render(
        name,
        context! {
            current_user => page.user,
            flashes => page.flashes.messages(),
            ..ctx
        },
    )
    .map_err(AppError::from)?;

    let mut response = Html(body).into_response();
    if !page.flashes.is_empty() {
        response.extensions_mut().insert(FlashesShown);
    }
    Ok(response)
}

/// Render the generic error page; falls back to plain text if rendering fails.
pub fn render_error_page(status: StatusCode, message: &str) -> Response {
    let ctx = context! {
        status => status.as_u16(),
        reason => status.canonical_reason().unwrap_or("Error"),
        message => message,
        current_user => Value::from(()),
        flashes => Vec::<Value>::new(),
    };

    match render("error.html", ctx) {
        Ok(body) => (status, Html(body)).into_response(),
        Err(e) => {
            tracing::error!("Failed to render error page: {}", e);
            (status, message.to_string()).into_response()
        }
    }
}

/// Check if a template exists
#[cfg(test)]
pub fn template_exists(template_name: &str) -> bool {
    get_environment().get_template(template_name).is_ok()
}
