//! One-shot flash messages carried between a redirect and the next page.
//!
//! Handlers queue a message on the response; the session middleware signs it
//! into a short-lived `flash` cookie and removes the cookie once a page has
//! shown its messages.

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

pub const FLASH_COOKIE: &str = "flash";

/// Flash cookies outlive a redirect but not a forgotten tab.
const FLASH_MAX_AGE_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Error,
            message: message.into(),
        }
    }
}

/// Flash messages that arrived with the current request
#[derive(Debug, Clone, Default)]
pub struct Flashes(Vec<Flash>);

impl Flashes {
    pub fn messages(&self) -> &[Flash] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn decode(raw: &str) -> Self {
        let messages = BASE64
            .decode(raw)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<Vec<Flash>>(&bytes).ok())
            .unwrap_or_default();
        Self(messages)
    }
}

/// Messages queued on a response, waiting to be signed into the cookie
#[derive(Debug, Clone)]
struct PendingFlash(Vec<Flash>);

/// Set on responses that displayed the request's flash messages
#[derive(Debug, Clone, Copy)]
pub struct FlashesShown;

/// Read by the session middleware into the request extensions
impl<S> FromRequestParts<S> for Flashes
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Flashes>().cloned().unwrap_or_default())
    }
}

fn encode(messages: &[Flash]) -> String {
    // Serializing a Vec of plain structs cannot fail
    let json = serde_json::to_vec(messages).unwrap_or_default();
    BASE64.encode(json)
}

fn flash_cookie(messages: &[Flash]) -> Cookie<'static> {
    Cookie::build((FLASH_COOKIE, encode(messages)))
        .path("/")
        .max_age(time::Duration::seconds(FLASH_MAX_AGE_SECS))
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Messages from a correctly signed `flash` cookie; anything else reads as none
pub fn read(jar: &SignedCookieJar) -> Flashes {
    jar.get(FLASH_COOKIE)
        .map(|cookie| Flashes::decode(cookie.value()))
        .unwrap_or_default()
}

/// Sign queued messages into the cookie, or drop a cookie a page has shown
pub fn commit(jar: SignedCookieJar, mut response: Response) -> Response {
    let jar = if let Some(PendingFlash(messages)) = response.extensions_mut().remove::<PendingFlash>() {
        jar.add(flash_cookie(&messages))
    } else if response.extensions().get::<FlashesShown>().is_some() {
        jar.remove(Cookie::build(FLASH_COOKIE).path("/").build())
    } else {
        return response;
    };
    (jar, response).into_response()
}

/// Redirect to `to`, showing `flash` on the next rendered page.
pub fn redirect_with(to: &str, flash: Flash) -> Response {
    let mut response = Redirect::to(to).into_response();
    response.extensions_mut().insert(PendingFlash(vec![flash]));
    response
}
