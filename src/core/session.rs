//! Signed session cookies.
//!
//! A session is an HS256 JWT signed with `SECRET_KEY`, holding the user id.
//! It is stored in an HttpOnly cookie; logging out clears the cookie.

use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, CookieJar, Key, SameSite};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use std::time::Duration;
use uuid::Uuid;

use crate::core::config::SessionConfig;
use crate::core::error::AppError;

pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    /// Unique per login, useful when correlating logs
    sid: String,
    iat: i64,
    exp: i64,
}

pub struct SessionManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
    cookie_secure: bool,
    /// Signs the non-session cookies (flash messages)
    cookie_key: Key,
}

impl SessionManager {
    pub fn new(config: &SessionConfig) -> Self {
        let secret = config.secret_key.as_bytes();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl: config.ttl,
            cookie_secure: config.cookie_secure,
            // SHA-512 stretches any secret to the 64 bytes a cookie key needs
            cookie_key: Key::from(Sha512::digest(secret).as_slice()),
        }
    }

    /// Issue a signed session token for the user
    pub fn issue(&self, user_id: i64) -> Result<String, AppError> {
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: user_id.to_string(),
            sid: Uuid::now_v7().to_string(),
            iat: now,
            exp: now + self.ttl.as_secs() as i64,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to sign session: {}", e)))
    }

    /// Verify a session token, returning the user id it was issued for.
    ///
    /// Tampered, expired or malformed tokens yield `None`.
    pub fn verify(&self, token: &str) -> Option<i64> {
        match decode::<SessionClaims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => data.claims.sub.parse().ok(),
            Err(e) => {
                tracing::debug!("Rejected session token: {}", e);
                None
            }
        }
    }

    /// Resolve the user id from the request's session cookie
    pub fn user_id_from_headers(&self, headers: &HeaderMap) -> Option<i64> {
        CookieJar::from_headers(headers)
            .get(SESSION_COOKIE)
            .and_then(|cookie| self.verify(cookie.value()))
    }

    pub fn cookie_key(&self) -> &Key {
        &self.cookie_key
    }

    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .max_age(time::Duration::seconds(self.ttl.as_secs() as i64))
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.cookie_secure)
            .build()
    }

    /// The cookie to hand to `CookieJar::remove` on logout
    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build(SESSION_COOKIE)
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.cookie_secure)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;
    use axum::response::IntoResponse;

    fn manager(secret: &str, secure: bool) -> SessionManager {
        SessionManager::new(&SessionConfig {
            secret_key: secret.to_string(),
            cookie_secure: secure,
            ttl: Duration::from_secs(3600),
        })
    }

    #[test]
    fn test_issue_and_verify() {
        let sessions = manager("test-secret", false);
        let token = sessions.issue(42).unwrap();
        assert_eq!(sessions.verify(&token), Some(42));
    }

    #[test]
    fn test_token_from_other_secret_is_rejected() {
        let token = manager("one-secret", false).issue(7).unwrap();
        assert_eq!(manager("another-secret", false).verify(&token), None);
        assert_eq!(manager("one-secret", false).verify("garbage"), None);
    }

    #[test]
    fn test_cookie_flags() {
        let cookie = manager("s", true).session_cookie("abc".to_string());
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(3600)));

        let cookie = manager("s", false).session_cookie("abc".to_string());
        assert_eq!(cookie.secure(), Some(false));
    }

    #[test]
    fn test_logout_emits_removal_cookie() {
        let sessions = manager("s", false);
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "session=abc".parse().unwrap());

        let jar = CookieJar::from_headers(&headers).remove(sessions.removal_cookie());
        let set_cookie = jar
            .into_response()
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(set_cookie.starts_with("session=;"));
        assert!(set_cookie.contains("Max-Age=0"));
    }

    #[test]
    fn test_user_id_from_cookie_header() {
        let sessions = manager("test-secret", false);
        let token = sessions.issue(9).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            format!("theme=dark; session={}", token).parse().unwrap(),
        );
        assert_eq!(sessions.user_id_from_headers(&headers), Some(9));

        headers.insert(header::COOKIE, "session=".parse().unwrap());
        assert_eq!(sessions.user_id_from_headers(&headers), None);
        assert_eq!(sessions.user_id_from_headers(&HeaderMap::new()), None);
    }
}
