use axum::http::{header, HeaderMap, HeaderValue};

use crate::config::CookieConfig;

pub const ACCESS_COOKIE_NAME: &str = "accessToken";
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// Builds `Set-Cookie` values for the session cookies. Every cookie is
/// `HttpOnly`, `SameSite=Strict`, scoped to `/`, and `Secure` in production.
#[derive(Debug, Clone)]
pub struct SessionCookies {
    secure: bool,
    login_access_max_age: u64,
}

impl SessionCookies {
    pub fn new(cfg: &CookieConfig) -> Self {
        Self {
            secure: cfg.secure,
            login_access_max_age: cfg.login_access_max_age_secs,
        }
    }

    pub fn login_access(&self, token: &str) -> HeaderValue {
        self.build(ACCESS_COOKIE_NAME, token, self.login_access_max_age)
    }

    pub fn access(&self, token: &str, max_age_secs: u64) -> HeaderValue {
        self.build(ACCESS_COOKIE_NAME, token, max_age_secs)
    }

    pub fn refresh(&self, token: &str, max_age_secs: u64) -> HeaderValue {
        self.build(REFRESH_COOKIE_NAME, token, max_age_secs)
    }

    pub fn clear(&self, name: &str) -> HeaderValue {
        self.build(name, "", 0)
    }

    fn build(&self, name: &str, value: &str, max_age_secs: u64) -> HeaderValue {
        let mut cookie =
            format!("{name}={value}; Max-Age={max_age_secs}; Path=/; HttpOnly; SameSite=Strict");
        if self.secure {
            cookie.push_str("; Secure");
        }
        // tokens are base64url / JWT text, always valid header bytes
        HeaderValue::try_from(cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
    }
}

/// First non-empty value of cookie `name` across all `Cookie` headers.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, v)| *k == name && !v.is_empty())
        .map(|(_, v)| v)
}
