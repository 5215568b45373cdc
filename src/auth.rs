//! Request authentication: a static API key for automation callers, or a
//! signed session cookie for the browser.

use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::Error;

pub const SESSION_COOKIE: &str = "session";
const SESSION_SUBJECT: &str = "dashboard";

/// Token format: `{subject}.{hex(sha256(secret:subject))}`.
pub fn sign_session(secret: &str) -> String {
    format!("{SESSION_SUBJECT}.{}", signature(secret, SESSION_SUBJECT))
}

pub fn verify_session(secret: &str, token: &str) -> bool {
    let Some((subject, sig)) = token.split_once('.') else {
        return false;
    };
    constant_time_eq(&signature(secret, subject), sig)
}

fn signature(secret: &str, subject: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b":");
    hasher.update(subject.as_bytes());
    hex::encode(hasher.finalize())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Gate for mutation endpoints: accepts a matching `x-api-key` header, a
/// matching bearer token, or a valid session cookie.
pub fn require_auth(headers: &HeaderMap, config: &Config) -> Result<(), Error> {
    if has_valid_api_key(headers, config) || has_valid_session(headers, config) {
        Ok(())
    } else {
        Err(Error::Unauthorized)
    }
}

/// Stricter gate for agent-only endpoints (research progress reports).
pub fn require_api_key(headers: &HeaderMap, config: &Config) -> Result<(), Error> {
    if has_valid_api_key(headers, config) {
        Ok(())
    } else {
        Err(Error::Unauthorized)
    }
}

fn has_valid_api_key(headers: &HeaderMap, config: &Config) -> bool {
    let Some(expected) = config.api_key.as_deref() else {
        return false;
    };
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        if constant_time_eq(key, expected) {
            return true;
        }
    }
    if let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return constant_time_eq(token, expected);
        }
    }
    false
}

fn has_valid_session(headers: &HeaderMap, config: &Config) -> bool {
    let Some(cookies) = headers.get(COOKIE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    cookies
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .any(|(name, value)| {
            name == SESSION_COOKIE && verify_session(&config.session_secret, value)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::HeaderValue;

    fn config() -> Config {
        Config {
            api_key: Some("agent-key".into()),
            session_secret: "s3cret".into(),
            password: Some("hunter2".into()),
            db_path: None,
        }
    }

    #[test]
    fn session_round_trip() {
        let token = sign_session("s3cret");
        assert!(verify_session("s3cret", &token));
        assert!(!verify_session("other", &token));
        assert!(!verify_session("s3cret", "dashboard.deadbeef"));
        assert!(!verify_session("s3cret", "garbage"));
    }

    #[test]
    fn api_key_header_accepted() {
        let config = config();
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("agent-key"));
        assert!(require_auth(&headers, &config).is_ok());
        assert!(require_api_key(&headers, &config).is_ok());
    }

    #[test]
    fn bearer_token_accepted() {
        let config = config();
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer agent-key"));
        assert!(require_auth(&headers, &config).is_ok());
    }

    #[test]
    fn session_cookie_accepted_but_not_for_agent_gate() {
        let config = config();
        let cookie = format!("theme=dark; {}={}", SESSION_COOKIE, sign_session("s3cret"));
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(&cookie).unwrap());
        assert!(require_auth(&headers, &config).is_ok());
        assert!(require_api_key(&headers, &config).is_err());
    }

    #[test]
    fn missing_or_wrong_credentials_rejected() {
        let config = config();
        let headers = HeaderMap::new();
        assert!(require_auth(&headers, &config).is_err());

        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("wrong"));
        assert!(require_auth(&headers, &config).is_err());
    }

    #[test]
    fn key_auth_disabled_when_unconfigured() {
        let config = Config {
            api_key: None,
            ..config()
        };
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static(""));
        assert!(require_api_key(&headers, &config).is_err());
    }
}
