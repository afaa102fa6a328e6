//! Request helpers shared by the handlers: client origin, session cookie and
//! token extraction, and query-string decoding.

use axum::{
    extract::ConnectInfo,
    http::{
        Extensions, HeaderMap, HeaderName, HeaderValue,
        header::{AUTHORIZATION, COOKIE, InvalidHeaderValue, REFERER, USER_AGENT},
    },
};
use chrono::Utc;
use std::net::SocketAddr;

use crate::{
    api::AppState,
    error::{Error, Result},
    session::{self, Identity, Permission},
    submissions::Metadata,
};

pub const SESSION_COOKIE_NAME: &str = "quotedesk_session";

/// Client IP used for rate limiting and the spam heuristic.
///
/// The socket peer is authoritative. `X-Forwarded-For` and `X-Real-IP` are
/// only honoured with `trust_proxy_headers`, i.e. behind a proxy that
/// overwrites them.
pub fn extract_client_ip(
    headers: &HeaderMap,
    extensions: &Extensions,
    trust_proxy_headers: bool,
) -> Option<String> {
    if trust_proxy_headers && let Some(ip) = forwarded_ip(headers) {
        return Some(ip);
    }
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| header_text(headers, HeaderName::from_static("x-real-ip")))
}

fn header_text(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Origin metadata recorded with a submission.
pub fn request_metadata(
    headers: &HeaderMap,
    extensions: &Extensions,
    trust_proxy_headers: bool,
) -> Metadata {
    Metadata {
        ip_address: extract_client_ip(headers, extensions, trust_proxy_headers),
        user_agent: header_text(headers, USER_AGENT),
        referrer: header_text(headers, REFERER),
        is_potential_spam: false,
    }
}

/// Build the `HttpOnly` session cookie.
pub fn session_cookie(
    token: &str,
    ttl_seconds: i64,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub fn clear_session_cookie(secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Bearer token first, then the session cookie.
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let value = headers.get(COOKIE)?.to_str().ok()?;
    for pair in value.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME && !val.is_empty() {
            return Some(val.to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Resolve the caller, or fail with 401.
///
/// # Errors
/// `Authentication` when no token is presented or it does not verify.
pub async fn require_auth(headers: &HeaderMap, state: &AppState) -> Result<Identity> {
    let token = extract_session_token(headers)
        .ok_or(Error::Authentication("not logged in"))?;
    session::verify(state.store(), state.keys(), &token, Utc::now()).await
}

/// Resolve the caller and check `permission`.
///
/// # Errors
/// As [`require_auth`], plus `Authorization` when the role is not allowed.
pub async fn require_permission(
    headers: &HeaderMap,
    state: &AppState,
    permission: Permission,
) -> Result<Identity> {
    let identity = require_auth(headers, state).await?;
    session::authorize(&identity, permission)?;
    Ok(identity)
}

/// Decode a raw query string into ordered pairs.
pub fn query_pairs(raw: Option<&str>) -> Vec<(String, String)> {
    raw.map(|raw| {
        url::form_urlencoded::parse(raw.as_bytes())
            .into_owned()
            .collect()
    })
    .unwrap_or_default()
}
