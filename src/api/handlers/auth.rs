//! Session endpoints for cookie and bearer auth.
//!
//! Login, password change and reset all answer with a fresh token in the body
//! and set the same token as an `HttpOnly` cookie; logout only clears the
//! cookie since tokens are stateless.

use axum::{
    Json,
    extract::{
        Extension, Path,
        rejection::{JsonRejection, PathRejection},
    },
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::error;

use super::utils::{clear_session_cookie, require_auth, require_permission, session_cookie};
use crate::{
    api::{
        AppState,
        response::{ErrorBody, json_body, path_param},
    },
    credentials::{
        CredentialView,
        service::{self, ForgotPassword, LoginInput, PasswordReset, PasswordUpdate, RegisterInput},
    },
    error::Result,
    session::{Identity, Permission, Session},
};

/// Body plus `Set-Cookie` for a freshly issued session.
fn with_cookie(state: &AppState, session: Session) -> impl IntoResponse + use<> {
    let mut headers = HeaderMap::new();
    match session_cookie(
        &session.token,
        state.keys().ttl().num_seconds(),
        state.cookie_secure(),
    ) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build session cookie: {err}"),
    }
    (StatusCode::OK, headers, Json(session))
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginInput,
    responses(
        (status = 200, description = "Logged in", body = Session),
        (status = 400, description = "Invalid credentials or payload", body = ErrorBody),
        (status = 401, description = "Account locked", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    state: Extension<Arc<AppState>>,
    payload: Result<Json<LoginInput>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let input = json_body(payload)?;
    let session = service::login(
        state.store(),
        state.keys(),
        state.lockout(),
        input,
        Utc::now(),
    )
    .await?;
    Ok(with_cookie(&state, session))
}

#[utoipa::path(
    get,
    path = "/v1/auth/me",
    responses(
        (status = 200, description = "Current identity", body = Identity),
        (status = 401, description = "Not logged in", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn me(state: Extension<Arc<AppState>>, headers: HeaderMap) -> Result<Json<Identity>> {
    Ok(Json(require_auth(&headers, &state).await?))
}

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterInput,
    responses(
        (status = 201, description = "User created", body = CredentialView),
        (status = 400, description = "Invalid payload or email taken", body = ErrorBody),
        (status = 403, description = "Admins only", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn register(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<RegisterInput>, JsonRejection>,
) -> Result<impl IntoResponse> {
    require_permission(&headers, &state, Permission::ManageUsers).await?;
    let input = json_body(payload)?;
    let view = service::register(state.store(), input, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[utoipa::path(
    patch,
    path = "/v1/auth/update-password",
    request_body = PasswordUpdate,
    responses(
        (status = 200, description = "Password changed, new session issued", body = Session),
        (status = 400, description = "Weak password or wrong current password", body = ErrorBody),
        (status = 401, description = "Not logged in", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn update_password(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<PasswordUpdate>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let identity = require_auth(&headers, &state).await?;
    let input = json_body(payload)?;
    let session =
        service::update_password(state.store(), state.keys(), &identity, input, Utc::now()).await?;
    Ok(with_cookie(&state, session))
}

#[utoipa::path(
    post,
    path = "/v1/auth/forgot-password",
    request_body = ForgotPassword,
    responses(
        (status = 202, description = "Reset email sent if the account exists"),
        (status = 400, description = "Malformed email", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    state: Extension<Arc<AppState>>,
    payload: Result<Json<ForgotPassword>, JsonRejection>,
) -> Result<StatusCode> {
    let input = json_body(payload)?;
    service::forgot_password(
        state.store(),
        state.mailer(),
        state.frontend_base_url(),
        input,
        Utc::now(),
    )
    .await?;
    Ok(StatusCode::ACCEPTED)
}

#[utoipa::path(
    patch,
    path = "/v1/auth/reset-password/{token}",
    params(("token" = String, Path, description = "Token from the reset email")),
    request_body = PasswordReset,
    responses(
        (status = 200, description = "Password reset, new session issued", body = Session),
        (status = 400, description = "Weak password or invalid token", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    state: Extension<Arc<AppState>>,
    token: Result<Path<String>, PathRejection>,
    payload: Result<Json<PasswordReset>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let token = path_param(token, "token", "Token is invalid or has expired")?;
    let input = json_body(payload)?;
    let session =
        service::reset_password(state.store(), state.keys(), &token, input, Utc::now()).await?;
    Ok(with_cookie(&state, session))
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cookie cleared")
    ),
    tag = "auth"
)]
pub async fn logout(state: Extension<Arc<AppState>>) -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(state.cookie_secure()) {
        headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, headers)
}
