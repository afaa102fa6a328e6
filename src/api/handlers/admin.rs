//! Admin-only routes: dashboard stats, export and user management.

use axum::{
    Json,
    extract::{
        Extension, Path, RawQuery,
        rejection::{JsonRejection, PathRejection},
    },
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::IntoResponse,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use super::utils::{query_pairs, require_permission};
use crate::{
    api::{
        AppState,
        response::{ErrorBody, PageBody, json_body, path_param},
    },
    credentials::{
        CredentialField, CredentialView,
        service::{self, ActiveUpdate},
    },
    error::{Error, Result},
    query::ListQuery,
    session::Permission,
    submissions::{
        export::{self, ExportRequest},
        stats::{self, Stats},
    },
};

#[utoipa::path(
    get,
    path = "/v1/admin/stats",
    responses(
        (status = 200, description = "Dashboard counts", body = Stats),
        (status = 403, description = "Admins only", body = ErrorBody)
    ),
    tag = "admin"
)]
pub async fn stats(state: Extension<Arc<AppState>>, headers: HeaderMap) -> Result<Json<Stats>> {
    require_permission(&headers, &state, Permission::ViewStats).await?;
    let report = stats::report(state.store(), Utc::now(), state.local_offset()).await?;
    Ok(Json(report))
}

#[utoipa::path(
    post,
    path = "/v1/admin/export",
    request_body = ExportRequest,
    responses(
        (status = 200, description = "Attachment with the matching submissions, newest first", content_type = "application/json"),
        (status = 400, description = "Invalid range or format", body = ErrorBody),
        (status = 403, description = "Admins only", body = ErrorBody)
    ),
    tag = "admin"
)]
pub async fn export(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<ExportRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    require_permission(&headers, &state, Permission::ExportSubmissions).await?;
    let request = json_body(payload)?;
    let file = export::export(state.store(), &request, Utc::now()).await?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(file.format.content_type()),
    );
    match HeaderValue::from_str(&format!("attachment; filename={}", file.filename)) {
        Ok(value) => {
            response_headers.insert(CONTENT_DISPOSITION, value);
        }
        Err(err) => error!("Failed to build Content-Disposition header: {err}"),
    }
    Ok((StatusCode::OK, response_headers, file.body))
}

#[utoipa::path(
    get,
    path = "/v1/admin/users",
    params(
        ("role" = Option<String>, Query, description = "admin or editor"),
        ("active" = Option<bool>, Query, description = "Active flag"),
        ("email" = Option<String>, Query, description = "Exact email"),
        ("search" = Option<String>, Query, description = "Substring over name and email"),
        ("sort" = Option<String>, Query, description = "Comma-separated fields, `-` for descending"),
        ("page" = Option<u32>, Query, description = "Page number, from 1"),
        ("limit" = Option<u32>, Query, description = "Page size")
    ),
    responses(
        (status = 200, description = "One page of users", body = PageBody),
        (status = 400, description = "Invalid query", body = ErrorBody),
        (status = 403, description = "Admins only", body = ErrorBody)
    ),
    tag = "admin"
)]
pub async fn list_users(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    RawQuery(raw): RawQuery,
) -> Result<Json<PageBody>> {
    require_permission(&headers, &state, Permission::ManageUsers).await?;
    let query = ListQuery::<CredentialField>::parse(&query_pairs(raw.as_deref()), state.limits())?;
    let page = service::list(state.store(), &query).await?;
    Ok(Json(PageBody::new(&query, page)?))
}

#[utoipa::path(
    patch,
    path = "/v1/admin/users/{id}/status",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = ActiveUpdate,
    responses(
        (status = 200, description = "Updated user", body = CredentialView),
        (status = 400, description = "Missing flag", body = ErrorBody),
        (status = 404, description = "Unknown user", body = ErrorBody)
    ),
    tag = "admin"
)]
pub async fn update_user_status(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<ActiveUpdate>, JsonRejection>,
) -> Result<Json<CredentialView>> {
    let identity = require_permission(&headers, &state, Permission::ManageUsers).await?;
    let id = path_param(id, "id", "User id must be a UUID")?;
    let active = json_body(payload)?
        .active
        .ok_or_else(|| Error::field("active", "Active must be true or false"))?;
    if !active && identity.user.id == id {
        return Err(Error::field("active", "You cannot deactivate your own account"));
    }
    Ok(Json(
        service::set_active(state.store(), id, active, Utc::now()).await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/v1/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 204, description = "User deactivated"),
        (status = 400, description = "Malformed id or own account", body = ErrorBody),
        (status = 404, description = "Unknown user", body = ErrorBody)
    ),
    tag = "admin"
)]
pub async fn delete_user(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode> {
    let identity = require_permission(&headers, &state, Permission::ManageUsers).await?;
    let id = path_param(id, "id", "User id must be a UUID")?;
    if identity.user.id == id {
        return Err(Error::field("id", "You cannot delete your own account"));
    }
    service::set_active(state.store(), id, false, Utc::now()).await?;
    Ok(StatusCode::NO_CONTENT)
}
