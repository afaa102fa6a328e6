//! Public intake plus the admin triage routes for submissions.

use axum::{
    Json,
    extract::{
        Extension, Path, RawQuery,
        rejection::{JsonRejection, PathRejection},
    },
    http::{Extensions, HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::utils::{query_pairs, request_metadata, require_permission};
use crate::{
    api::{
        AppState,
        response::{ErrorBody, PageBody, json_body, path_param},
    },
    error::Result,
    query::ListQuery,
    session::Permission,
    submissions::{self, Receipt, StatusUpdate, Submission, SubmissionField, SubmissionInput},
};

#[utoipa::path(
    post,
    path = "/v1/submissions",
    request_body = SubmissionInput,
    responses(
        (status = 201, description = "Submission stored", body = Receipt),
        (status = 400, description = "Invalid submission", body = ErrorBody),
        (status = 429, description = "Too many submissions from this origin", body = ErrorBody),
        (status = 503, description = "Store unavailable", body = ErrorBody)
    ),
    tag = "submissions"
)]
pub async fn create(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    extensions: Extensions,
    payload: Result<Json<SubmissionInput>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let input = json_body(payload)?;
    let origin = request_metadata(&headers, &extensions, state.trust_proxy_headers());
    let receipt = submissions::submit(state.store(), state.intake(), input, origin, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

#[utoipa::path(
    get,
    path = "/v1/submissions",
    params(
        ("status" = Option<String>, Query, description = "Exact status match"),
        ("category" = Option<String>, Query, description = "Exact category match"),
        ("search" = Option<String>, Query, description = "Substring over name, email, subject and message"),
        ("created_at_gte" = Option<String>, Query, description = "Created at or after (RFC 3339 or YYYY-MM-DD)"),
        ("created_at_lte" = Option<String>, Query, description = "Created at or before"),
        ("sort" = Option<String>, Query, description = "Comma-separated fields, `-` for descending"),
        ("fields" = Option<String>, Query, description = "Comma-separated projection"),
        ("page" = Option<u32>, Query, description = "Page number, from 1"),
        ("limit" = Option<u32>, Query, description = "Page size")
    ),
    responses(
        (status = 200, description = "One page of submissions", body = PageBody),
        (status = 400, description = "Invalid query", body = ErrorBody),
        (status = 401, description = "Not logged in", body = ErrorBody)
    ),
    tag = "submissions"
)]
pub async fn list(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    RawQuery(raw): RawQuery,
) -> Result<Json<PageBody>> {
    require_permission(&headers, &state, Permission::ReadSubmissions).await?;
    let query = ListQuery::<SubmissionField>::parse(&query_pairs(raw.as_deref()), state.limits())?;
    let page = submissions::list(state.store(), &query).await?;
    Ok(Json(PageBody::new(&query, page)?))
}

#[utoipa::path(
    get,
    path = "/v1/submissions/{id}",
    params(("id" = Uuid, Path, description = "Submission id")),
    responses(
        (status = 200, description = "Submission", body = Submission),
        (status = 400, description = "Malformed id", body = ErrorBody),
        (status = 404, description = "Unknown submission", body = ErrorBody)
    ),
    tag = "submissions"
)]
pub async fn get(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Submission>> {
    require_permission(&headers, &state, Permission::ReadSubmissions).await?;
    let id = path_param(id, "id", "Submission id must be a UUID")?;
    Ok(Json(submissions::get(state.store(), id).await?))
}

#[utoipa::path(
    patch,
    path = "/v1/submissions/{id}/status",
    params(("id" = Uuid, Path, description = "Submission id")),
    request_body = StatusUpdate,
    responses(
        (status = 200, description = "Updated submission", body = Submission),
        (status = 400, description = "Unknown status", body = ErrorBody),
        (status = 404, description = "Unknown submission", body = ErrorBody)
    ),
    tag = "submissions"
)]
pub async fn update_status(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<Submission>> {
    let identity = require_permission(&headers, &state, Permission::TriageSubmissions).await?;
    let id = path_param(id, "id", "Submission id must be a UUID")?;
    let update = json_body(payload)?;
    let updated =
        submissions::update_status(state.store(), id, &update, identity.user.id, Utc::now()).await?;
    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/v1/submissions/{id}",
    params(("id" = Uuid, Path, description = "Submission id")),
    responses(
        (status = 204, description = "Submission deleted"),
        (status = 400, description = "Malformed id", body = ErrorBody),
        (status = 403, description = "Admins only", body = ErrorBody),
        (status = 404, description = "Unknown submission", body = ErrorBody)
    ),
    tag = "submissions"
)]
pub async fn delete(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode> {
    require_permission(&headers, &state, Permission::DeleteSubmissions).await?;
    let id = path_param(id, "id", "Submission id must be a UUID")?;
    submissions::delete(state.store(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
