//! Error and page envelopes shared by every handler.

use axum::{
    Json,
    extract::{
        Path,
        rejection::{JsonRejection, PathRejection},
    },
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::{
    error::{Error, FieldError},
    query::{ListQuery, Page, Schema},
    store::StoreError,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Stable machine-readable kind, e.g. `validation_error`.
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl Error {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidCredentials => StatusCode::BAD_REQUEST,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Authentication(_) | Self::AccountLocked { .. } => StatusCode::UNAUTHORIZED,
            Self::Authorization => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Validation(_) => "Invalid input".to_string(),
            Self::InvalidCredentials => "Invalid credentials".to_string(),
            Self::RateLimited { .. } => "Too many requests, please try again later".to_string(),
            Self::StorageUnavailable(err) => {
                error!("Storage unavailable: {err}");
                "Service temporarily unavailable".to_string()
            }
            other => {
                debug!("Request failed: {other}");
                other.to_string()
            }
        };

        let retry_after = match &self {
            Self::RateLimited {
                retry_after_seconds,
            } => Some(*retry_after_seconds),
            _ => None,
        };
        let body = ErrorBody {
            kind: self.kind().to_string(),
            message,
            locked_until: match &self {
                Self::AccountLocked { until } => Some(*until),
                _ => None,
            },
            retry_after_seconds: retry_after,
            errors: match self {
                Self::Validation(errors) => Some(errors),
                _ => None,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(seconds) = retry_after
            && let Ok(value) = HeaderValue::from_str(&seconds.to_string())
        {
            response.headers_mut().insert(RETRY_AFTER, value);
        }
        response
    }
}

/// Unwrap a JSON body, reporting a malformed or oversized one as a validation error.
///
/// # Errors
/// Returns `Error::Validation` on the `body` field.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Error> {
    payload.map(|Json(value)| value).map_err(|rejection| {
        debug!("Rejected request body: {rejection}");
        Error::field("body", "Request body must be a JSON object of at most 10 KiB")
    })
}

/// Unwrap a path parameter, reporting an unparsable one as a validation error on `field`.
///
/// # Errors
/// Returns `Error::Validation` on `field`.
pub fn path_param<T>(
    param: Result<Path<T>, PathRejection>,
    field: &str,
    message: &str,
) -> Result<T, Error> {
    param.map(|Path(value)| value).map_err(|rejection| {
        debug!("Rejected path parameter {field}: {rejection}");
        Error::field(field, message)
    })
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PageBody {
    #[schema(value_type = Vec<Object>)]
    pub items: Vec<serde_json::Value>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub page_count: u64,
}

impl PageBody {
    /// Serialize and project `page` for `query`.
    ///
    /// # Errors
    /// Returns `Error::StorageUnavailable` if a stored item does not serialize.
    pub fn new<F: Schema, T: Serialize>(
        query: &ListQuery<F>,
        page: Page<T>,
    ) -> Result<Self, Error> {
        let items = page
            .items
            .iter()
            .map(|item| {
                serde_json::to_value(item)
                    .map(|value| query.project(value))
                    .map_err(|err| {
                        error!("Failed to serialize listed item: {err}");
                        Error::from(StoreError::Corrupt(err.to_string()))
                    })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(Self {
            items,
            total: page.total,
            page: query.page,
            limit: query.limit,
            page_count: query.page_count(page.total),
        })
    }
}
