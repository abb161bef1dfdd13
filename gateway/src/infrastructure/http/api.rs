use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use blog_common::ServiceError;
use serde::Serialize;

// ApiSuccess is a wrapper around a response that includes a status code.

#[derive(Debug, Clone)]
pub struct ApiSuccess<T: Serialize>(StatusCode, Json<T>);

impl<T: Serialize> ApiSuccess<T> {
    pub(crate) fn new(status: StatusCode, data: T) -> Self {
        ApiSuccess(status, Json(data))
    }

    pub(crate) fn ok(data: T) -> Self {
        Self::new(StatusCode::OK, data)
    }
}

impl<T: Serialize> IntoResponse for ApiSuccess<T> {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

// ApiError is a wrapper around a response that includes a status code.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    InternalServerError(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden,
    NotFound,
}

impl From<ServiceError> for ApiError {
    fn from(value: ServiceError) -> Self {
        match value {
            ServiceError::NotFound => Self::NotFound,
            ServiceError::AccessDenied => Self::Forbidden,
            ServiceError::Unauthorized => Self::Unauthorized("not authenticated".into()),
            ServiceError::ValidationFailed(message) => Self::BadRequest(message),
            dependency => Self::InternalServerError(dependency.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use ApiError::*;

        let (status, reason, message) = match self {
            InternalServerError(cause) => {
                tracing::error!(%cause, "request failed on a dependency");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal server error".to_string(),
                )
            }
            BadRequest(message) => (StatusCode::BAD_REQUEST, "validation_failed", message),
            Unauthorized(message) => (StatusCode::UNAUTHORIZED, "unauthorized", message),
            Forbidden => (
                StatusCode::FORBIDDEN,
                "access_denied",
                "access denied".to_string(),
            ),
            NotFound => (
                StatusCode::NOT_FOUND,
                "not_found",
                "not found".to_string(),
            ),
        };

        (
            status,
            Json(ApiResponseBody::new_error(status, reason, message)),
        )
            .into_response()
    }
}

// Generic response structure shared by all API errors.

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiResponseBody<T: Serialize + PartialEq> {
    pub status_code: u16,
    pub data: T,
}

impl ApiResponseBody<ApiErrorData> {
    pub fn new_error(status_code: StatusCode, reason: &'static str, message: String) -> Self {
        Self {
            status_code: status_code.as_u16(),
            data: ApiErrorData { reason, message },
        }
    }
}

/// The response data format for all error responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiErrorData {
    pub reason: &'static str,
    pub message: String,
}
