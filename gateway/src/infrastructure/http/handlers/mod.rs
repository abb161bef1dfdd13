use axum::extract::rejection::JsonRejection;
use axum::Json;
use blog_common::{ArticleId, UserId};

use crate::infrastructure::http::api::ApiError;

pub mod articles;
pub mod dto;
pub mod users;

fn parse_id<T>(raw: &str, what: &str, build: impl FnOnce(i64) -> Option<T>) -> Result<T, ApiError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(build)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid {what} id")))
}

pub(crate) fn article_id(raw: &str) -> Result<ArticleId, ApiError> {
    parse_id(raw, "article", |id| ArticleId::try_new(id).ok())
}

pub(crate) fn user_id(raw: &str) -> Result<UserId, ApiError> {
    parse_id(raw, "user", |id| UserId::try_new(id).ok())
}

/// Unwraps a JSON body, reporting a malformed one as a bad request.
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}
