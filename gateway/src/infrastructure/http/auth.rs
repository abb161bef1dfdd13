use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use blog_common::{UserId, Viewer};

use crate::domain::AppState;
use crate::infrastructure::http::api::ApiError;

/// Why a request carries no usable credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Missing {
    Header,
    Format,
    Token,
}

impl Missing {
    fn message(self) -> &'static str {
        match self {
            Missing::Header => "authorization required",
            Missing::Format => "invalid authorization format",
            Missing::Token => "invalid token",
        }
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, Missing> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or(Missing::Header)?
        .to_str()
        .map_err(|_| Missing::Format)?;
    let token = header.strip_prefix("Bearer ").ok_or(Missing::Format)?.trim();
    if token.is_empty() {
        return Err(Missing::Format);
    }
    Ok(token)
}

/// Resolves the caller. `Ok(Err(_))` means no valid credentials were
/// presented; `Err(_)` means identity could not answer.
async fn resolve<S: AppState>(
    parts: &Parts,
    state: &S,
) -> Result<Result<UserId, Missing>, ApiError> {
    let token = match bearer_token(parts) {
        Ok(token) => token,
        Err(missing) => return Ok(Err(missing)),
    };
    let user = state.aggregator().authenticate(token).await?;
    Ok(user.ok_or(Missing::Token))
}

/// Caller of a route that requires authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub UserId);

impl<S: AppState> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match resolve(parts, state).await? {
            Ok(user) => Ok(CurrentUser(user)),
            Err(missing) => {
                tracing::debug!(reason = missing.message(), "request rejected");
                Err(ApiError::Unauthorized(missing.message().into()))
            }
        }
    }
}

/// Caller of a route open to everyone. Missing or bad credentials, and an
/// identity outage, all read as anonymous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaybeViewer(pub Viewer);

impl<S: AppState> FromRequestParts<S> for MaybeViewer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let viewer = match resolve(parts, state).await {
            Ok(Ok(user)) => Viewer::User(user),
            Ok(Err(Missing::Header)) => Viewer::Anonymous,
            Ok(Err(missing)) => {
                tracing::debug!(reason = missing.message(), "continuing anonymously");
                Viewer::Anonymous
            }
            Err(error) => {
                tracing::warn!(?error, "identity unavailable, continuing anonymously");
                Viewer::Anonymous
            }
        };
        Ok(MaybeViewer(viewer))
    }
}
