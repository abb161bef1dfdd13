use axum::extract::{Path, State};

use crate::domain::AppState;
use crate::infrastructure::http::api::{ApiError, ApiSuccess};
use crate::infrastructure::http::auth::{CurrentUser, MaybeViewer};
use crate::infrastructure::http::handlers::dto::{ArticleView, UserResponse};
use crate::infrastructure::http::handlers::user_id;

pub async fn list_user_articles<S: AppState>(
    State(state): State<S>,
    MaybeViewer(viewer): MaybeViewer,
    Path(user): Path<String>,
) -> Result<ApiSuccess<Vec<ArticleView>>, ApiError> {
    let user = user_id(&user)?;
    let articles = state.aggregator().list_user_articles(user, viewer).await?;

    Ok(ApiSuccess::ok(
        articles.into_iter().map(ArticleView::from).collect(),
    ))
}

pub async fn me<S: AppState>(
    State(state): State<S>,
    CurrentUser(user): CurrentUser,
) -> Result<ApiSuccess<UserResponse>, ApiError> {
    let user = state.aggregator().current_user(user).await?;
    Ok(ApiSuccess::ok(user.into()))
}
