use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use blog_common::rpc::Page;

use crate::domain::AppState;
use crate::infrastructure::http::api::{ApiError, ApiSuccess};
use crate::infrastructure::http::auth::{CurrentUser, MaybeViewer};
use crate::infrastructure::http::handlers::dto::{
    ArticleRequest, ArticleView, ArticleWritten, LikeRequest, ListParams, ReadParams,
    SuccessResponse,
};
use crate::infrastructure::http::handlers::{article_id, json_body};
use crate::infrastructure::http::querystring::QueryString;

pub async fn list_articles<S: AppState>(
    State(state): State<S>,
    MaybeViewer(viewer): MaybeViewer,
    QueryString(params): QueryString<ListParams>,
) -> Result<ApiSuccess<Vec<ArticleView>>, ApiError> {
    let page = Page::new(params.limit, params.offset);
    let articles = state.aggregator().list_articles(viewer, page).await?;

    Ok(ApiSuccess::ok(
        articles.into_iter().map(ArticleView::from).collect(),
    ))
}

pub async fn get_article<S: AppState>(
    State(state): State<S>,
    MaybeViewer(viewer): MaybeViewer,
    Path(id): Path<String>,
    QueryString(params): QueryString<ReadParams>,
) -> Result<ApiSuccess<ArticleView>, ApiError> {
    let id = article_id(&id)?;
    let token = params.access_token.filter(|token| !token.is_empty());
    let article = state.aggregator().read_article(id, viewer, token).await?;

    Ok(ApiSuccess::ok(article.into()))
}

pub async fn create_article<S: AppState>(
    State(state): State<S>,
    CurrentUser(owner): CurrentUser,
    body: Result<Json<ArticleRequest>, JsonRejection>,
) -> Result<ApiSuccess<ArticleWritten>, ApiError> {
    let draft = json_body(body)?.into_draft()?;
    let article = state.aggregator().create_article(owner, draft).await?;

    Ok(ApiSuccess::new(
        StatusCode::CREATED,
        ArticleWritten::new(article, state.article_url_base()),
    ))
}

pub async fn update_article<S: AppState>(
    State(state): State<S>,
    CurrentUser(owner): CurrentUser,
    Path(id): Path<String>,
    body: Result<Json<ArticleRequest>, JsonRejection>,
) -> Result<ApiSuccess<ArticleWritten>, ApiError> {
    let id = article_id(&id)?;
    let draft = json_body(body)?.into_draft()?;
    let article = state.aggregator().update_article(id, owner, draft).await?;

    Ok(ApiSuccess::ok(ArticleWritten::new(
        article,
        state.article_url_base(),
    )))
}

pub async fn delete_article<S: AppState>(
    State(state): State<S>,
    CurrentUser(owner): CurrentUser,
    Path(id): Path<String>,
) -> Result<ApiSuccess<SuccessResponse>, ApiError> {
    let id = article_id(&id)?;
    state.aggregator().delete_article(id, owner).await?;

    Ok(ApiSuccess::ok(SuccessResponse::OK))
}

pub async fn like_article<S: AppState>(
    State(state): State<S>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    body: Result<Json<LikeRequest>, JsonRejection>,
) -> Result<ApiSuccess<SuccessResponse>, ApiError> {
    let id = article_id(&id)?;
    let like = json_body(body)?
        .like
        .ok_or_else(|| ApiError::BadRequest("like field required".into()))?;
    let outcome = state.aggregator().set_like(id, user, like).await?;

    Ok(ApiSuccess::ok(outcome.into()))
}
