//! Service ports and their HTTP/JSON transport.
//!
//! Every call is `POST /rpc/<service>/<operation>` with a JSON body. Failures
//! travel as an HTTP status plus an [`wire::RpcFault`].

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{
    Article, ArticleCounters, ArticleDraft, ArticleId, ArticleStats, User, UserId, Viewer,
};
use crate::error::ServiceError;

pub mod client;
pub mod server;
pub mod wire;

pub use client::{HttpContentClient, HttpIdentityClient, HttpMetricsClient, RpcEndpoint};

pub const IDENTITY_SERVICE: &str = "identity";
pub const CONTENT_SERVICE: &str = "content";
pub const METRICS_SERVICE: &str = "metrics";

pub const DEFAULT_PAGE_LIMIT: u32 = 100;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Token validation and user lookup, owned by the identity service.
pub trait IdentityService: Clone + Send + Sync + 'static {
    /// `None` when the token is not valid.
    fn validate_token(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Option<UserId>, ServiceError>> + Send;

    fn get_user_by_id(
        &self,
        id: UserId,
    ) -> impl Future<Output = Result<Option<User>, ServiceError>> + Send;
}

/// An article together with its author's display name, when it resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthoredArticle {
    pub article: Article,
    pub author: Option<String>,
}

pub trait ContentService: Clone + Send + Sync + 'static {
    fn create_article(
        &self,
        owner: UserId,
        draft: ArticleDraft,
    ) -> impl Future<Output = Result<Article, ServiceError>> + Send;

    fn get_article(
        &self,
        id: ArticleId,
        viewer: Viewer,
        access_token: Option<String>,
    ) -> impl Future<Output = Result<AuthoredArticle, ServiceError>> + Send;

    fn update_article(
        &self,
        id: ArticleId,
        owner: UserId,
        draft: ArticleDraft,
    ) -> impl Future<Output = Result<Article, ServiceError>> + Send;

    fn delete_article(
        &self,
        id: ArticleId,
        owner: UserId,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// Public articles, newest first.
    fn list_articles(
        &self,
        viewer: Viewer,
        page: Page,
    ) -> impl Future<Output = Result<Vec<AuthoredArticle>, ServiceError>> + Send;

    /// Articles of `user`; non-public ones only when `viewer` is that user.
    fn list_user_articles(
        &self,
        user: UserId,
        viewer: Viewer,
    ) -> impl Future<Output = Result<Vec<AuthoredArticle>, ServiceError>> + Send;
}

pub trait MetricsService: Clone + Send + Sync + 'static {
    fn record_view(
        &self,
        article_id: ArticleId,
        viewer: Viewer,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;

    fn record_like(
        &self,
        article_id: ArticleId,
        user: UserId,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;

    fn remove_like(
        &self,
        article_id: ArticleId,
        user: UserId,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;

    fn get_article_stats(
        &self,
        article_id: ArticleId,
    ) -> impl Future<Output = Result<ArticleCounters, ServiceError>> + Send;

    fn get_user_like_status(
        &self,
        article_id: ArticleId,
        user: UserId,
    ) -> impl Future<Output = Result<bool, ServiceError>> + Send;

    /// One row per requested id, in request order.
    fn get_bulk_stats(
        &self,
        article_ids: Vec<ArticleId>,
        viewer: Viewer,
    ) -> impl Future<Output = Result<Vec<ArticleStats>, ServiceError>> + Send;
}

/// A window over a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

impl Page {
    /// Limits outside `1..=100` fall back to the default; negative offsets
    /// start at zero.
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        let limit = limit
            .and_then(|limit| u32::try_from(limit).ok())
            .filter(|limit| (1..=MAX_PAGE_LIMIT).contains(limit))
            .unwrap_or(DEFAULT_PAGE_LIMIT);
        let offset = offset
            .and_then(|offset| u32::try_from(offset).ok())
            .unwrap_or(0);
        Self { limit, offset }
    }
}

/// Runs a downstream call under a deadline. An elapsed deadline is reported
/// as `Timeout` for `service`.
pub async fn with_deadline<T>(
    service: &str,
    deadline: Duration,
    call: impl Future<Output = Result<T, ServiceError>>,
) -> Result<T, ServiceError> {
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(ServiceError::timeout(service)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_bounds() {
        assert_eq!(Page::new(None, None), Page::default());
        assert_eq!(Page::new(Some(0), Some(-4)), Page { limit: 100, offset: 0 });
        assert_eq!(Page::new(Some(500), Some(10)), Page { limit: 100, offset: 10 });
        assert_eq!(Page::new(Some(20), Some(40)), Page { limit: 20, offset: 40 });
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_deadline_is_a_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, ServiceError>(1)
        };
        let result = with_deadline(METRICS_SERVICE, Duration::from_secs(2), slow).await;
        assert_eq!(result, Err(ServiceError::timeout(METRICS_SERVICE)));
    }

    #[tokio::test]
    async fn explicit_failure_is_not_a_timeout() {
        let failing = async { Err::<u32, _>(ServiceError::unavailable(METRICS_SERVICE, "refused")) };
        let result = with_deadline(METRICS_SERVICE, Duration::from_secs(2), failing).await;
        assert!(matches!(result, Err(ServiceError::Unavailable { .. })));
    }
}
