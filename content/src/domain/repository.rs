use std::future::Future;

use blog_common::{
    Article, ArticleAccess, ArticleDraft, ArticleId, ServiceError, UserId, rpc::Page,
};

/// Storage of article records. Every mutation runs in its own transaction;
/// the closures passed to `update` and `delete` see the row as locked by
/// that transaction.
pub trait ArticleRepository: Clone + Send + Sync + 'static {
    fn insert(
        &self,
        owner: UserId,
        draft: &ArticleDraft,
        access: &ArticleAccess,
    ) -> impl Future<Output = Result<Article, ServiceError>> + Send;

    fn find_by_id(
        &self,
        id: ArticleId,
    ) -> impl Future<Output = Result<Option<Article>, ServiceError>> + Send;

    /// Replaces the article with whatever `revise` makes of it.
    fn update<F>(
        &self,
        id: ArticleId,
        revise: F,
    ) -> impl Future<Output = Result<Article, ServiceError>> + Send
    where
        F: FnOnce(Article) -> Result<Article, ServiceError> + Send + 'static;

    /// Deletes the article when `authorize` accepts it.
    fn delete<F>(
        &self,
        id: ArticleId,
        authorize: F,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send
    where
        F: FnOnce(&Article) -> Result<(), ServiceError> + Send + 'static;

    /// Public articles, newest first.
    fn list_public(
        &self,
        page: Page,
    ) -> impl Future<Output = Result<Vec<Article>, ServiceError>> + Send;

    /// Articles of `owner`, newest first; private and link ones only when
    /// `include_hidden`.
    fn list_by_owner(
        &self,
        owner: UserId,
        include_hidden: bool,
    ) -> impl Future<Output = Result<Vec<Article>, ServiceError>> + Send;
}
