use std::collections::HashMap;
use std::time::Duration;

use blog_common::{
    Article, ArticleCounters, ArticleDraft, ArticleId, ArticleStats, ServiceError, User, UserId,
    Viewer,
    rpc::{
        AuthoredArticle, CONTENT_SERVICE, ContentService, IDENTITY_SERVICE, IdentityService,
        METRICS_SERVICE, MetricsService, Page, with_deadline,
    },
};

/// An article as shown to a reader: content plus author and engagement.
/// Secondary fields are zero when their source could not answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedArticle {
    pub article: Article,
    pub author: Option<String>,
    pub views: u64,
    pub likes: u64,
    pub viewer_liked: bool,
}

impl AggregatedArticle {
    fn assemble(authored: AuthoredArticle, stats: ArticleStats) -> Self {
        Self {
            article: authored.article,
            author: authored.author,
            views: stats.views,
            likes: stats.likes,
            viewer_liked: stats.viewer_liked,
        }
    }
}

/// Result of a like or unlike. `likes` is missing when the fresh count
/// could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeOutcome {
    pub likes: Option<u64>,
}

/// Fans reader requests out to identity, content and metrics and merges
/// the answers. Content is authoritative; identity and metrics only enrich.
#[derive(Clone)]
pub struct Aggregator<I, C, M> {
    identity: I,
    content: C,
    metrics: M,
    deadline: Duration,
}

impl<I, C, M> Aggregator<I, C, M>
where
    I: IdentityService,
    C: ContentService,
    M: MetricsService,
{
    pub fn new(identity: I, content: C, metrics: M, deadline: Duration) -> Self {
        Self {
            identity,
            content,
            metrics,
            deadline,
        }
    }

    /// User owning `token`, `None` for a token identity does not accept.
    pub async fn authenticate(&self, token: &str) -> Result<Option<UserId>, ServiceError> {
        with_deadline(
            IDENTITY_SERVICE,
            self.deadline,
            self.identity.validate_token(token),
        )
        .await
    }

    pub async fn current_user(&self, user: UserId) -> Result<User, ServiceError> {
        with_deadline(IDENTITY_SERVICE, self.deadline, self.identity.get_user_by_id(user))
            .await?
            .ok_or(ServiceError::NotFound)
    }

    pub async fn read_article(
        &self,
        id: ArticleId,
        viewer: Viewer,
        access_token: Option<String>,
    ) -> Result<AggregatedArticle, ServiceError> {
        let authored = with_deadline(
            CONTENT_SERVICE,
            self.deadline,
            self.content.get_article(id, viewer, access_token),
        )
        .await?;

        let owner = authored.article.owner;
        let known_author = authored.author.clone();
        let (counters, viewer_liked, author) = tokio::join!(
            self.counters(id),
            self.viewer_liked(id, viewer),
            async {
                match known_author {
                    Some(name) => Some(name),
                    None => self.author_name(owner).await,
                }
            }
        );

        Ok(AggregatedArticle {
            article: authored.article,
            author,
            views: counters.views,
            likes: counters.likes,
            viewer_liked,
        })
    }

    pub async fn list_articles(
        &self,
        viewer: Viewer,
        page: Page,
    ) -> Result<Vec<AggregatedArticle>, ServiceError> {
        let articles = with_deadline(
            CONTENT_SERVICE,
            self.deadline,
            self.content.list_articles(viewer, page),
        )
        .await?;
        Ok(self.with_stats(articles, viewer).await)
    }

    pub async fn list_user_articles(
        &self,
        user: UserId,
        viewer: Viewer,
    ) -> Result<Vec<AggregatedArticle>, ServiceError> {
        let articles = with_deadline(
            CONTENT_SERVICE,
            self.deadline,
            self.content.list_user_articles(user, viewer),
        )
        .await?;
        Ok(self.with_stats(articles, viewer).await)
    }

    pub async fn create_article(
        &self,
        owner: UserId,
        draft: ArticleDraft,
    ) -> Result<Article, ServiceError> {
        with_deadline(
            CONTENT_SERVICE,
            self.deadline,
            self.content.create_article(owner, draft),
        )
        .await
    }

    pub async fn update_article(
        &self,
        id: ArticleId,
        owner: UserId,
        draft: ArticleDraft,
    ) -> Result<Article, ServiceError> {
        with_deadline(
            CONTENT_SERVICE,
            self.deadline,
            self.content.update_article(id, owner, draft),
        )
        .await
    }

    pub async fn delete_article(&self, id: ArticleId, owner: UserId) -> Result<(), ServiceError> {
        with_deadline(
            CONTENT_SERVICE,
            self.deadline,
            self.content.delete_article(id, owner),
        )
        .await
    }

    /// Adds or removes the like of `user`. The membership change must
    /// succeed; the fresh count is best effort.
    pub async fn set_like(
        &self,
        id: ArticleId,
        user: UserId,
        like: bool,
    ) -> Result<LikeOutcome, ServiceError> {
        if like {
            with_deadline(METRICS_SERVICE, self.deadline, self.metrics.record_like(id, user))
                .await?;
        } else {
            with_deadline(METRICS_SERVICE, self.deadline, self.metrics.remove_like(id, user))
                .await?;
        }

        let likes = match with_deadline(
            METRICS_SERVICE,
            self.deadline,
            self.metrics.get_article_stats(id),
        )
        .await
        {
            Ok(counters) => Some(counters.likes),
            Err(error) => {
                tracing::warn!(article_id = %id, %error, "like count unavailable");
                None
            }
        };

        tracing::info!(article_id = %id, %user, like, "like changed");
        Ok(LikeOutcome { likes })
    }

    async fn counters(&self, id: ArticleId) -> ArticleCounters {
        match with_deadline(METRICS_SERVICE, self.deadline, self.metrics.get_article_stats(id))
            .await
        {
            Ok(counters) => counters,
            Err(error) => {
                tracing::warn!(article_id = %id, %error, "article stats unavailable");
                ArticleCounters::default()
            }
        }
    }

    async fn viewer_liked(&self, id: ArticleId, viewer: Viewer) -> bool {
        let Some(user) = viewer.user_id() else {
            return false;
        };
        match with_deadline(
            METRICS_SERVICE,
            self.deadline,
            self.metrics.get_user_like_status(id, user),
        )
        .await
        {
            Ok(liked) => liked,
            Err(error) => {
                tracing::warn!(article_id = %id, %user, %error, "like status unavailable");
                false
            }
        }
    }

    async fn author_name(&self, owner: UserId) -> Option<String> {
        match with_deadline(IDENTITY_SERVICE, self.deadline, self.identity.get_user_by_id(owner))
            .await
        {
            Ok(user) => user.map(|user| user.username),
            Err(error) => {
                tracing::warn!(%owner, %error, "author lookup failed");
                None
            }
        }
    }

    /// Joins one bulk stats answer onto `articles`. Rows the answer does not
    /// cover, or all rows when the call fails, get zero stats.
    async fn with_stats(
        &self,
        articles: Vec<AuthoredArticle>,
        viewer: Viewer,
    ) -> Vec<AggregatedArticle> {
        if articles.is_empty() {
            return Vec::new();
        }

        let ids: Vec<ArticleId> = articles.iter().map(|authored| authored.article.id).collect();
        let stats: HashMap<ArticleId, ArticleStats> = match with_deadline(
            METRICS_SERVICE,
            self.deadline,
            self.metrics.get_bulk_stats(ids, viewer),
        )
        .await
        {
            Ok(rows) => rows.into_iter().map(|row| (row.article_id, row)).collect(),
            Err(error) => {
                tracing::warn!(articles = articles.len(), %error, "bulk stats unavailable");
                HashMap::new()
            }
        };

        articles
            .into_iter()
            .map(|authored| {
                let id = authored.article.id;
                let row = stats.get(&id).copied().unwrap_or_else(|| ArticleStats::empty(id));
                AggregatedArticle::assemble(authored, row)
            })
            .collect()
    }
}
