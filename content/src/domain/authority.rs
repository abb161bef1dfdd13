use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use blog_common::{
    Article, ArticleAccess, ArticleDraft, ArticleId, ServiceError, UserId, Viewer, check_access,
    events::{ARTICLES_EXCHANGE, ArticleEvent, EventPublisher, publish_best_effort},
    rpc::{AuthoredArticle, ContentService, IDENTITY_SERVICE, IdentityService, Page, with_deadline},
};
use chrono::Utc;
use futures::future::join_all;

use crate::domain::repository::ArticleRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorityConfig {
    /// Time a read may spend resolving author names, for one article or a
    /// whole page.
    pub author_budget: Duration,
    /// Longest a request waits for its event to be accepted by the bus.
    pub publish_timeout: Duration,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            author_budget: Duration::from_millis(250),
            publish_timeout: Duration::from_millis(250),
        }
    }
}

impl AuthorityConfig {
    /// Worst case a read spends on its optional collaborators.
    pub fn budget(&self) -> Duration {
        self.author_budget + self.publish_timeout
    }
}

/// Sole writer of article state. Checks access on every read, re-validates
/// ownership inside every mutation and announces creations and reads on the
/// event bus.
#[derive(Clone)]
pub struct ArticleAuthority<R, I, P> {
    repository: R,
    identity: I,
    publisher: P,
    config: AuthorityConfig,
}

impl<R, I, P> ArticleAuthority<R, I, P>
where
    R: ArticleRepository,
    I: IdentityService,
    P: EventPublisher,
{
    pub fn new(repository: R, identity: I, publisher: P, config: AuthorityConfig) -> Self {
        Self {
            repository,
            identity,
            publisher,
            config,
        }
    }

    async fn publish(&self, event: ArticleEvent) {
        publish_best_effort(
            &self.publisher,
            ARTICLES_EXCHANGE,
            &event,
            self.config.publish_timeout,
        )
        .await;
    }

    /// Display name of `owner`; a failed lookup leaves the article anonymous.
    async fn author_name(&self, owner: UserId) -> Option<String> {
        let lookup = self.identity.get_user_by_id(owner);
        match with_deadline(IDENTITY_SERVICE, self.config.author_budget, lookup).await {
            Ok(Some(user)) => Some(user.username),
            Ok(None) => {
                tracing::debug!(%owner, "author not known to identity");
                None
            }
            Err(error) => {
                tracing::warn!(%owner, %error, "author lookup failed");
                None
            }
        }
    }

    async fn with_authors(&self, articles: Vec<Article>) -> Vec<AuthoredArticle> {
        let owners: BTreeSet<UserId> = articles.iter().map(|article| article.owner).collect();
        let lookups = join_all(
            owners
                .into_iter()
                .map(|owner| async move { (owner, self.author_name(owner).await) }),
        );
        let names: HashMap<UserId, Option<String>> =
            match tokio::time::timeout(self.config.author_budget, lookups).await {
                Ok(names) => names.into_iter().collect(),
                Err(_) => {
                    tracing::warn!(
                        budget_ms = self.config.author_budget.as_millis(),
                        "author lookups exceeded budget"
                    );
                    HashMap::new()
                }
            };

        articles
            .into_iter()
            .map(|article| {
                let author = names.get(&article.owner).cloned().flatten();
                AuthoredArticle { article, author }
            })
            .collect()
    }
}

impl<R, I, P> ContentService for ArticleAuthority<R, I, P>
where
    R: ArticleRepository,
    I: IdentityService,
    P: EventPublisher,
{
    async fn create_article(
        &self,
        owner: UserId,
        draft: ArticleDraft,
    ) -> Result<Article, ServiceError> {
        let access = ArticleAccess::new(draft.visibility);
        let article = self.repository.insert(owner, &draft, &access).await?;
        tracing::info!(article_id = %article.id, %owner, visibility = %article.visibility(), "article created");

        self.publish(ArticleEvent::Created {
            article_id: article.id,
            owner,
            visibility: article.visibility(),
        })
        .await;

        Ok(article)
    }

    async fn get_article(
        &self,
        id: ArticleId,
        viewer: Viewer,
        access_token: Option<String>,
    ) -> Result<AuthoredArticle, ServiceError> {
        let article = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or(ServiceError::NotFound)?;

        if !check_access(&article, viewer, access_token.as_deref()) {
            tracing::debug!(article_id = %id, %viewer, "read denied");
            return Err(ServiceError::AccessDenied);
        }

        let author = self.author_name(article.owner).await;
        self.publish(ArticleEvent::Viewed {
            article_id: article.id,
            viewer,
        })
        .await;

        Ok(AuthoredArticle { article, author })
    }

    async fn update_article(
        &self,
        id: ArticleId,
        owner: UserId,
        draft: ArticleDraft,
    ) -> Result<Article, ServiceError> {
        let now = Utc::now();
        let article = self
            .repository
            .update(id, move |current| current.revise(owner, draft, now))
            .await?;
        tracing::info!(article_id = %id, %owner, visibility = %article.visibility(), "article updated");
        Ok(article)
    }

    async fn delete_article(&self, id: ArticleId, owner: UserId) -> Result<(), ServiceError> {
        self.repository
            .delete(id, move |article| {
                if article.owner == owner {
                    Ok(())
                } else {
                    Err(ServiceError::AccessDenied)
                }
            })
            .await?;
        tracing::info!(article_id = %id, %owner, "article deleted");
        Ok(())
    }

    async fn list_articles(
        &self,
        viewer: Viewer,
        page: Page,
    ) -> Result<Vec<AuthoredArticle>, ServiceError> {
        let mut articles = self.repository.list_public(page).await?;
        articles.retain(|article| check_access(article, viewer, None));
        Ok(self.with_authors(articles).await)
    }

    async fn list_user_articles(
        &self,
        user: UserId,
        viewer: Viewer,
    ) -> Result<Vec<AuthoredArticle>, ServiceError> {
        let mut articles = self
            .repository
            .list_by_owner(user, viewer.is(user))
            .await?;
        articles.retain(|article| check_access(article, viewer, None));
        Ok(self.with_authors(articles).await)
    }
}
