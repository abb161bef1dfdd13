//! In-memory fakes of the service ports.
//!
//! Public so that the service crates can reuse them in their own tests.
//! Every fake counts calls per operation and can be told to fail or stall a
//! given operation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;

use crate::domain::{
    Article, ArticleAccess, ArticleCounters, ArticleDraft, ArticleId, ArticleStats, User, UserId,
    Viewer, Visibility, check_access,
};
use crate::error::ServiceError;
use crate::rpc::{AuthoredArticle, ContentService, IdentityService, MetricsService, Page};

pub fn user_id(id: i64) -> UserId {
    UserId::try_new(id).unwrap()
}

pub fn article_id(id: i64) -> ArticleId {
    ArticleId::try_new(id).unwrap()
}

/// Scripted failures and delays, keyed by operation name.
#[derive(Default)]
struct Faults {
    failures: HashMap<&'static str, ServiceError>,
    delays: HashMap<&'static str, Duration>,
    calls: HashMap<&'static str, usize>,
}

#[derive(Default)]
struct Shared<T> {
    faults: Mutex<Faults>,
    state: Mutex<T>,
}

impl<T> Shared<T> {
    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> MutexGuard<'_, T> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counts the call and plays back whatever was scripted for `op`.
    async fn enter(&self, op: &'static str) -> Result<(), ServiceError> {
        let (delay, failure) = {
            let mut faults = self.faults();
            *faults.calls.entry(op).or_default() += 1;
            (faults.delays.get(op).copied(), faults.failures.get(op).cloned())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        failure.map_or(Ok(()), Err)
    }

    fn fail(&self, op: &'static str, error: ServiceError) {
        self.faults().failures.insert(op, error);
    }

    fn recover(&self, op: &'static str) {
        self.faults().failures.remove(op);
    }

    fn stall(&self, op: &'static str, delay: Duration) {
        self.faults().delays.insert(op, delay);
    }

    fn calls(&self, op: &'static str) -> usize {
        self.faults().calls.get(op).copied().unwrap_or_default()
    }
}

macro_rules! fault_controls {
    ($fake:ty) => {
        impl $fake {
            /// Makes every call of `op` fail with `error`.
            pub fn fail(&self, op: &'static str, error: ServiceError) {
                self.shared.fail(op, error);
            }

            pub fn recover(&self, op: &'static str) {
                self.shared.recover(op);
            }

            /// Delays every call of `op` by `delay`.
            pub fn stall(&self, op: &'static str, delay: Duration) {
                self.shared.stall(op, delay);
            }

            pub fn calls(&self, op: &'static str) -> usize {
                self.shared.calls(op)
            }
        }
    };
}

// identity

#[derive(Default)]
struct Directory {
    tokens: HashMap<String, UserId>,
    users: HashMap<UserId, User>,
}

#[derive(Clone, Default)]
pub struct FakeIdentity {
    shared: Arc<Shared<Directory>>,
}

fault_controls!(FakeIdentity);

impl FakeIdentity {
    pub const VALIDATE_TOKEN: &'static str = "validate_token";
    pub const GET_USER_BY_ID: &'static str = "get_user_by_id";

    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user reachable through `token`.
    pub fn with_user(self, id: i64, username: &str, token: &str) -> Self {
        {
            let mut directory = self.shared.state();
            let id = user_id(id);
            directory.tokens.insert(token.to_owned(), id);
            directory.users.insert(
                id,
                User {
                    id,
                    email: format!("{username}@example.com"),
                    username: username.to_owned(),
                },
            );
        }
        self
    }
}

impl IdentityService for FakeIdentity {
    async fn validate_token(&self, token: &str) -> Result<Option<UserId>, ServiceError> {
        self.shared.enter(Self::VALIDATE_TOKEN).await?;
        Ok(self.shared.state().tokens.get(token).copied())
    }

    async fn get_user_by_id(&self, id: UserId) -> Result<Option<User>, ServiceError> {
        self.shared.enter(Self::GET_USER_BY_ID).await?;
        Ok(self.shared.state().users.get(&id).cloned())
    }
}

// content

#[derive(Default)]
struct Catalogue {
    next_id: i64,
    articles: BTreeMap<ArticleId, Article>,
    authors: HashMap<UserId, String>,
}

impl Catalogue {
    fn authored(&self, article: &Article) -> AuthoredArticle {
        AuthoredArticle {
            article: article.clone(),
            author: self.authors.get(&article.owner).cloned(),
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeContent {
    shared: Arc<Shared<Catalogue>>,
}

fault_controls!(FakeContent);

impl FakeContent {
    pub const CREATE_ARTICLE: &'static str = "create_article";
    pub const GET_ARTICLE: &'static str = "get_article";
    pub const UPDATE_ARTICLE: &'static str = "update_article";
    pub const DELETE_ARTICLE: &'static str = "delete_article";
    pub const LIST_ARTICLES: &'static str = "list_articles";
    pub const LIST_USER_ARTICLES: &'static str = "list_user_articles";

    pub fn new() -> Self {
        Self::default()
    }

    /// Names resolved for articles of `owner`; owners without a name come
    /// back without an author.
    pub fn with_author(self, owner: i64, name: &str) -> Self {
        self.shared.state().authors.insert(user_id(owner), name.to_owned());
        self
    }

    /// Stores an article directly and returns it.
    pub fn seed(&self, owner: i64, title: &str, visibility: Visibility) -> Article {
        let mut catalogue = self.shared.state();
        catalogue.next_id += 1;
        let now = Utc::now();
        let article = Article {
            id: article_id(catalogue.next_id),
            owner: user_id(owner),
            title: title.to_owned(),
            content: format!("{title} body text"),
            access: ArticleAccess::new(visibility),
            created_at: now,
            updated_at: now,
        };
        catalogue.articles.insert(article.id, article.clone());
        article
    }
}

impl ContentService for FakeContent {
    async fn create_article(&self, owner: UserId, draft: ArticleDraft) -> Result<Article, ServiceError> {
        self.shared.enter(Self::CREATE_ARTICLE).await?;
        let mut catalogue = self.shared.state();
        catalogue.next_id += 1;
        let now = Utc::now();
        let article = Article {
            id: article_id(catalogue.next_id),
            owner,
            title: draft.title.into_inner(),
            content: draft.content.into_inner(),
            access: ArticleAccess::new(draft.visibility),
            created_at: now,
            updated_at: now,
        };
        catalogue.articles.insert(article.id, article.clone());
        Ok(article)
    }

    async fn get_article(
        &self,
        id: ArticleId,
        viewer: Viewer,
        access_token: Option<String>,
    ) -> Result<AuthoredArticle, ServiceError> {
        self.shared.enter(Self::GET_ARTICLE).await?;
        let catalogue = self.shared.state();
        let article = catalogue.articles.get(&id).ok_or(ServiceError::NotFound)?;
        if !check_access(article, viewer, access_token.as_deref()) {
            return Err(ServiceError::AccessDenied);
        }
        Ok(catalogue.authored(article))
    }

    async fn update_article(
        &self,
        id: ArticleId,
        owner: UserId,
        draft: ArticleDraft,
    ) -> Result<Article, ServiceError> {
        self.shared.enter(Self::UPDATE_ARTICLE).await?;
        let mut catalogue = self.shared.state();
        let current = catalogue.articles.get(&id).cloned().ok_or(ServiceError::NotFound)?;
        let revised = current.revise(owner, draft, Utc::now())?;
        catalogue.articles.insert(id, revised.clone());
        Ok(revised)
    }

    async fn delete_article(&self, id: ArticleId, owner: UserId) -> Result<(), ServiceError> {
        self.shared.enter(Self::DELETE_ARTICLE).await?;
        let mut catalogue = self.shared.state();
        let article = catalogue.articles.get(&id).ok_or(ServiceError::NotFound)?;
        if article.owner != owner {
            return Err(ServiceError::AccessDenied);
        }
        catalogue.articles.remove(&id);
        Ok(())
    }

    async fn list_articles(&self, _viewer: Viewer, page: Page) -> Result<Vec<AuthoredArticle>, ServiceError> {
        self.shared.enter(Self::LIST_ARTICLES).await?;
        let catalogue = self.shared.state();
        Ok(catalogue
            .articles
            .values()
            .rev()
            .filter(|article| article.visibility() == Visibility::Public)
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .map(|article| catalogue.authored(article))
            .collect())
    }

    async fn list_user_articles(
        &self,
        user: UserId,
        viewer: Viewer,
    ) -> Result<Vec<AuthoredArticle>, ServiceError> {
        self.shared.enter(Self::LIST_USER_ARTICLES).await?;
        let catalogue = self.shared.state();
        Ok(catalogue
            .articles
            .values()
            .rev()
            .filter(|article| article.owner == user)
            .filter(|article| viewer.is(user) || article.visibility() == Visibility::Public)
            .map(|article| catalogue.authored(article))
            .collect())
    }
}

// metrics

#[derive(Default)]
struct Tallies {
    views: HashMap<ArticleId, u64>,
    likes: HashSet<(ArticleId, UserId)>,
}

impl Tallies {
    fn counters(&self, article_id: ArticleId) -> ArticleCounters {
        ArticleCounters {
            views: self.views.get(&article_id).copied().unwrap_or_default(),
            likes: self.likes.iter().filter(|(id, _)| *id == article_id).count() as u64,
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeMetrics {
    shared: Arc<Shared<Tallies>>,
}

fault_controls!(FakeMetrics);

impl FakeMetrics {
    pub const RECORD_VIEW: &'static str = "record_view";
    pub const RECORD_LIKE: &'static str = "record_like";
    pub const REMOVE_LIKE: &'static str = "remove_like";
    pub const GET_ARTICLE_STATS: &'static str = "get_article_stats";
    pub const GET_USER_LIKE_STATUS: &'static str = "get_user_like_status";
    pub const GET_BULK_STATS: &'static str = "get_bulk_stats";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_views(&self, article_id: ArticleId, views: u64) {
        self.shared.state().views.insert(article_id, views);
    }

    pub fn add_like(&self, article_id: ArticleId, user: UserId) {
        self.shared.state().likes.insert((article_id, user));
    }
}

impl MetricsService for FakeMetrics {
    async fn record_view(&self, article_id: ArticleId, _viewer: Viewer) -> Result<(), ServiceError> {
        self.shared.enter(Self::RECORD_VIEW).await?;
        *self.shared.state().views.entry(article_id).or_default() += 1;
        Ok(())
    }

    async fn record_like(&self, article_id: ArticleId, user: UserId) -> Result<(), ServiceError> {
        self.shared.enter(Self::RECORD_LIKE).await?;
        self.shared.state().likes.insert((article_id, user));
        Ok(())
    }

    async fn remove_like(&self, article_id: ArticleId, user: UserId) -> Result<(), ServiceError> {
        self.shared.enter(Self::REMOVE_LIKE).await?;
        self.shared.state().likes.remove(&(article_id, user));
        Ok(())
    }

    async fn get_article_stats(&self, article_id: ArticleId) -> Result<ArticleCounters, ServiceError> {
        self.shared.enter(Self::GET_ARTICLE_STATS).await?;
        Ok(self.shared.state().counters(article_id))
    }

    async fn get_user_like_status(&self, article_id: ArticleId, user: UserId) -> Result<bool, ServiceError> {
        self.shared.enter(Self::GET_USER_LIKE_STATUS).await?;
        Ok(self.shared.state().likes.contains(&(article_id, user)))
    }

    async fn get_bulk_stats(
        &self,
        article_ids: Vec<ArticleId>,
        viewer: Viewer,
    ) -> Result<Vec<ArticleStats>, ServiceError> {
        self.shared.enter(Self::GET_BULK_STATS).await?;
        let tallies = self.shared.state();
        Ok(article_ids
            .into_iter()
            .map(|article_id| {
                let counters = tallies.counters(article_id);
                ArticleStats {
                    article_id,
                    views: counters.views,
                    likes: counters.likes,
                    viewer_liked: viewer
                        .user_id()
                        .is_some_and(|user| tallies.likes.contains(&(article_id, user))),
                }
            })
            .collect())
    }
}
