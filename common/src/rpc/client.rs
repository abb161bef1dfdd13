use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::{
    Article, ArticleCounters, ArticleDraft, ArticleId, ArticleStats, User, UserId, Viewer,
};
use crate::error::ServiceError;
use crate::rpc::wire::{self, paths};
use crate::rpc::{
    AuthoredArticle, CONTENT_SERVICE, ContentService, IDENTITY_SERVICE, IdentityService,
    METRICS_SERVICE, MetricsService, Page,
};

/// Where a service listens and how long a single call may take.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcEndpoint {
    pub url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    2_000
}

impl RpcEndpoint {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// JSON over HTTP transport shared by the typed clients.
#[derive(Clone, Debug)]
pub struct RpcClient {
    http: reqwest::Client,
    base_url: String,
    service: &'static str,
}

impl RpcClient {
    pub fn new(service: &'static str, endpoint: &RpcEndpoint) -> Result<Self, anyhow::Error> {
        let http = reqwest::Client::builder()
            .timeout(endpoint.timeout())
            .build()
            .with_context(|| format!("failed to build {service} client"))?;

        Ok(Self {
            http,
            base_url: endpoint.url.trim_end_matches('/').to_owned(),
            service,
        })
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub async fn call<Req, Resp>(&self, path: &str, request: &Req) -> Result<Resp, ServiceError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|error| self.transport_error(error))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Resp>()
                .await
                .map_err(|error| self.transport_error(error));
        }

        let fault = response
            .json::<wire::RpcFault>()
            .await
            .unwrap_or_else(|_| wire::RpcFault::unexpected(status));
        tracing::debug!(service = self.service, path, %status, reason = %fault.reason, "rpc call failed");
        Err(fault.into_error(self.service))
    }

    fn transport_error(&self, error: reqwest::Error) -> ServiceError {
        if error.is_timeout() {
            ServiceError::timeout(self.service)
        } else {
            ServiceError::unavailable(self.service, error)
        }
    }
}

#[derive(Clone, Debug)]
pub struct HttpIdentityClient {
    rpc: RpcClient,
}

impl HttpIdentityClient {
    pub fn new(endpoint: &RpcEndpoint) -> Result<Self, anyhow::Error> {
        Ok(Self {
            rpc: RpcClient::new(IDENTITY_SERVICE, endpoint)?,
        })
    }
}

impl IdentityService for HttpIdentityClient {
    async fn validate_token(&self, token: &str) -> Result<Option<UserId>, ServiceError> {
        let request = wire::ValidateTokenRequest {
            token: token.to_owned(),
        };
        let response: wire::ValidateTokenResponse =
            self.rpc.call(paths::VALIDATE_TOKEN, &request).await?;

        Ok(response.user_id.user_id().filter(|_| response.valid))
    }

    async fn get_user_by_id(&self, id: UserId) -> Result<Option<User>, ServiceError> {
        let request = wire::GetUserByIdRequest { user_id: id };
        let response: wire::GetUserByIdResponse =
            self.rpc.call(paths::GET_USER_BY_ID, &request).await?;

        Ok(response.user.filter(|_| response.found))
    }
}

#[derive(Clone, Debug)]
pub struct HttpContentClient {
    rpc: RpcClient,
}

impl HttpContentClient {
    pub fn new(endpoint: &RpcEndpoint) -> Result<Self, anyhow::Error> {
        Ok(Self {
            rpc: RpcClient::new(CONTENT_SERVICE, endpoint)?,
        })
    }
}

impl ContentService for HttpContentClient {
    async fn create_article(
        &self,
        owner: UserId,
        draft: ArticleDraft,
    ) -> Result<Article, ServiceError> {
        let request = wire::CreateArticleRequest {
            owner_id: owner,
            title: draft.title.into_inner(),
            content: draft.content.into_inner(),
            visibility: draft.visibility,
        };
        let response: wire::ArticleResponse =
            self.rpc.call(paths::CREATE_ARTICLE, &request).await?;
        Article::try_from(response.article)
    }

    async fn get_article(
        &self,
        id: ArticleId,
        viewer: Viewer,
        access_token: Option<String>,
    ) -> Result<AuthoredArticle, ServiceError> {
        let request = wire::GetArticleRequest {
            article_id: id,
            viewer_id: viewer,
            access_token,
        };
        let response: wire::AuthoredArticleDto =
            self.rpc.call(paths::GET_ARTICLE, &request).await?;
        AuthoredArticle::try_from(response)
    }

    async fn update_article(
        &self,
        id: ArticleId,
        owner: UserId,
        draft: ArticleDraft,
    ) -> Result<Article, ServiceError> {
        let request = wire::UpdateArticleRequest {
            article_id: id,
            owner_id: owner,
            title: draft.title.into_inner(),
            content: draft.content.into_inner(),
            visibility: draft.visibility,
        };
        let response: wire::ArticleResponse =
            self.rpc.call(paths::UPDATE_ARTICLE, &request).await?;
        Article::try_from(response.article)
    }

    async fn delete_article(&self, id: ArticleId, owner: UserId) -> Result<(), ServiceError> {
        let request = wire::DeleteArticleRequest {
            article_id: id,
            owner_id: owner,
        };
        let _: wire::SuccessResponse = self.rpc.call(paths::DELETE_ARTICLE, &request).await?;
        Ok(())
    }

    async fn list_articles(
        &self,
        viewer: Viewer,
        page: Page,
    ) -> Result<Vec<AuthoredArticle>, ServiceError> {
        let request = wire::ListArticlesRequest {
            viewer_id: viewer,
            page,
        };
        let response: wire::ArticleListResponse =
            self.rpc.call(paths::LIST_ARTICLES, &request).await?;
        response.into_articles()
    }

    async fn list_user_articles(
        &self,
        user: UserId,
        viewer: Viewer,
    ) -> Result<Vec<AuthoredArticle>, ServiceError> {
        let request = wire::ListUserArticlesRequest {
            user_id: user,
            viewer_id: viewer,
        };
        let response: wire::ArticleListResponse =
            self.rpc.call(paths::LIST_USER_ARTICLES, &request).await?;
        response.into_articles()
    }
}

#[derive(Clone, Debug)]
pub struct HttpMetricsClient {
    rpc: RpcClient,
}

impl HttpMetricsClient {
    pub fn new(endpoint: &RpcEndpoint) -> Result<Self, anyhow::Error> {
        Ok(Self {
            rpc: RpcClient::new(METRICS_SERVICE, endpoint)?,
        })
    }
}

impl MetricsService for HttpMetricsClient {
    async fn record_view(&self, article_id: ArticleId, viewer: Viewer) -> Result<(), ServiceError> {
        let request = wire::RecordViewRequest {
            article_id,
            user_id: viewer,
        };
        let _: wire::SuccessResponse = self.rpc.call(paths::RECORD_VIEW, &request).await?;
        Ok(())
    }

    async fn record_like(&self, article_id: ArticleId, user: UserId) -> Result<(), ServiceError> {
        let request = wire::LikeRequest {
            article_id,
            user_id: user,
        };
        let _: wire::SuccessResponse = self.rpc.call(paths::RECORD_LIKE, &request).await?;
        Ok(())
    }

    async fn remove_like(&self, article_id: ArticleId, user: UserId) -> Result<(), ServiceError> {
        let request = wire::LikeRequest {
            article_id,
            user_id: user,
        };
        let _: wire::SuccessResponse = self.rpc.call(paths::REMOVE_LIKE, &request).await?;
        Ok(())
    }

    async fn get_article_stats(&self, article_id: ArticleId) -> Result<ArticleCounters, ServiceError> {
        let request = wire::ArticleStatsRequest { article_id };
        let response: wire::ArticleStatsResponse =
            self.rpc.call(paths::GET_ARTICLE_STATS, &request).await?;
        Ok(ArticleCounters {
            views: response.views,
            likes: response.likes,
        })
    }

    async fn get_user_like_status(
        &self,
        article_id: ArticleId,
        user: UserId,
    ) -> Result<bool, ServiceError> {
        let request = wire::LikeRequest {
            article_id,
            user_id: user,
        };
        let response: wire::LikeStatusResponse =
            self.rpc.call(paths::GET_USER_LIKE_STATUS, &request).await?;
        Ok(response.liked)
    }

    async fn get_bulk_stats(
        &self,
        article_ids: Vec<ArticleId>,
        viewer: Viewer,
    ) -> Result<Vec<ArticleStats>, ServiceError> {
        let request = wire::BulkStatsRequest {
            article_ids,
            viewer_id: viewer,
        };
        let response: wire::BulkStatsResponse =
            self.rpc.call(paths::GET_BULK_STATS, &request).await?;
        Ok(response.stats)
    }
}
