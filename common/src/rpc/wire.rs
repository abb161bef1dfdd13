//! Request and response bodies of the RPC operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    Article, ArticleAccess, ArticleCounters, ArticleId, ArticleStats, User, UserId, Viewer,
    Visibility,
};
use crate::error::ServiceError;
use crate::rpc::{AuthoredArticle, Page};

pub mod paths {
    pub const VALIDATE_TOKEN: &str = "/rpc/identity/validate-token";
    pub const GET_USER_BY_ID: &str = "/rpc/identity/get-user-by-id";

    pub const CREATE_ARTICLE: &str = "/rpc/content/create-article";
    pub const GET_ARTICLE: &str = "/rpc/content/get-article";
    pub const UPDATE_ARTICLE: &str = "/rpc/content/update-article";
    pub const DELETE_ARTICLE: &str = "/rpc/content/delete-article";
    pub const LIST_ARTICLES: &str = "/rpc/content/list-articles";
    pub const LIST_USER_ARTICLES: &str = "/rpc/content/list-user-articles";

    pub const RECORD_VIEW: &str = "/rpc/metrics/record-view";
    pub const RECORD_LIKE: &str = "/rpc/metrics/record-like";
    pub const REMOVE_LIKE: &str = "/rpc/metrics/remove-like";
    pub const GET_ARTICLE_STATS: &str = "/rpc/metrics/get-article-stats";
    pub const GET_USER_LIKE_STATUS: &str = "/rpc/metrics/get-user-like-status";
    pub const GET_BULK_STATS: &str = "/rpc/metrics/get-bulk-stats";
}

/// Error body of a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcFault {
    pub reason: String,
    pub message: String,
}

impl RpcFault {
    pub fn unexpected(status: impl std::fmt::Display) -> Self {
        Self {
            reason: "unavailable".into(),
            message: format!("unexpected response status {status}"),
        }
    }

    /// Rebuilds the callee's error as seen by a caller of `service`. Failures
    /// of the callee's own dependencies make the callee unavailable.
    pub fn into_error(self, service: &str) -> ServiceError {
        match self.reason.as_str() {
            "not_found" => ServiceError::NotFound,
            "access_denied" => ServiceError::AccessDenied,
            "unauthorized" => ServiceError::Unauthorized,
            "validation_failed" => ServiceError::ValidationFailed(self.message),
            _ => ServiceError::unavailable(service, self.message),
        }
    }
}

impl From<&ServiceError> for RpcFault {
    fn from(error: &ServiceError) -> Self {
        let message = match error {
            ServiceError::ValidationFailed(message) => message.clone(),
            other => other.to_string(),
        };
        Self {
            reason: error.reason().into(),
            message,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub const OK: Self = Self { success: true };
}

// identity

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateTokenRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateTokenResponse {
    pub valid: bool,
    #[serde(default)]
    pub user_id: Viewer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetUserByIdRequest {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetUserByIdResponse {
    pub found: bool,
    #[serde(default)]
    pub user: Option<User>,
}

// content

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleDto {
    pub id: ArticleId,
    pub user_id: UserId,
    pub title: String,
    pub content: String,
    pub visibility: Visibility,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Article> for ArticleDto {
    fn from(article: &Article) -> Self {
        Self {
            id: article.id,
            user_id: article.owner,
            title: article.title.clone(),
            content: article.content.clone(),
            visibility: article.visibility(),
            access_token: article.access_token().map(|token| token.as_str().to_owned()),
            created_at: article.created_at,
            updated_at: article.updated_at,
        }
    }
}

impl TryFrom<ArticleDto> for Article {
    type Error = ServiceError;

    fn try_from(dto: ArticleDto) -> Result<Self, Self::Error> {
        let access = ArticleAccess::from_parts(dto.visibility, dto.access_token).map_err(|_| {
            ServiceError::unavailable(
                crate::rpc::CONTENT_SERVICE,
                "link article sent without access token",
            )
        })?;
        Ok(Article {
            id: dto.id,
            owner: dto.user_id,
            title: dto.title,
            content: dto.content,
            access,
            created_at: dto.created_at,
            updated_at: dto.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleResponse {
    pub article: ArticleDto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthoredArticleDto {
    pub article: ArticleDto,
    #[serde(default)]
    pub author_name: Option<String>,
}

impl From<&AuthoredArticle> for AuthoredArticleDto {
    fn from(value: &AuthoredArticle) -> Self {
        Self {
            article: ArticleDto::from(&value.article),
            author_name: value.author.clone(),
        }
    }
}

impl TryFrom<AuthoredArticleDto> for AuthoredArticle {
    type Error = ServiceError;

    fn try_from(dto: AuthoredArticleDto) -> Result<Self, Self::Error> {
        Ok(AuthoredArticle {
            article: Article::try_from(dto.article)?,
            author: dto.author_name.filter(|name| !name.is_empty()),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateArticleRequest {
    pub owner_id: UserId,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetArticleRequest {
    pub article_id: ArticleId,
    #[serde(default)]
    pub viewer_id: Viewer,
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateArticleRequest {
    pub article_id: ArticleId,
    pub owner_id: UserId,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteArticleRequest {
    pub article_id: ArticleId,
    pub owner_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListArticlesRequest {
    #[serde(default)]
    pub viewer_id: Viewer,
    #[serde(default)]
    pub page: Page,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListUserArticlesRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub viewer_id: Viewer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleListResponse {
    pub articles: Vec<AuthoredArticleDto>,
}

impl ArticleListResponse {
    pub fn into_articles(self) -> Result<Vec<AuthoredArticle>, ServiceError> {
        self.articles
            .into_iter()
            .map(AuthoredArticle::try_from)
            .collect()
    }
}

// metrics

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordViewRequest {
    pub article_id: ArticleId,
    #[serde(default)]
    pub user_id: Viewer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeRequest {
    pub article_id: ArticleId,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleStatsRequest {
    pub article_id: ArticleId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleStatsResponse {
    pub views: u64,
    pub likes: u64,
}

impl From<ArticleCounters> for ArticleStatsResponse {
    fn from(counters: ArticleCounters) -> Self {
        Self {
            views: counters.views,
            likes: counters.likes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeStatusResponse {
    pub liked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkStatsRequest {
    pub article_ids: Vec<ArticleId>,
    #[serde(default)]
    pub viewer_id: Viewer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkStatsResponse {
    pub stats: Vec<ArticleStats>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AccessToken;

    #[test]
    fn fault_round_trip_keeps_terminal_errors() {
        for error in [
            ServiceError::NotFound,
            ServiceError::AccessDenied,
            ServiceError::Unauthorized,
            ServiceError::ValidationFailed("title must be 3 to 200 characters".into()),
        ] {
            let fault = RpcFault::from(&error);
            assert_eq!(fault.into_error("content"), error);
        }
    }

    #[test]
    fn callee_dependency_failure_makes_callee_unavailable() {
        let fault = RpcFault::from(&ServiceError::timeout("database"));
        assert!(matches!(
            fault.into_error("content"),
            ServiceError::Unavailable { service, .. } if service == "content"
        ));
    }

    #[test]
    fn article_dto_carries_token_only_for_link() {
        let now = Utc::now();
        let mut article = Article {
            id: ArticleId::try_new(1).unwrap(),
            owner: UserId::try_new(2).unwrap(),
            title: "Title".into(),
            content: "Some content".into(),
            access: ArticleAccess::Public,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(ArticleDto::from(&article)).unwrap();
        assert!(json.get("access_token").is_none());
        assert_eq!(json["visibility"], "public");

        article.access = ArticleAccess::Link(AccessToken::from_stored("T").unwrap());
        let dto = ArticleDto::from(&article);
        assert_eq!(dto.access_token.as_deref(), Some("T"));
        assert_eq!(Article::try_from(dto).unwrap(), article);
    }

    #[test]
    fn link_dto_without_token_is_rejected() {
        let now = Utc::now();
        let dto = ArticleDto {
            id: ArticleId::try_new(1).unwrap(),
            user_id: UserId::try_new(2).unwrap(),
            title: "Title".into(),
            content: "Some content".into(),
            visibility: Visibility::Link,
            access_token: None,
            created_at: now,
            updated_at: now,
        };
        assert!(Article::try_from(dto).is_err());
    }
}
