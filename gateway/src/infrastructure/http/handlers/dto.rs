use blog_common::{Article, ArticleDraft, ServiceError, User, UserId, Visibility};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::aggregator::{AggregatedArticle, LikeOutcome};

/// Body of create and update.
#[derive(Debug, Clone, Deserialize)]
pub struct ArticleRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub visibility: Option<String>,
}

impl ArticleRequest {
    /// Unknown or missing visibility means public.
    pub fn into_draft(self) -> Result<ArticleDraft, ServiceError> {
        let visibility = self
            .visibility
            .as_deref()
            .map_or(Visibility::Public, Visibility::parse_lenient);
        ArticleDraft::parse(self.title, self.content, visibility)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LikeRequest {
    pub like: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadParams {
    pub access_token: Option<String>,
}

/// An article as read: always carries author and engagement fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleView {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub content: String,
    pub visibility: Visibility,
    pub author: String,
    pub views: u64,
    pub likes: u64,
    #[serde(rename = "viewerLiked")]
    pub viewer_liked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AggregatedArticle> for ArticleView {
    fn from(value: AggregatedArticle) -> Self {
        let article = value.article;
        Self {
            id: article.id.into_inner(),
            user_id: article.owner.into_inner(),
            visibility: article.visibility(),
            title: article.title,
            content: article.content,
            author: value.author.unwrap_or_default(),
            views: value.views,
            likes: value.likes,
            viewer_liked: value.viewer_liked,
            created_at: article.created_at,
            updated_at: article.updated_at,
        }
    }
}

/// An article as written back to its owner; link articles carry the token
/// and the address to share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleWritten {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_url: Option<String>,
}

impl ArticleWritten {
    pub fn new(article: Article, url_base: &str) -> Self {
        let id = article.id.into_inner();
        let access_token = article.access_token().map(|token| token.as_str().to_owned());
        let access_url = access_token
            .as_ref()
            .map(|token| format!("{}/{id}?access_token={token}", url_base.trim_end_matches('/')));
        Self {
            id,
            visibility: article.visibility(),
            title: article.title,
            content: article.content,
            created_at: article.created_at,
            updated_at: article.updated_at,
            access_token,
            access_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub likes: Option<u64>,
}

impl SuccessResponse {
    pub const OK: Self = Self {
        success: true,
        likes: None,
    };
}

impl From<LikeOutcome> for SuccessResponse {
    fn from(value: LikeOutcome) -> Self {
        Self {
            success: true,
            likes: value.likes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserResponse {
    pub id: UserId,
    pub email: String,
    pub username: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
        }
    }
}

#[cfg(test)]
mod tests {
    use blog_common::ArticleAccess;
    use serde_json::json;

    use super::*;

    fn article(access: ArticleAccess) -> Article {
        let at = DateTime::parse_from_rfc3339("2025-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        Article {
            id: blog_common::ArticleId::try_new(7).unwrap(),
            owner: UserId::try_new(3).unwrap(),
            title: "Title".into(),
            content: "Long enough body".into(),
            access,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn read_view_uses_original_field_names() {
        let view = ArticleView::from(AggregatedArticle {
            article: article(ArticleAccess::Public),
            author: None,
            views: 4,
            likes: 2,
            viewer_liked: true,
        });

        let body = serde_json::to_value(&view).unwrap();
        assert_eq!(body["viewerLiked"], json!(true));
        assert_eq!(body["author"], json!(""));
        assert_eq!(body["visibility"], json!("public"));
        assert_eq!(body["created_at"], json!("2025-01-02T03:04:05Z"));
    }

    #[test]
    fn only_link_articles_expose_share_address() {
        let link = article(ArticleAccess::new(Visibility::Link));
        let token = link.access_token().unwrap().as_str().to_owned();

        let written = ArticleWritten::new(link, "/articles/");
        assert_eq!(
            written.access_url.as_deref(),
            Some(format!("/articles/7?access_token={token}").as_str())
        );

        let public = serde_json::to_value(ArticleWritten::new(
            article(ArticleAccess::Public),
            "/articles",
        ))
        .unwrap();
        assert!(public.get("access_token").is_none());
        assert!(public.get("access_url").is_none());
    }

    #[test]
    fn unknown_visibility_is_public() {
        let request = ArticleRequest {
            title: "Title".into(),
            content: "Long enough body".into(),
            visibility: Some("secret".into()),
        };
        assert_eq!(request.into_draft().unwrap().visibility, Visibility::Public);
    }
}
