use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::domain::{ArticleId, UserId, Viewer};
use crate::error::ServiceError;

/// Visibility tier of an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
    Link,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Link => "link",
        }
    }

    /// Parses a client supplied tier; anything unrecognised is public.
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl FromStr for Visibility {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            "link" => Ok(Visibility::Link),
            other => Err(ServiceError::ValidationFailed(format!(
                "unknown visibility `{other}`"
            ))),
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability secret that grants read access to a link-visible article.
///
/// Holders are treated as bearers: the value is never printed by `Debug`
/// and comparisons run in constant time.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Mints a fresh token from a random v4 UUID.
    pub fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps a stored token; empty values are not tokens.
    pub fn from_stored(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        (!value.trim().is_empty()).then_some(Self(value))
    }

    pub fn matches(&self, supplied: &str) -> bool {
        !supplied.is_empty() && bool::from(self.0.as_bytes().ct_eq(supplied.as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Access mode of an article. The token exists exactly when the tier is `link`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArticleAccess {
    Public,
    Private,
    Link(AccessToken),
}

impl ArticleAccess {
    pub fn new(visibility: Visibility) -> Self {
        match visibility {
            Visibility::Public => ArticleAccess::Public,
            Visibility::Private => ArticleAccess::Private,
            Visibility::Link => ArticleAccess::Link(AccessToken::mint()),
        }
    }

    /// Rebuilds the access mode of a stored article.
    pub fn from_parts(visibility: Visibility, token: Option<String>) -> Result<Self, ServiceError> {
        match visibility {
            Visibility::Public => Ok(ArticleAccess::Public),
            Visibility::Private => Ok(ArticleAccess::Private),
            Visibility::Link => token
                .and_then(AccessToken::from_stored)
                .map(ArticleAccess::Link)
                .ok_or_else(|| {
                    ServiceError::unavailable("database", "link article stored without access token")
                }),
        }
    }

    /// Moves to `target`. A link article keeps its token while it stays a
    /// link; entering link mints a new one; leaving link drops it.
    pub fn transition(self, target: Visibility) -> Self {
        match (self, target) {
            (ArticleAccess::Link(token), Visibility::Link) => ArticleAccess::Link(token),
            (_, target) => ArticleAccess::new(target),
        }
    }

    pub fn visibility(&self) -> Visibility {
        match self {
            ArticleAccess::Public => Visibility::Public,
            ArticleAccess::Private => Visibility::Private,
            ArticleAccess::Link(_) => Visibility::Link,
        }
    }

    pub fn token(&self) -> Option<&AccessToken> {
        match self {
            ArticleAccess::Link(token) => Some(token),
            _ => None,
        }
    }
}

#[nutype(
    sanitize(trim),
    validate(len_char_min = 3, len_char_max = 200),
    derive(Clone, Debug, Display, PartialEq, Eq, AsRef, Serialize, Deserialize)
)]
pub struct ArticleTitle(String);

#[nutype(
    validate(len_char_min = 10),
    derive(Clone, Debug, PartialEq, Eq, AsRef, Serialize, Deserialize)
)]
pub struct ArticleBody(String);

/// Validated author input for creating or revising an article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleDraft {
    pub title: ArticleTitle,
    pub content: ArticleBody,
    pub visibility: Visibility,
}

impl ArticleDraft {
    pub fn parse(
        title: impl Into<String>,
        content: impl Into<String>,
        visibility: Visibility,
    ) -> Result<Self, ServiceError> {
        let title = ArticleTitle::try_new(title.into())
            .map_err(|_| ServiceError::ValidationFailed("title must be 3 to 200 characters".into()))?;
        let content = ArticleBody::try_new(content.into())
            .map_err(|_| ServiceError::ValidationFailed("content must be at least 10 characters".into()))?;

        Ok(Self {
            title,
            content,
            visibility,
        })
    }
}

/// An article record, owned by the content service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub id: ArticleId,
    pub owner: UserId,
    pub title: String,
    pub content: String,
    pub access: ArticleAccess,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    pub fn visibility(&self) -> Visibility {
        self.access.visibility()
    }

    pub fn access_token(&self) -> Option<&AccessToken> {
        self.access.token()
    }

    pub fn is_owned_by(&self, viewer: Viewer) -> bool {
        viewer.is(self.owner)
    }

    /// Applies `draft` on behalf of `editor`, who must own the article.
    pub fn revise(
        self,
        editor: UserId,
        draft: ArticleDraft,
        now: DateTime<Utc>,
    ) -> Result<Article, ServiceError> {
        if self.owner != editor {
            return Err(ServiceError::AccessDenied);
        }

        Ok(Article {
            title: draft.title.into_inner(),
            content: draft.content.into_inner(),
            access: self.access.transition(draft.visibility),
            updated_at: now,
            ..self
        })
    }
}
