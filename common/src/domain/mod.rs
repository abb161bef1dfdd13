use std::fmt;

use nutype::nutype;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub mod access;
pub mod article;
pub mod stats;

pub use access::check_access;
pub use article::{AccessToken, Article, ArticleAccess, ArticleBody, ArticleDraft, ArticleTitle, Visibility};
pub use stats::{ArticleCounters, ArticleStats};

/// Identifier of a registered user, issued by the identity service.
#[nutype(
    validate(greater = 0),
    derive(
        Clone,
        Copy,
        Debug,
        Display,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Serialize,
        Deserialize,
        TryFrom,
        Into
    )
)]
pub struct UserId(i64);

/// Identifier of an article, assigned by the content service on creation.
#[nutype(
    validate(greater = 0),
    derive(
        Clone,
        Copy,
        Debug,
        Display,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Serialize,
        Deserialize,
        TryFrom,
        Into
    )
)]
pub struct ArticleId(i64);

/// Whoever issues a request: either nobody in particular or a resolved user.
///
/// On the wire a viewer is an optional user id. Absent, null, zero and
/// negative ids all decode to `Anonymous`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Viewer {
    #[default]
    Anonymous,
    User(UserId),
}

impl Viewer {
    pub fn from_raw(id: Option<i64>) -> Self {
        id.and_then(|id| UserId::try_new(id).ok())
            .map_or(Viewer::Anonymous, Viewer::User)
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Viewer::Anonymous => None,
            Viewer::User(id) => Some(*id),
        }
    }

    /// true when the viewer is exactly `user`
    pub fn is(&self, user: UserId) -> bool {
        self.user_id() == Some(user)
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Viewer::Anonymous)
    }
}

impl From<UserId> for Viewer {
    fn from(value: UserId) -> Self {
        Viewer::User(value)
    }
}

impl From<Option<UserId>> for Viewer {
    fn from(value: Option<UserId>) -> Self {
        value.map_or(Viewer::Anonymous, Viewer::User)
    }
}

impl fmt::Display for Viewer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Viewer::Anonymous => f.write_str("anonymous"),
            Viewer::User(id) => write!(f, "user:{id}"),
        }
    }
}

impl Serialize for Viewer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.user_id().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Viewer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<i64>::deserialize(deserializer).map(Viewer::from_raw)
    }
}

/// Public profile of a user as reported by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub username: String,
}
