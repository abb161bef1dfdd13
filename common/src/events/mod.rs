//! Article domain events and the bus they travel on.
//!
//! Content publishes to the `articles` topic exchange; every consumer binds
//! its own durable queue with a routing pattern and settles each delivery
//! explicitly. Delivery is at-least-once.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ArticleId, UserId, Viewer, Visibility};

pub mod bus;
pub mod consumer;
pub mod memory;
pub mod postgres;
pub mod topic;

pub use bus::{
    BusError, DEFAULT_LOCK_TIMEOUT, Delivery, Disposition, EventHandler, EventPublisher,
    HandleError, MessageBroker, publish_best_effort,
};
pub use consumer::{Consumer, RetryPolicy};
pub use memory::InMemoryEventBus;
pub use postgres::PostgresEventBus;
pub use topic::RoutingPattern;

/// Topic exchange of the article domain.
pub const ARTICLES_EXCHANGE: &str = "articles";

/// Pattern matching every article event.
pub const ARTICLE_EVENTS_PATTERN: &str = "article.*";

pub const ARTICLE_CREATED: &str = "article.created";
pub const ARTICLE_VIEWED: &str = "article.viewed";
pub const ARTICLE_LIKED: &str = "article.liked";
pub const ARTICLE_UNLIKED: &str = "article.unliked";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleEvent {
    Created {
        article_id: ArticleId,
        owner: UserId,
        visibility: Visibility,
    },
    Viewed {
        article_id: ArticleId,
        viewer: Viewer,
    },
    Liked {
        article_id: ArticleId,
        user: UserId,
    },
    Unliked {
        article_id: ArticleId,
        user: UserId,
    },
}

/// An event together with the time it was published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishedEvent {
    pub event: ArticleEvent,
    pub timestamp: DateTime<Utc>,
}

/// A message body that can never be handled and must not be redelivered.
#[derive(Debug, Error)]
pub enum PoisonMessage {
    #[error("malformed event envelope: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("unknown event type `{0}`")]
    UnknownType(String),
    #[error("invalid `{kind}` payload: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

// Wire form: { "type": "...", "timestamp": "...", "data": { ... } }

#[derive(Serialize)]
struct OutgoingEnvelope<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: &'a str,
    timestamp: DateTime<Utc>,
    data: T,
}

#[derive(Deserialize)]
struct IncomingEnvelope {
    #[serde(rename = "type")]
    kind: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
struct CreatedData {
    article_id: ArticleId,
    user_id: UserId,
    visibility: Visibility,
}

#[derive(Serialize, Deserialize)]
struct ViewedData {
    article_id: ArticleId,
    #[serde(default, skip_serializing_if = "Viewer::is_anonymous")]
    user_id: Viewer,
}

#[derive(Serialize, Deserialize)]
struct MembershipData {
    article_id: ArticleId,
    user_id: UserId,
}

impl ArticleEvent {
    pub fn routing_key(&self) -> &'static str {
        match self {
            ArticleEvent::Created { .. } => ARTICLE_CREATED,
            ArticleEvent::Viewed { .. } => ARTICLE_VIEWED,
            ArticleEvent::Liked { .. } => ARTICLE_LIKED,
            ArticleEvent::Unliked { .. } => ARTICLE_UNLIKED,
        }
    }

    pub fn article_id(&self) -> ArticleId {
        match *self {
            ArticleEvent::Created { article_id, .. }
            | ArticleEvent::Viewed { article_id, .. }
            | ArticleEvent::Liked { article_id, .. }
            | ArticleEvent::Unliked { article_id, .. } => article_id,
        }
    }

    /// Serializes the event into its envelope stamped with `timestamp`.
    pub fn encode(&self, timestamp: DateTime<Utc>) -> Result<Vec<u8>, serde_json::Error> {
        let kind = self.routing_key();
        match *self {
            ArticleEvent::Created {
                article_id,
                owner,
                visibility,
            } => envelope(kind, timestamp, CreatedData { article_id, user_id: owner, visibility }),
            ArticleEvent::Viewed { article_id, viewer } => {
                envelope(kind, timestamp, ViewedData { article_id, user_id: viewer })
            }
            ArticleEvent::Liked { article_id, user } | ArticleEvent::Unliked { article_id, user } => {
                envelope(kind, timestamp, MembershipData { article_id, user_id: user })
            }
        }
    }

    /// Decodes a message body. Every failure here is a poison message.
    pub fn decode(body: &[u8]) -> Result<PublishedEvent, PoisonMessage> {
        let envelope: IncomingEnvelope =
            serde_json::from_slice(body).map_err(PoisonMessage::Malformed)?;
        let IncomingEnvelope {
            kind,
            timestamp,
            data,
        } = envelope;

        let event = match kind.as_str() {
            ARTICLE_CREATED => {
                let data: CreatedData = payload(&kind, data)?;
                ArticleEvent::Created {
                    article_id: data.article_id,
                    owner: data.user_id,
                    visibility: data.visibility,
                }
            }
            ARTICLE_VIEWED => {
                let data: ViewedData = payload(&kind, data)?;
                ArticleEvent::Viewed {
                    article_id: data.article_id,
                    viewer: data.user_id,
                }
            }
            ARTICLE_LIKED => {
                let data: MembershipData = payload(&kind, data)?;
                ArticleEvent::Liked {
                    article_id: data.article_id,
                    user: data.user_id,
                }
            }
            ARTICLE_UNLIKED => {
                let data: MembershipData = payload(&kind, data)?;
                ArticleEvent::Unliked {
                    article_id: data.article_id,
                    user: data.user_id,
                }
            }
            _ => return Err(PoisonMessage::UnknownType(kind)),
        };

        Ok(PublishedEvent { event, timestamp })
    }
}

fn envelope<T: Serialize>(
    kind: &str,
    timestamp: DateTime<Utc>,
    data: T,
) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&OutgoingEnvelope {
        kind,
        timestamp,
        data,
    })
}

fn payload<T: DeserializeOwned>(kind: &str, data: serde_json::Value) -> Result<T, PoisonMessage> {
    serde_json::from_value(data).map_err(|source| PoisonMessage::InvalidPayload {
        kind: kind.to_owned(),
        source,
    })
}
