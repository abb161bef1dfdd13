use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::events::{ArticleEvent, RoutingPattern};

/// How long a received message stays invisible before it is redelivered.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum BusError {
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("broker failure: {0}")]
    Broker(#[from] sqlx::Error),
    #[error("delivery {0} is not in flight or its lock lapsed")]
    UnknownDelivery(i64),
}

/// A message handed to a consumer. It stays invisible to other consumers
/// until it is settled or its lock lapses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: i64,
    pub queue: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    /// 1 on first delivery.
    pub attempt: u32,
}

/// How a consumer settles a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Processed; remove the message.
    Ack,
    /// Make the message deliverable again after `delay`.
    Requeue { delay: Duration },
    /// Park the message in the dead-letter store.
    DeadLetter { reason: String },
}

/// Failure reported by an event handler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandleError {
    /// Might succeed on redelivery.
    #[error("transient failure: {0}")]
    Transient(String),
    /// Will never succeed.
    #[error("rejected: {0}")]
    Rejected(String),
}

pub trait EventPublisher: Clone + Send + Sync + 'static {
    /// Routes `event` to every queue bound to `exchange` with a matching
    /// pattern and returns the number of queues it reached.
    fn publish(
        &self,
        exchange: &str,
        event: &ArticleEvent,
    ) -> impl Future<Output = Result<usize, BusError>> + Send;
}

pub trait MessageBroker: EventPublisher {
    /// Declares `queue` (idempotently) and binds it to `exchange`.
    fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        pattern: &RoutingPattern,
    ) -> impl Future<Output = Result<(), BusError>> + Send;

    /// Takes the next visible message of `queue`, if any.
    fn receive(&self, queue: &str) -> impl Future<Output = Result<Option<Delivery>, BusError>> + Send;

    fn settle(
        &self,
        delivery: &Delivery,
        disposition: Disposition,
    ) -> impl Future<Output = Result<(), BusError>> + Send;
}

pub trait EventHandler: Clone + Send + Sync + 'static {
    fn handle(&self, event: &ArticleEvent) -> impl Future<Output = Result<(), HandleError>> + Send;
}

/// Publishes without letting the bus fail the caller. Errors, timeouts and
/// unrouted events are logged and swallowed.
pub async fn publish_best_effort<P: EventPublisher>(
    publisher: &P,
    exchange: &str,
    event: &ArticleEvent,
    timeout: Duration,
) {
    match tokio::time::timeout(timeout, publisher.publish(exchange, event)).await {
        Ok(Ok(0)) => warn!(
            routing_key = event.routing_key(),
            article_id = %event.article_id(),
            "event reached no queue"
        ),
        Ok(Ok(queues)) => debug!(
            routing_key = event.routing_key(),
            article_id = %event.article_id(),
            queues,
            "event published"
        ),
        Ok(Err(cause)) => error!(
            routing_key = event.routing_key(),
            article_id = %event.article_id(),
            error = %cause,
            "failed to publish event"
        ),
        Err(_) => warn!(
            routing_key = event.routing_key(),
            article_id = %event.article_id(),
            timeout_ms = timeout.as_millis() as u64,
            "publishing event timed out"
        ),
    }
}
