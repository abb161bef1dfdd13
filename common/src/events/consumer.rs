use std::future::Future;
use std::time::Duration;

use futures::FutureExt;
use serde::Deserialize;

use crate::events::{ArticleEvent, BusError, Delivery, Disposition, EventHandler, HandleError, MessageBroker};

/// Bounded exponential backoff for transient handler failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deliveries allowed before a message is dead-lettered.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before redelivering a message that failed on `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn failure_disposition(&self, attempt: u32, error: HandleError) -> Disposition {
        match error {
            HandleError::Rejected(reason) => Disposition::DeadLetter { reason },
            HandleError::Transient(_) if attempt < self.max_attempts => Disposition::Requeue {
                delay: self.backoff(attempt),
            },
            HandleError::Transient(reason) => Disposition::DeadLetter {
                reason: format!("gave up after {attempt} attempts: {reason}"),
            },
        }
    }
}

/// Consumer tuning as read from configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerSettings {
    pub queue: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_idle_interval_ms() -> u64 {
    250
}

impl From<&ConsumerSettings> for RetryPolicy {
    fn from(settings: &ConsumerSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
        }
    }
}

/// Pulls deliveries from one queue and settles each of them explicitly.
pub struct Consumer<B, H> {
    broker: B,
    handler: H,
    queue: String,
    retry: RetryPolicy,
    idle_interval: Duration,
}

impl<B: MessageBroker, H: EventHandler> Consumer<B, H> {
    pub fn new(broker: B, handler: H, queue: impl Into<String>) -> Self {
        Self {
            broker,
            handler,
            queue: queue.into(),
            retry: RetryPolicy::default(),
            idle_interval: Duration::from_millis(default_idle_interval_ms()),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_idle_interval(mut self, idle_interval: Duration) -> Self {
        self.idle_interval = idle_interval;
        self
    }

    pub fn with_settings(self, settings: &ConsumerSettings) -> Self {
        self.with_retry_policy(RetryPolicy::from(settings))
            .with_idle_interval(Duration::from_millis(settings.idle_interval_ms))
    }

    /// Consumes until `shutdown` resolves. A delivery being handled when the
    /// signal arrives is settled before the loop exits.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send) {
        tokio::pin!(shutdown);
        tracing::info!(queue = %self.queue, "consumer started");

        loop {
            let processed = match self.poll_once().await {
                Ok(processed) => processed,
                Err(error) => {
                    tracing::warn!(queue = %self.queue, %error, "failed to poll queue");
                    false
                }
            };

            if processed {
                if (&mut shutdown).now_or_never().is_some() {
                    break;
                }
                continue;
            }

            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.idle_interval) => {}
            }
        }

        tracing::info!(queue = %self.queue, "consumer stopped");
    }

    /// Handles at most one delivery. Returns whether one was available.
    pub async fn poll_once(&self) -> Result<bool, BusError> {
        let Some(delivery) = self.broker.receive(&self.queue).await? else {
            return Ok(false);
        };

        let disposition = self.dispose(&delivery).await;
        self.broker.settle(&delivery, disposition).await?;
        Ok(true)
    }

    /// Decides how `delivery` is settled. Undecodable messages are
    /// dead-lettered without reaching the handler.
    pub async fn dispose(&self, delivery: &Delivery) -> Disposition {
        let published = match ArticleEvent::decode(&delivery.body) {
            Ok(published) => published,
            Err(poison) => {
                tracing::warn!(
                    queue = %delivery.queue,
                    delivery = delivery.id,
                    routing_key = %delivery.routing_key,
                    error = %poison,
                    "dead-lettering poison message"
                );
                return Disposition::DeadLetter {
                    reason: poison.to_string(),
                };
            }
        };

        match self.handler.handle(&published.event).await {
            Ok(()) => {
                tracing::debug!(
                    queue = %delivery.queue,
                    delivery = delivery.id,
                    routing_key = %delivery.routing_key,
                    "event handled"
                );
                Disposition::Ack
            }
            Err(error) => {
                let disposition = self.retry.failure_disposition(delivery.attempt, error.clone());
                tracing::warn!(
                    queue = %delivery.queue,
                    delivery = delivery.id,
                    attempt = delivery.attempt,
                    %error,
                    ?disposition,
                    "event handling failed"
                );
                disposition
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use tokio::sync::oneshot;

    use super::*;
    use crate::domain::{ArticleId, UserId};
    use crate::events::{
        ARTICLES_EXCHANGE, EventPublisher, InMemoryEventBus, RoutingPattern,
    };

    const QUEUE: &str = "stats-events";

    #[derive(Clone)]
    struct ScriptedHandler {
        seen: Arc<Mutex<Vec<ArticleEvent>>>,
        failures_left: Arc<AtomicU32>,
        failure: HandleError,
    }

    impl ScriptedHandler {
        fn failing(times: u32, failure: HandleError) -> Self {
            Self {
                seen: Arc::default(),
                failures_left: Arc::new(AtomicU32::new(times)),
                failure,
            }
        }

        fn healthy() -> Self {
            Self::failing(0, HandleError::Transient(String::new()))
        }

        fn seen(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl EventHandler for ScriptedHandler {
        async fn handle(&self, event: &ArticleEvent) -> Result<(), HandleError> {
            self.seen.lock().unwrap().push(*event);
            let fail = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if fail { Err(self.failure.clone()) } else { Ok(()) }
        }
    }

    fn immediate_retries(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    async fn bus_with_event() -> InMemoryEventBus {
        let bus = InMemoryEventBus::new();
        bus.bind_queue(QUEUE, ARTICLES_EXCHANGE, &RoutingPattern::new("article.*"))
            .await
            .unwrap();
        bus.publish(
            ARTICLES_EXCHANGE,
            &ArticleEvent::Liked {
                article_id: ArticleId::try_new(1).unwrap(),
                user: UserId::try_new(2).unwrap(),
            },
        )
        .await
        .unwrap();
        bus
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_secs(1));
        assert_eq!(policy.backoff(3), Duration::from_secs(2));
        assert_eq!(policy.backoff(10), Duration::from_secs(30));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn handled_event_is_acked() {
        let bus = bus_with_event().await;
        let handler = ScriptedHandler::healthy();
        let consumer = Consumer::new(bus.clone(), handler.clone(), QUEUE);

        assert!(consumer.poll_once().await.unwrap());
        assert!(!consumer.poll_once().await.unwrap());
        assert_eq!(handler.seen(), 1);
        assert_eq!(bus.queue_len(QUEUE), 0);
        assert_eq!(bus.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn poison_message_skips_handler() {
        let bus = InMemoryEventBus::new();
        bus.bind_queue(QUEUE, ARTICLES_EXCHANGE, &RoutingPattern::new("#"))
            .await
            .unwrap();
        bus.publish_raw(ARTICLES_EXCHANGE, "article.liked", b"{\"type\":".to_vec())
            .unwrap();

        let handler = ScriptedHandler::healthy();
        let consumer = Consumer::new(bus.clone(), handler.clone(), QUEUE);
        assert!(consumer.poll_once().await.unwrap());

        assert_eq!(handler.seen(), 0);
        assert_eq!(bus.dead_letters(QUEUE).len(), 1);
        assert!(!consumer.poll_once().await.unwrap());
    }

    #[tokio::test]
    async fn transient_failure_is_retried_until_success() {
        let bus = bus_with_event().await;
        let handler = ScriptedHandler::failing(2, HandleError::Transient("db down".into()));
        let consumer = Consumer::new(bus.clone(), handler.clone(), QUEUE)
            .with_retry_policy(immediate_retries(5));

        for _ in 0..3 {
            assert!(consumer.poll_once().await.unwrap());
        }

        assert_eq!(handler.seen(), 3);
        assert_eq!(bus.queue_len(QUEUE), 0);
        assert!(bus.dead_letters(QUEUE).is_empty());
    }

    #[tokio::test]
    async fn exhausted_retries_dead_letter() {
        let bus = bus_with_event().await;
        let handler = ScriptedHandler::failing(u32::MAX, HandleError::Transient("db down".into()));
        let consumer = Consumer::new(bus.clone(), handler.clone(), QUEUE)
            .with_retry_policy(immediate_retries(3));

        while consumer.poll_once().await.unwrap() {}

        assert_eq!(handler.seen(), 3);
        let parked = bus.dead_letters(QUEUE);
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].attempts, 3);
    }

    #[tokio::test]
    async fn rejected_event_is_not_retried() {
        let bus = bus_with_event().await;
        let handler = ScriptedHandler::failing(1, HandleError::Rejected("unknown article".into()));
        let consumer = Consumer::new(bus.clone(), handler.clone(), QUEUE)
            .with_retry_policy(immediate_retries(5));

        assert!(consumer.poll_once().await.unwrap());
        assert!(!consumer.poll_once().await.unwrap());
        assert_eq!(handler.seen(), 1);
        assert_eq!(bus.dead_letters(QUEUE)[0].reason, "unknown article");
    }

    #[tokio::test]
    async fn run_drains_queue_and_stops_on_shutdown() {
        let bus = bus_with_event().await;
        let handler = ScriptedHandler::healthy();
        let consumer = Consumer::new(bus.clone(), handler.clone(), QUEUE)
            .with_idle_interval(Duration::from_millis(5));

        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(consumer.run(async {
            let _ = stopped.await;
        }));

        tokio::time::timeout(Duration::from_secs(2), async {
            while handler.seen() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        stop.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bus.queue_len(QUEUE), 0);
    }
}
