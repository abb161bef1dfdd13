use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use crate::events::{
    ArticleEvent, BusError, DEFAULT_LOCK_TIMEOUT, Delivery, Disposition, EventPublisher,
    MessageBroker, RoutingPattern,
};

/// Process local broker with the same routing and settlement rules as the
/// Postgres one. Used by tests and single process setups.
#[derive(Clone)]
pub struct InMemoryEventBus {
    inner: Arc<Mutex<State>>,
    lock_timeout: Duration,
}

/// A message parked after it could not be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub id: i64,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub attempts: u32,
    pub reason: String,
}

#[derive(Default)]
struct State {
    next_id: i64,
    bindings: Vec<Binding>,
    queues: HashMap<String, VecDeque<Stored>>,
    in_flight: HashMap<i64, Stored>,
    dead_letters: HashMap<String, Vec<DeadLetter>>,
    #[cfg(any(test, feature = "test-utils"))]
    published: Vec<ArticleEvent>,
    failing: bool,
}

struct Binding {
    queue: String,
    exchange: String,
    pattern: RoutingPattern,
}

struct Stored {
    id: i64,
    queue: String,
    routing_key: String,
    body: Vec<u8>,
    attempts: u32,
    available_at: Instant,
    locked_until: Option<Instant>,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self {
            inner: Arc::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Routes an already encoded body. Returns the number of queues reached.
    pub fn publish_raw(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
    ) -> Result<usize, BusError> {
        let mut state = self.state();
        if state.failing {
            return Err(BusError::Broker(sqlx::Error::PoolTimedOut));
        }

        let queues: BTreeSet<String> = state
            .bindings
            .iter()
            .filter(|binding| binding.exchange == exchange && binding.pattern.matches(routing_key))
            .map(|binding| binding.queue.clone())
            .collect();

        let now = Instant::now();
        for queue in &queues {
            state.next_id += 1;
            let message = Stored {
                id: state.next_id,
                queue: queue.clone(),
                routing_key: routing_key.to_owned(),
                body: body.clone(),
                attempts: 0,
                available_at: now,
                locked_until: None,
            };
            state.queues.entry(queue.clone()).or_default().push_back(message);
        }

        Ok(queues.len())
    }

    /// Makes every publish fail until switched off again.
    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    /// Messages waiting in `queue`, excluding those in flight.
    pub fn queue_len(&self, queue: &str) -> usize {
        self.state().queues.get(queue).map_or(0, VecDeque::len)
    }

    pub fn in_flight_len(&self) -> usize {
        self.state().in_flight.len()
    }

    pub fn dead_letters(&self, queue: &str) -> Vec<DeadLetter> {
        self.state()
            .dead_letters
            .get(queue)
            .cloned()
            .unwrap_or_default()
    }

    /// Every event accepted by `publish`, in order.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn published(&self) -> Vec<ArticleEvent> {
        self.state().published.clone()
    }
}

impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, exchange: &str, event: &ArticleEvent) -> Result<usize, BusError> {
        let body = event.encode(Utc::now())?;
        let reached = self.publish_raw(exchange, event.routing_key(), body)?;
        #[cfg(any(test, feature = "test-utils"))]
        self.state().published.push(*event);
        Ok(reached)
    }
}

impl MessageBroker for InMemoryEventBus {
    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        pattern: &RoutingPattern,
    ) -> Result<(), BusError> {
        let mut state = self.state();
        let exists = state.bindings.iter().any(|binding| {
            binding.queue == queue && binding.exchange == exchange && &binding.pattern == pattern
        });
        if !exists {
            state.bindings.push(Binding {
                queue: queue.to_owned(),
                exchange: exchange.to_owned(),
                pattern: pattern.clone(),
            });
        }
        state.queues.entry(queue.to_owned()).or_default();
        Ok(())
    }

    async fn receive(&self, queue: &str) -> Result<Option<Delivery>, BusError> {
        let mut state = self.state();
        let now = Instant::now();
        state.release_lapsed(queue, now);

        let Some(messages) = state.queues.get_mut(queue) else {
            return Ok(None);
        };
        let Some(position) = messages.iter().position(|m| m.available_at <= now) else {
            return Ok(None);
        };
        let Some(mut message) = messages.remove(position) else {
            return Ok(None);
        };

        message.attempts += 1;
        message.locked_until = Some(now + self.lock_timeout);
        let delivery = Delivery {
            id: message.id,
            queue: message.queue.clone(),
            routing_key: message.routing_key.clone(),
            body: message.body.clone(),
            attempt: message.attempts,
        };
        state.in_flight.insert(message.id, message);

        Ok(Some(delivery))
    }

    async fn settle(&self, delivery: &Delivery, disposition: Disposition) -> Result<(), BusError> {
        let mut state = self.state();
        let claimed = state
            .in_flight
            .get(&delivery.id)
            .is_some_and(|message| message.attempts == delivery.attempt);
        if !claimed {
            return Err(BusError::UnknownDelivery(delivery.id));
        }
        let mut message = state
            .in_flight
            .remove(&delivery.id)
            .ok_or(BusError::UnknownDelivery(delivery.id))?;
        message.locked_until = None;

        match disposition {
            Disposition::Ack => {}
            Disposition::Requeue { delay } => {
                message.available_at = Instant::now() + delay;
                state
                    .queues
                    .entry(message.queue.clone())
                    .or_default()
                    .push_back(message);
            }
            Disposition::DeadLetter { reason } => {
                let letter = DeadLetter {
                    id: message.id,
                    routing_key: message.routing_key,
                    body: message.body,
                    attempts: message.attempts,
                    reason,
                };
                state
                    .dead_letters
                    .entry(message.queue)
                    .or_default()
                    .push(letter);
            }
        }

        Ok(())
    }
}

impl State {
    /// Returns in flight messages of `queue` whose lock expired to the queue.
    fn release_lapsed(&mut self, queue: &str, now: Instant) {
        let lapsed: Vec<i64> = self
            .in_flight
            .values()
            .filter(|m| m.queue == queue && m.locked_until.is_some_and(|until| until <= now))
            .map(|m| m.id)
            .collect();

        for id in lapsed {
            if let Some(mut message) = self.in_flight.remove(&id) {
                message.locked_until = None;
                message.available_at = now;
                self.queues.entry(message.queue.clone()).or_default().push_back(message);
            }
        }
    }
}
