use std::collections::BTreeSet;
use std::time::Duration;

use chrono::Utc;
use sqlx::Row;
use sqlx::postgres::PgRow;
use tracing::debug;

use crate::database::Database;
use crate::events::{
    ArticleEvent, BusError, DEFAULT_LOCK_TIMEOUT, Delivery, Disposition, EventPublisher,
    MessageBroker, RoutingPattern,
};

const SELECT_BINDINGS: &str = "SELECT queue_name, pattern FROM bus_bindings WHERE exchange = $1";

const INSERT_MESSAGE: &str =
    "INSERT INTO bus_messages (queue_name, routing_key, body) VALUES ($1, $2, $3)";

const INSERT_BINDING: &str = "INSERT INTO bus_bindings (queue_name, exchange, pattern) \
    VALUES ($1, $2, $3) ON CONFLICT (queue_name, exchange, pattern) DO NOTHING";

// Claims the oldest visible message; concurrent consumers skip locked rows.
const CLAIM_MESSAGE: &str = "UPDATE bus_messages \
    SET attempts = attempts + 1, locked_until = now() + make_interval(secs => $2) \
    WHERE id = ( \
        SELECT id FROM bus_messages \
        WHERE queue_name = $1 AND available_at <= now() \
          AND (locked_until IS NULL OR locked_until < now()) \
        ORDER BY id LIMIT 1 \
        FOR UPDATE SKIP LOCKED) \
    RETURNING id, queue_name, routing_key, body, attempts";

// Settlement only applies while the row is still claimed by the attempt that
// received it; a delivery whose lock lapsed and was claimed again is stale.
const ACK_MESSAGE: &str = "DELETE FROM bus_messages \
    WHERE id = $1 AND locked_until IS NOT NULL AND attempts = $2";

const REQUEUE_MESSAGE: &str = "UPDATE bus_messages \
    SET available_at = now() + make_interval(secs => $3), locked_until = NULL \
    WHERE id = $1 AND locked_until IS NOT NULL AND attempts = $2";

const DEAD_LETTER_MESSAGE: &str = "WITH moved AS ( \
        DELETE FROM bus_messages \
        WHERE id = $1 AND locked_until IS NOT NULL AND attempts = $2 \
        RETURNING id, queue_name, routing_key, body, attempts) \
    INSERT INTO bus_dead_letters (message_id, queue_name, routing_key, body, attempts, reason) \
    SELECT id, queue_name, routing_key, body, attempts, $3 FROM moved";

/// Durable broker on top of the service database.
///
/// Messages are rows of `bus_messages`; a receive locks a row for
/// `lock_timeout`, after which an unsettled message becomes visible again.
#[derive(Clone)]
pub struct PostgresEventBus {
    database: Database,
    lock_timeout: Duration,
}

impl PostgresEventBus {
    pub fn new(database: Database) -> Self {
        Self {
            database,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Routes an encoded body to every matching queue in one transaction.
    pub async fn publish_raw(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<usize, BusError> {
        let mut transaction = self.database.database_pool().begin().await?;

        let bindings = sqlx::query(SELECT_BINDINGS)
            .bind(exchange)
            .fetch_all(&mut *transaction)
            .await?;

        let mut queues = BTreeSet::new();
        for binding in bindings {
            let queue: String = binding.try_get("queue_name")?;
            let pattern: String = binding.try_get("pattern")?;
            if RoutingPattern::new(pattern).matches(routing_key) {
                queues.insert(queue);
            }
        }

        for queue in &queues {
            sqlx::query(INSERT_MESSAGE)
                .bind(queue)
                .bind(routing_key)
                .bind(body)
                .execute(&mut *transaction)
                .await?;
        }

        transaction.commit().await?;
        Ok(queues.len())
    }
}

impl EventPublisher for PostgresEventBus {
    async fn publish(&self, exchange: &str, event: &ArticleEvent) -> Result<usize, BusError> {
        let body = event.encode(Utc::now())?;
        self.publish_raw(exchange, event.routing_key(), &body).await
    }
}

impl MessageBroker for PostgresEventBus {
    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        pattern: &RoutingPattern,
    ) -> Result<(), BusError> {
        sqlx::query(INSERT_BINDING)
            .bind(queue)
            .bind(exchange)
            .bind(pattern.as_str())
            .execute(self.database.database_pool())
            .await?;

        debug!(queue, exchange, %pattern, "queue bound");
        Ok(())
    }

    async fn receive(&self, queue: &str) -> Result<Option<Delivery>, BusError> {
        let row = sqlx::query(CLAIM_MESSAGE)
            .bind(queue)
            .bind(self.lock_timeout.as_secs_f64())
            .fetch_optional(self.database.database_pool())
            .await?;

        row.map(|row| delivery_from_row(&row)).transpose()
    }

    async fn settle(&self, delivery: &Delivery, disposition: Disposition) -> Result<(), BusError> {
        let pool = self.database.database_pool();
        let attempt = i32::try_from(delivery.attempt).unwrap_or(i32::MAX);
        let result = match disposition {
            Disposition::Ack => {
                sqlx::query(ACK_MESSAGE)
                    .bind(delivery.id)
                    .bind(attempt)
                    .execute(pool)
                    .await?
            }
            Disposition::Requeue { delay } => {
                sqlx::query(REQUEUE_MESSAGE)
                    .bind(delivery.id)
                    .bind(attempt)
                    .bind(delay.as_secs_f64())
                    .execute(pool)
                    .await?
            }
            Disposition::DeadLetter { reason } => {
                sqlx::query(DEAD_LETTER_MESSAGE)
                    .bind(delivery.id)
                    .bind(attempt)
                    .bind(reason)
                    .execute(pool)
                    .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(BusError::UnknownDelivery(delivery.id));
        }
        Ok(())
    }
}

fn delivery_from_row(row: &PgRow) -> Result<Delivery, BusError> {
    let attempts: i32 = row.try_get("attempts")?;
    Ok(Delivery {
        id: row.try_get("id")?,
        queue: row.try_get("queue_name")?,
        routing_key: row.try_get("routing_key")?,
        body: row.try_get("body")?,
        attempt: u32::try_from(attempts).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settlement_requires_the_receiving_claim() {
        for statement in [ACK_MESSAGE, REQUEUE_MESSAGE, DEAD_LETTER_MESSAGE] {
            assert!(
                statement.contains("id = $1 AND locked_until IS NOT NULL AND attempts = $2"),
                "{statement}"
            );
        }
        assert!(REQUEUE_MESSAGE.contains("make_interval(secs => $3)"));
        assert!(DEAD_LETTER_MESSAGE.contains("$3 FROM moved"));
    }
}
