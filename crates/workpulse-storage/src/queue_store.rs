// Durable queue substrate on Postgres.
//
// A queue is a catalog row; messages are rows polled with
// FOR UPDATE SKIP LOCKED so concurrent workers never double-deliver.
// Delivery is a lease: ack deletes the row, an unacked lease expires and the
// message becomes visible again. FIFO holds per queue by id order.

use anyhow::Result;
use std::time::Duration;

use crate::models::LeasedMessage;
use crate::repositories::Database;

impl Database {
    /// Idempotently register a durable queue
    pub async fn ensure_queue(&self, name: &str, step: &str, tier: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO queues (name, step, tier)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(step)
        .bind(tier)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Append a message; the INSERT committing is the publisher confirmation
    pub async fn enqueue(&self, queue: &str, payload: &serde_json::Value) -> Result<i64> {
        self.enqueue_with_delay(queue, payload, Duration::ZERO, 0).await
    }

    /// Append a message that becomes visible after `delay`
    pub async fn enqueue_with_delay(
        &self,
        queue: &str,
        payload: &serde_json::Value,
        delay: Duration,
        retry_count: i32,
    ) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO queue_messages (queue_name, payload, retry_count, visible_at)
            VALUES ($1, $2, $3, NOW() + make_interval(secs => $4))
            RETURNING id
            "#,
        )
        .bind(queue)
        .bind(payload)
        .bind(retry_count)
        .bind(delay.as_secs_f64())
        .fetch_one(self.pool())
        .await?;

        Ok(id)
    }

    /// Lease the oldest visible message, if any. The lease must be longer
    /// than any handler is allowed to run.
    pub async fn lease_one(&self, queue: &str, lease: Duration) -> Result<Option<LeasedMessage>> {
        let row = sqlx::query_as::<_, LeasedMessage>(
            r#"
            UPDATE queue_messages
            SET locked_at = NOW(), visible_at = NOW() + make_interval(secs => $2)
            WHERE id = (
                SELECT id FROM queue_messages
                WHERE queue_name = $1 AND visible_at <= NOW()
                ORDER BY id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, payload, retry_count
            "#,
        )
        .bind(queue)
        .bind(lease.as_secs_f64())
        .fetch_optional(self.pool())
        .await?;

        Ok(row)
    }

    /// Manual ack: the message is done and removed
    pub async fn ack_message(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM queue_messages WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Negative ack: return the message to the queue immediately
    pub async fn nack_message(&self, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE queue_messages SET visible_at = NOW(), locked_at = NULL WHERE id = $1",
        )
        .bind(id)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Queue depth, for observability
    pub async fn queue_depth(&self, queue: &str) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM queue_messages WHERE queue_name = $1")
                .bind(queue)
                .fetch_one(self.pool())
                .await?;

        Ok(count)
    }
}
