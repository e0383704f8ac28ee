//! Redis-backed broker using the reliable-queue list pattern.
//!
//! Each queue is a pair of lists: `queue:{name}` holds ready messages,
//! `queue:{name}:pending` the ones handed to a consumer but not yet
//! acknowledged. `BRPOPLPUSH` moves a message between them atomically, so
//! a consumer crash leaves the message recoverable in the pending list.
//! Messages travel as JSON envelopes carrying their attempt count.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};

use super::{Broker, BrokerError, BrokerResult, BrokerSettings, Delivery, Queue};

const CONSUME_BLOCK_SECS: f64 = 5.0;

#[derive(Serialize, Deserialize)]
struct Envelope {
    id: String,
    attempts: u32,
    payload: String,
}

/// Broker implementation on a Redis instance
pub struct RedisBroker {
    manager: ConnectionManager,
    settings: BrokerSettings,
}

impl RedisBroker {
    pub async fn connect(url: &str, settings: BrokerSettings) -> BrokerResult<Self> {
        let client = Client::open(url).map_err(|e| BrokerError::Connection(e.to_string()))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        Ok(Self { manager, settings })
    }

    fn ready_key(queue: Queue) -> String {
        format!("queue:{}", queue.name())
    }

    fn pending_key(queue: Queue) -> String {
        format!("queue:{}:pending", queue.name())
    }
}

fn backend(e: redis::RedisError) -> BrokerError {
    BrokerError::Backend(e.to_string())
}

#[async_trait]
impl Broker for RedisBroker {
    async fn publish(&self, queue: Queue, payload: &[u8]) -> BrokerResult<()> {
        let mut conn = self.manager.clone();
        let ready = Self::ready_key(queue);

        let length: usize = conn.llen(&ready).await.map_err(backend)?;
        if length >= self.settings.max_queue_length {
            return Err(BrokerError::QueueFull(queue.name().to_string()));
        }

        let envelope = Envelope {
            id: uuid::Uuid::new_v4().to_string(),
            attempts: 0,
            payload: String::from_utf8(payload.to_vec())
                .map_err(|_| BrokerError::Malformed("payload is not UTF-8".to_string()))?,
        };
        let raw = serde_json::to_string(&envelope)
            .map_err(|e| BrokerError::Malformed(e.to_string()))?;

        conn.lpush(&ready, raw).await.map_err(backend)
    }

    async fn consume(&self, queue: Queue) -> BrokerResult<Delivery> {
        let mut conn = self.manager.clone();
        let ready = Self::ready_key(queue);
        let pending = Self::pending_key(queue);

        loop {
            let raw: Option<String> = redis::cmd("BRPOPLPUSH")
                .arg(&ready)
                .arg(&pending)
                .arg(CONSUME_BLOCK_SECS)
                .query_async(&mut conn)
                .await
                .map_err(backend)?;

            let Some(raw) = raw else {
                continue;
            };

            let envelope: Envelope = match serde_json::from_str(&raw) {
                Ok(envelope) => envelope,
                Err(err) => {
                    // Unparseable messages are removed rather than recycled
                    tracing::error!(queue = queue.name(), error = %err, "Dropping malformed message");
                    let _: i64 = conn.lrem(&pending, 1, &raw).await.map_err(backend)?;
                    continue;
                }
            };

            return Ok(Delivery {
                queue,
                payload: envelope.payload.into_bytes(),
                delivery_count: envelope.attempts + 1,
                token: raw,
            });
        }
    }

    async fn ack(&self, delivery: &Delivery) -> BrokerResult<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn
            .lrem(Self::pending_key(delivery.queue), 1, &delivery.token)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery) -> BrokerResult<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn
            .lrem(Self::pending_key(delivery.queue), 1, &delivery.token)
            .await
            .map_err(backend)?;

        if delivery.delivery_count >= self.settings.max_delivery_count {
            tracing::warn!(
                queue = delivery.queue.name(),
                deliveries = delivery.delivery_count,
                "Dropping message after delivery limit"
            );
            return Ok(());
        }

        let mut envelope: Envelope = serde_json::from_str(&delivery.token)
            .map_err(|e| BrokerError::Malformed(e.to_string()))?;
        envelope.attempts += 1;
        let raw = serde_json::to_string(&envelope)
            .map_err(|e| BrokerError::Malformed(e.to_string()))?;

        conn.lpush(Self::ready_key(delivery.queue), raw)
            .await
            .map_err(backend)
    }

    async fn queue_length(&self, queue: Queue) -> BrokerResult<usize> {
        let mut conn = self.manager.clone();
        conn.llen(Self::ready_key(queue)).await.map_err(backend)
    }
}
