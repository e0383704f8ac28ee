//! The broker: acknowledged work queues between the API and the workers.
//!
//! Three logical queues (`analysis`, `report`, `dataset`) with a hard
//! per-queue length ceiling and a per-message delivery-count limit.
//! Consumers hold at most one unacknowledged delivery at a time
//! (prefetch = 1) so horizontal scaling stays fair.

mod memory;
mod redis_broker;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use memory::MemoryBroker;
pub use redis_broker::RedisBroker;

/// Logical work queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Queue {
    Analysis,
    Report,
    Dataset,
}

impl Queue {
    /// Queue names are versioned with the message format
    pub fn name(&self) -> &'static str {
        match self {
            Queue::Analysis => "gsa_analysis_v0.1",
            Queue::Report => "gsa_report_v0.1",
            Queue::Dataset => "gsa_dataset_v0.1",
        }
    }

    pub const ALL: [Queue; 3] = [Queue::Analysis, Queue::Report, Queue::Dataset];
}

/// Errors raised by broker backends
#[derive(Error, Debug)]
pub enum BrokerError {
    /// The queue is at its configured length ceiling
    #[error("Queue {0} is full")]
    QueueFull(String),

    #[error("Failed to connect to queuing system: {0}")]
    Connection(String),

    #[error("Queuing backend error: {0}")]
    Backend(String),

    #[error("Message is malformed: {0}")]
    Malformed(String),
}

pub type BrokerResult<T> = std::result::Result<T, BrokerError>;

/// One received message awaiting acknowledgement
#[derive(Debug, Clone)]
pub struct Delivery {
    pub queue: Queue,
    pub payload: Vec<u8>,
    /// How many times this message has been delivered, this one included
    pub delivery_count: u32,
    /// Backend handle used to ack or reject the delivery
    pub token: String,
}

/// Queue limits shared by all backends
#[derive(Debug, Clone, Copy)]
pub struct BrokerSettings {
    /// Hard per-queue length ceiling; publishes beyond it fail
    pub max_queue_length: usize,
    /// Deliveries per message before the broker drops it
    pub max_delivery_count: u32,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            max_queue_length: 10,
            max_delivery_count: 3,
        }
    }
}

/// Acknowledged-delivery queue capability
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish a persistent message; fails with [`BrokerError::QueueFull`]
    /// at the ceiling.
    async fn publish(&self, queue: Queue, payload: &[u8]) -> BrokerResult<()>;

    /// Block until a message is available on the queue
    async fn consume(&self, queue: Queue) -> BrokerResult<Delivery>;

    /// Acknowledge a delivery, removing the message for good
    async fn ack(&self, delivery: &Delivery) -> BrokerResult<()>;

    /// Reject a delivery; the message is re-enqueued until the delivery
    /// limit is reached, then dropped.
    async fn nack(&self, delivery: &Delivery) -> BrokerResult<()>;

    /// Current number of ready messages on the queue
    async fn queue_length(&self, queue: Queue) -> BrokerResult<usize>;
}

pub type BrokerRef = Arc<dyn Broker>;

/// Publish with a bounded retry loop, pausing between attempts.
///
/// Used at admission: exhaustion surfaces to the client as 503.
pub async fn publish_with_retry(
    broker: &dyn Broker,
    queue: Queue,
    payload: &[u8],
    max_tries: u32,
) -> BrokerResult<()> {
    let mut last_error = None;

    for attempt in 1..=max_tries.max(1) {
        match broker.publish(queue, payload).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                tracing::debug!(
                    queue = queue.name(),
                    attempt,
                    error = %err,
                    "Failed to publish message, retrying"
                );
                last_error = Some(err);
                if attempt < max_tries {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| BrokerError::Backend("publish failed".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_names_are_versioned() {
        assert_eq!(Queue::Analysis.name(), "gsa_analysis_v0.1");
        assert_eq!(Queue::ALL.len(), 3);
    }

    #[tokio::test]
    async fn test_publish_with_retry_exhausts() {
        let broker = MemoryBroker::new(BrokerSettings {
            max_queue_length: 0,
            max_delivery_count: 3,
        });

        let start = std::time::Instant::now();
        let result = publish_with_retry(&broker, Queue::Analysis, b"{}", 2).await;
        assert!(matches!(result, Err(BrokerError::QueueFull(_))));
        // One pause between the two attempts
        assert!(start.elapsed() >= Duration::from_secs(1));
    }
}
