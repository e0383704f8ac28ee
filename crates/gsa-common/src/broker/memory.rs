//! In-memory broker backed by per-queue deques.
//!
//! Messages survive nack-redelivery bookkeeping but not a process restart;
//! deployments use the Redis backend.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{Broker, BrokerError, BrokerResult, BrokerSettings, Delivery, Queue};

#[derive(Clone)]
struct Envelope {
    payload: Vec<u8>,
    delivery_count: u32,
    token: u64,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Envelope>,
    pending: HashMap<u64, Envelope>,
    next_token: u64,
}

struct QueueSlot {
    state: Mutex<QueueState>,
    notify: Notify,
}

/// Broker implementation for tests and standalone runs
pub struct MemoryBroker {
    settings: BrokerSettings,
    queues: HashMap<Queue, QueueSlot>,
}

impl MemoryBroker {
    pub fn new(settings: BrokerSettings) -> Self {
        let queues = Queue::ALL
            .iter()
            .map(|&queue| {
                (
                    queue,
                    QueueSlot {
                        state: Mutex::new(QueueState::default()),
                        notify: Notify::new(),
                    },
                )
            })
            .collect();

        Self { settings, queues }
    }

    fn slot(&self, queue: Queue) -> &QueueSlot {
        // All queues are created up front
        &self.queues[&queue]
    }

    fn lock(slot: &QueueSlot) -> std::sync::MutexGuard<'_, QueueState> {
        slot.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, queue: Queue, payload: &[u8]) -> BrokerResult<()> {
        let slot = self.slot(queue);
        {
            let mut state = Self::lock(slot);
            if state.ready.len() >= self.settings.max_queue_length {
                return Err(BrokerError::QueueFull(queue.name().to_string()));
            }

            let token = state.next_token;
            state.next_token += 1;
            state.ready.push_back(Envelope {
                payload: payload.to_vec(),
                delivery_count: 0,
                token,
            });
        }
        slot.notify.notify_one();
        Ok(())
    }

    async fn consume(&self, queue: Queue) -> BrokerResult<Delivery> {
        let slot = self.slot(queue);
        loop {
            {
                let mut state = Self::lock(slot);
                if let Some(mut envelope) = state.ready.pop_front() {
                    envelope.delivery_count += 1;
                    let delivery = Delivery {
                        queue,
                        payload: envelope.payload.clone(),
                        delivery_count: envelope.delivery_count,
                        token: envelope.token.to_string(),
                    };
                    state.pending.insert(envelope.token, envelope);
                    return Ok(delivery);
                }
            }

            // Re-check periodically in case a notification raced the pop
            let _ = tokio::time::timeout(Duration::from_millis(200), slot.notify.notified()).await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> BrokerResult<()> {
        let token: u64 = delivery
            .token
            .parse()
            .map_err(|_| BrokerError::Malformed("invalid delivery token".to_string()))?;

        Self::lock(self.slot(delivery.queue)).pending.remove(&token);
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery) -> BrokerResult<()> {
        let token: u64 = delivery
            .token
            .parse()
            .map_err(|_| BrokerError::Malformed("invalid delivery token".to_string()))?;

        let slot = self.slot(delivery.queue);
        let requeued = {
            let mut state = Self::lock(slot);
            match state.pending.remove(&token) {
                Some(envelope) if envelope.delivery_count >= self.settings.max_delivery_count => {
                    tracing::warn!(
                        queue = delivery.queue.name(),
                        deliveries = envelope.delivery_count,
                        "Dropping message after delivery limit"
                    );
                    false
                }
                Some(envelope) => {
                    state.ready.push_front(envelope);
                    true
                }
                None => false,
            }
        };

        if requeued {
            slot.notify.notify_one();
        }
        Ok(())
    }

    async fn queue_length(&self, queue: Queue) -> BrokerResult<usize> {
        Ok(Self::lock(self.slot(queue)).ready.len())
    }
}
