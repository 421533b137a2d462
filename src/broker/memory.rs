//! In-memory stream broker for tests and demos.
//!
//! Implements the same producer/consumer traits as the journal broker and
//! drives the same [`GroupCursor`] logic, so group semantics (competing
//! consumers, acknowledgment, redelivery, delivery cap) match the durable
//! variant exactly. State is process-local and lost on drop.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::domain::{MessageId, StreamRecord};

use super::cursor::GroupCursor;
use super::{AckToken, BrokerError, BrokerOptions, Delivery, MessageConsumer, MessageProducer, MessageStream};

#[derive(Debug, Default)]
struct MemoryState {
    next_id: MessageId,
    records: Vec<StreamRecord>,
    /// Cursor per (topic, group)
    groups: HashMap<(String, String), GroupCursor>,
}

/// Process-local broker; clones share one log.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    state: Arc<Mutex<MemoryState>>,
    options: BrokerOptions,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Create an empty broker with default tuning.
    pub fn new() -> Self {
        Self::with_options(BrokerOptions::default())
    }

    /// Create an empty broker with explicit delivery tuning.
    pub fn with_options(options: BrokerOptions) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            options,
        }
    }
}

#[async_trait]
impl MessageProducer for MemoryBroker {
    async fn publish(
        &self,
        topic: &str,
        payload: serde_json::Value,
    ) -> Result<MessageId, BrokerError> {
        let mut state = self.state.lock().await;

        state.next_id += 1;
        let id = state.next_id;
        state.records.push(StreamRecord {
            id,
            topic: topic.to_string(),
            payload,
            enqueued_at: Utc::now(),
        });

        Ok(id)
    }
}

#[async_trait]
impl MessageConsumer for MemoryBroker {
    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
    ) -> Result<Box<dyn MessageStream>, BrokerError> {
        let mut state = self.state.lock().await;
        state
            .groups
            .entry((topic.to_string(), group.to_string()))
            .or_default();

        Ok(Box::new(MemoryStream {
            state: Arc::clone(&self.state),
            topic: topic.to_string(),
            group: group.to_string(),
            consumer: consumer.to_string(),
            options: self.options.clone(),
        }))
    }
}

struct MemoryStream {
    state: Arc<Mutex<MemoryState>>,
    topic: String,
    group: String,
    consumer: String,
    options: BrokerOptions,
}

impl MemoryStream {
    /// One delivery attempt: claims first, then the next fresh record.
    async fn poll(&self) -> Option<StreamRecord> {
        let mut state = self.state.lock().await;
        let MemoryState {
            ref records,
            ref mut groups,
            ..
        } = *state;

        let cursor = groups
            .entry((self.topic.clone(), self.group.clone()))
            .or_default();
        let now = Utc::now();

        let claim = cursor.claim_idle(
            &self.consumer,
            now,
            self.options.delivery_window,
            self.options.max_deliveries,
        );
        for id in &claim.dropped {
            warn!(id, topic = %self.topic, group = %self.group, "dropping record past delivery cap");
        }

        if let Some(id) = claim.claimed {
            if let Some(record) = records.iter().find(|r| r.id == id) {
                return Some(record.clone());
            }
            cursor.ack(id);
        }

        let fresh = cursor.next_fresh(records, &self.topic).cloned();
        if let Some(ref record) = fresh {
            cursor.deliver(record.id, &self.consumer, now);
        }

        fresh
    }
}

#[async_trait]
impl MessageStream for MemoryStream {
    async fn recv(&mut self) -> Delivery {
        loop {
            if let Some(record) = self.poll().await {
                let token = MemoryAck {
                    state: Arc::clone(&self.state),
                    topic: self.topic.clone(),
                    group: self.group.clone(),
                    id: record.id,
                };
                return Delivery::new(record.id, record.payload, Box::new(token));
            }

            tokio::time::sleep(self.options.poll_interval).await;
        }
    }
}

struct MemoryAck {
    state: Arc<Mutex<MemoryState>>,
    topic: String,
    group: String,
    id: MessageId,
}

#[async_trait]
impl AckToken for MemoryAck {
    async fn ack(self: Box<Self>) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        if let Some(cursor) = state.groups.get_mut(&(self.topic.clone(), self.group.clone())) {
            cursor.ack(self.id);
        }
        Ok(())
    }
}
