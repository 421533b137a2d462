//! Stream broker interfaces for external messaging.
//!
//! The broker is an append-only, topic-partitioned log with competing
//! consumer groups. Producers append records; consumers receive disjoint
//! subsets of a topic's records and acknowledge each one only after its
//! work is durably complete. Unacknowledged records are redelivered.
//!
//! Two implementations satisfy the same traits and are selected by the
//! composition root: [`JournalBroker`] (durable, file-backed, safe across
//! processes) and [`MemoryBroker`] (process-local, for tests and demos).

pub mod cursor;
pub mod journal;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::MessageId;

// Re-export the broker implementations
pub use journal::JournalBroker;
pub use memory::MemoryBroker;

/// Errors surfaced by broker operations
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<std::io::Error> for BrokerError {
    fn from(err: std::io::Error) -> Self {
        BrokerError::Unavailable(err.to_string())
    }
}

/// Delivery and redelivery tuning, shared by all broker implementations.
#[derive(Debug, Clone)]
pub struct BrokerOptions {
    /// Sleep between polls when the topic has no deliverable records
    pub poll_interval: Duration,

    /// Idle time after which an unacknowledged delivery becomes claimable
    /// by any consumer in the group
    pub delivery_window: Duration,

    /// Deliveries allowed per record before the broker drops it
    pub max_deliveries: u32,
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            delivery_window: Duration::from_secs(30),
            max_deliveries: 5,
        }
    }
}

/// Producer role: append records to the log.
#[async_trait]
pub trait MessageProducer: Send + Sync {
    /// Durably append `payload` under `topic` and return the assigned id.
    ///
    /// On error the caller must not assume the record was stored.
    async fn publish(
        &self,
        topic: &str,
        payload: serde_json::Value,
    ) -> Result<MessageId, BrokerError>;
}

/// Consumer role: join a competing-consumer group on a topic.
#[async_trait]
pub trait MessageConsumer: Send + Sync {
    /// Register `consumer` in `group` and return its record stream.
    ///
    /// The first subscriber for a (topic, group) pair creates the group's
    /// cursor at the start of the stream; concurrent creation is idempotent.
    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
    ) -> Result<Box<dyn MessageStream>, BrokerError>;
}

/// An infinite, non-restartable sequence of deliveries for one consumer.
#[async_trait]
pub trait MessageStream: Send {
    /// Wait for the next record.
    ///
    /// Never returns an error: transient failures of the underlying log are
    /// logged and retried with a fixed backoff inside the stream. Within one
    /// consumer, fresh records arrive in append order for the topic;
    /// redelivered records may interleave out of order.
    async fn recv(&mut self) -> Delivery;
}

/// Implementation-specific acknowledgment handle carried by a [`Delivery`].
#[async_trait]
pub trait AckToken: Send {
    async fn ack(self: Box<Self>) -> Result<(), BrokerError>;
}

/// One delivered record plus its acknowledgment handle.
///
/// Acknowledge only after the corresponding work is durably complete;
/// a dropped (never-acked) delivery is redelivered after the group's
/// delivery window, up to the delivery cap.
pub struct Delivery {
    /// Broker-assigned record id
    pub id: MessageId,

    /// The record payload
    pub payload: serde_json::Value,

    token: Box<dyn AckToken>,
}

impl Delivery {
    pub(crate) fn new(id: MessageId, payload: serde_json::Value, token: Box<dyn AckToken>) -> Self {
        Self { id, payload, token }
    }

    /// Remove this record from the group's redelivery set.
    pub async fn ack(self) -> Result<(), BrokerError> {
        self.token.ack().await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("id", &self.id)
            .field("payload", &self.payload)
            .finish()
    }
}
