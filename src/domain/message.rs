//! Stream record envelope and well-known topics.
//!
//! Records are appended to the broker's log with a broker-assigned,
//! monotonically increasing identifier. Payloads are opaque JSON; the only
//! shape this system publishes is [`TicketCreated`] on [`TOPIC_TICKET_CREATED`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Topic carrying one event per created ticket.
pub const TOPIC_TICKET_CREATED: &str = "ticket.created";

/// Broker-assigned record identifier, increasing in append order.
pub type MessageId = u64;

/// A single record in the append-only stream log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRecord {
    /// Assigned by the broker at append time
    pub id: MessageId,

    /// Named channel within the broker
    pub topic: String,

    /// Opaque message body
    pub payload: serde_json::Value,

    /// Wall-clock time of the append
    pub enqueued_at: DateTime<Utc>,
}

/// Payload published on [`TOPIC_TICKET_CREATED`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketCreated {
    pub ticket_id: Uuid,
}
