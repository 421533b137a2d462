//! Per-(topic, group) delivery cursor.
//!
//! The cursor tracks which records a group has seen (`last_delivered`) and
//! which are delivered-but-unacknowledged (`pending`). Both broker
//! implementations drive the same cursor logic, so group semantics are
//! identical whether the log lives on disk or in memory.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{MessageId, StreamRecord};

/// Bookkeeping for one unacknowledged delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingEntry {
    /// Consumer the record was last delivered to
    pub consumer: String,

    /// When that delivery happened
    pub delivered_at: DateTime<Utc>,

    /// Total deliveries of this record so far
    pub delivery_count: u32,
}

/// Result of a redelivery sweep over the pending set.
#[derive(Debug, Default)]
pub struct Claim {
    /// Record claimed for redelivery, if any
    pub claimed: Option<MessageId>,

    /// Records removed because another delivery would exceed the cap
    pub dropped: Vec<MessageId>,
}

/// Delivery state for one (topic, group) pair.
///
/// `last_delivered == 0` positions a freshly created group at the start of
/// the stream: every existing record on the topic is still deliverable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupCursor {
    /// Highest record id handed out as a fresh delivery
    pub last_delivered: MessageId,

    /// Delivered-but-unacknowledged records, keyed by id
    pub pending: BTreeMap<MessageId, PendingEntry>,
}

impl GroupCursor {
    /// First record on `topic` the group has not yet seen.
    ///
    /// `records` must be in append (id-ascending) order.
    pub fn next_fresh<'a>(&self, records: &'a [StreamRecord], topic: &str) -> Option<&'a StreamRecord> {
        records
            .iter()
            .find(|r| r.topic == topic && r.id > self.last_delivered)
    }

    /// Record a fresh delivery to `consumer`, advancing the cursor.
    pub fn deliver(&mut self, id: MessageId, consumer: &str, now: DateTime<Utc>) {
        self.last_delivered = self.last_delivered.max(id);
        self.pending.insert(
            id,
            PendingEntry {
                consumer: consumer.to_string(),
                delivered_at: now,
                delivery_count: 1,
            },
        );
    }

    /// Acknowledge a record, removing it from the redelivery set.
    ///
    /// Returns false if the record was not pending (already acknowledged or
    /// dropped), which callers treat as a no-op.
    pub fn ack(&mut self, id: MessageId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Sweep the pending set for redelivery to `consumer`.
    ///
    /// Claims the oldest entry idle longer than `window`. Entries whose next
    /// delivery would exceed `max_deliveries` are removed instead and
    /// reported in [`Claim::dropped`].
    pub fn claim_idle(
        &mut self,
        consumer: &str,
        now: DateTime<Utc>,
        window: Duration,
        max_deliveries: u32,
    ) -> Claim {
        let mut claim = Claim::default();
        let ids: Vec<MessageId> = self.pending.keys().copied().collect();

        for id in ids {
            let (idle, count) = match self.pending.get(&id) {
                Some(entry) => {
                    let idle = now
                        .signed_duration_since(entry.delivered_at)
                        .to_std()
                        .unwrap_or(Duration::ZERO);
                    (idle, entry.delivery_count)
                }
                None => continue,
            };

            if idle < window {
                continue;
            }

            if count >= max_deliveries {
                self.pending.remove(&id);
                claim.dropped.push(id);
                continue;
            }

            if let Some(entry) = self.pending.get_mut(&id) {
                entry.consumer = consumer.to_string();
                entry.delivered_at = now;
                entry.delivery_count += 1;
            }
            claim.claimed = Some(id);
            break;
        }

        claim
    }
}
