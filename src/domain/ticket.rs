//! Ticket entity and its status state machine.
//!
//! A ticket is the unit of work tracked through
//! `uninitialized → processing → done`. The service layer is the sole
//! writer of ticket state; the store persists tickets verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a ticket.
///
/// Transitions are monotonic in declaration order: a ticket never moves
/// back to an earlier status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    /// Created and persisted, not yet picked up by a worker
    Uninitialized,

    /// A worker is generating the answer
    Processing,

    /// Answer is available
    Done,
}

impl TicketStatus {
    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Equal-or-forward is allowed; a redelivered record may observe the
    /// ticket already in the target state. Backward transitions are not.
    pub fn can_advance_to(self, next: TicketStatus) -> bool {
        self <= next
    }

    /// The wire name of the status, as persisted and displayed.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Processing => "processing",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The persisted unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique identifier, assigned at creation, immutable
    pub id: Uuid,

    /// Original input text, immutable after creation
    pub question: String,

    /// Current lifecycle status
    pub status: TicketStatus,

    /// When the ticket was created (RFC 3339)
    pub created_at: DateTime<Utc>,

    /// Refreshed on every mutation; monotonically non-decreasing
    pub updated_at: DateTime<Utc>,

    /// Present only once status reaches `done`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,

    /// Free-text annotation, reserved for failure diagnostics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Ticket {
    /// Create a fresh ticket with both timestamps set to now.
    pub fn new(id: Uuid, question: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            question,
            status: TicketStatus::Uninitialized,
            created_at: now,
            updated_at: now,
            answer: None,
            note: None,
        }
    }

    /// Whether the ticket has reached its terminal state.
    pub fn is_done(&self) -> bool {
        self.status == TicketStatus::Done
    }

    /// Advance the status, refreshing `updated_at`.
    ///
    /// Callers validate the transition first (`TicketStatus::can_advance_to`);
    /// this just applies it.
    pub fn set_status(&mut self, status: TicketStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Record the answer and force the terminal `done` status.
    pub fn set_answer(&mut self, answer: String) {
        self.answer = Some(answer);
        self.status = TicketStatus::Done;
        self.updated_at = Utc::now();
    }
}
