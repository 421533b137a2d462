//! Domain types for the ticket pipeline.
//!
//! This module contains the core data structures:
//! - Ticket: the persisted unit of work and its status state machine
//! - StreamRecord: the broker's append-only record envelope

pub mod message;
pub mod ticket;

// Re-export commonly used types
pub use message::{MessageId, StreamRecord, TicketCreated, TOPIC_TICKET_CREATED};
pub use ticket::{Ticket, TicketStatus};
