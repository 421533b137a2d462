//! ticketd - asynchronous ticket-processing pipeline
//!
//! Tickets carry a question. Creating one persists it durably, then
//! publishes a `ticket.created` event on a stream broker with competing
//! consumer groups. A worker loop consumes creation events, calls a
//! generation backend, and drives the ticket state machine
//! `uninitialized → processing → done`. Readers poll ticket state at any
//! time.
//!
//! # Architecture
//!
//! Delivery is at-least-once: records are acknowledged only after the
//! corresponding work is durably complete, and unacknowledged records are
//! redelivered to any live consumer in the group (up to a delivery cap).
//! Duplicate processing of one ticket is tolerated; its state machine is
//! monotonic.
//!
//! # Modules
//!
//! - `domain`: Data structures (Ticket, StreamRecord)
//! - `broker`: Stream broker (journal-backed and in-memory)
//! - `store`: Ticket persistence (file-backed and in-memory)
//! - `adapters`: Generation backends (HTTP and mock)
//! - `core`: Orchestration (TicketService, TicketProcessor)
//! - `cli`: Command-line interface and composition root
//!
//! # Usage
//!
//! ```bash
//! # Run a worker
//! ticketd work
//!
//! # Create a ticket
//! ticketd ask "2+2?"
//!
//! # Check it later
//! ticketd status <ticket-id>
//! ticketd show <ticket-id>
//! ```

pub mod adapters;
pub mod broker;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod store;

// Re-export main types at crate root for convenience
pub use crate::adapters::{Backend, BackendError, Generation};
pub use crate::broker::{
    BrokerError, BrokerOptions, Delivery, JournalBroker, MemoryBroker, MessageConsumer,
    MessageProducer, MessageStream,
};
pub use crate::core::{ServiceError, TicketProcessor, TicketService};
pub use crate::domain::{Ticket, TicketCreated, TicketStatus, TOPIC_TICKET_CREATED};
pub use crate::store::{FileTicketStore, MemoryTicketStore, StoreError, TicketStore};
