//! Ticket persistence interfaces.
//!
//! The store is a durable key/value layer for [`Ticket`] entities. It
//! persists what it is given and never mutates ticket fields on its own.
//! Two implementations satisfy the same trait: [`FileTicketStore`] (one
//! JSON document per ticket on disk) and [`MemoryTicketStore`].

pub mod file;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::Ticket;

// Re-export the store implementations
pub use file::FileTicketStore;
pub use memory::MemoryTicketStore;

/// Errors surfaced by store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Persistence backend unreachable after bounded retries
    #[error("ticket store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable key/value persistence for tickets, keyed by ticket id.
///
/// `save` and `update` are both upserts; concurrent writers to the same id
/// are last-write-wins without corrupting the record. `get` distinguishes
/// "absent" (`Ok(None)`) from a backend failure (`Err`).
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn save(&self, ticket: &Ticket) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Ticket>, StoreError>;

    async fn update(&self, ticket: &Ticket) -> Result<(), StoreError> {
        self.save(ticket).await
    }
}
