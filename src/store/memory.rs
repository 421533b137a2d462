//! In-memory ticket store for tests and demos.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::Ticket;

use super::{StoreError, TicketStore};

/// Process-local store; clones share one map.
#[derive(Debug, Clone, Default)]
pub struct MemoryTicketStore {
    tickets: Arc<Mutex<HashMap<Uuid, Ticket>>>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn save(&self, ticket: &Ticket) -> Result<(), StoreError> {
        self.tickets.lock().await.insert(ticket.id, ticket.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        Ok(self.tickets.lock().await.get(&id).cloned())
    }
}
