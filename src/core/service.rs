//! Ticket lifecycle orchestration.
//!
//! The service is the sole writer of ticket state. It composes the ticket
//! store with the broker's producer role: creation persists the ticket
//! first, then publishes a `ticket.created` event, so a consumer reacting
//! to the event can always find the ticket.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::broker::{BrokerError, MessageProducer};
use crate::domain::{Ticket, TicketCreated, TicketStatus, TOPIC_TICKET_CREATED};
use crate::store::{StoreError, TicketStore};

/// Errors surfaced by ticket service operations
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("ticket {0} not found")]
    NotFound(Uuid),

    #[error("failed to persist ticket: {0}")]
    Persist(#[source] StoreError),

    #[error("ticket {id} persisted but enqueue failed: {source}")]
    Enqueue {
        id: Uuid,
        #[source]
        source: BrokerError,
    },

    #[error("invalid status transition for ticket {id}: {from:?} -> {to:?}")]
    InvalidTransition {
        id: Uuid,
        from: TicketStatus,
        to: TicketStatus,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("event payload was not encodable: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Orchestrates ticket creation, queries, and state transitions.
pub struct TicketService {
    store: Arc<dyn TicketStore>,
    producer: Arc<dyn MessageProducer>,
}

impl TicketService {
    /// Create a service over an explicitly injected store and producer.
    pub fn new(store: Arc<dyn TicketStore>, producer: Arc<dyn MessageProducer>) -> Self {
        Self { store, producer }
    }

    /// Create a ticket and queue it for processing; returns the ticket id.
    ///
    /// The ticket is durably persisted before the event is published. A
    /// publish failure after successful persistence surfaces as
    /// [`ServiceError::Enqueue`], which still carries the id: the ticket
    /// exists and is queryable, but no worker will pick it up.
    pub async fn create_ticket(&self, question: String) -> Result<Uuid, ServiceError> {
        let ticket = Ticket::new(Uuid::new_v4(), question);
        let id = ticket.id;

        self.store
            .save(&ticket)
            .await
            .map_err(ServiceError::Persist)?;
        info!(ticket_id = %id, "created ticket");

        let payload = serde_json::to_value(TicketCreated { ticket_id: id })?;
        self.producer
            .publish(TOPIC_TICKET_CREATED, payload)
            .await
            .map_err(|source| {
                warn!(ticket_id = %id, error = %source, "ticket persisted but enqueue failed");
                ServiceError::Enqueue { id, source }
            })?;
        info!(ticket_id = %id, "queued ticket for processing");

        Ok(id)
    }

    /// Fetch a ticket, failing with [`ServiceError::NotFound`] if absent.
    pub async fn get_ticket_data(&self, id: Uuid) -> Result<Ticket, ServiceError> {
        self.store
            .get(id)
            .await?
            .ok_or(ServiceError::NotFound(id))
    }

    /// Fetch just the status of a ticket.
    pub async fn get_ticket_status(&self, id: Uuid) -> Result<TicketStatus, ServiceError> {
        Ok(self.get_ticket_data(id).await?.status)
    }

    /// Advance a ticket's status, refreshing `updated_at`.
    ///
    /// Transitions are monotonic; moving backward is rejected.
    pub async fn update_ticket_status(
        &self,
        id: Uuid,
        status: TicketStatus,
    ) -> Result<(), ServiceError> {
        let mut ticket = self.get_ticket_data(id).await?;

        if !ticket.status.can_advance_to(status) {
            return Err(ServiceError::InvalidTransition {
                id,
                from: ticket.status,
                to: status,
            });
        }

        ticket.set_status(status);
        self.store.update(&ticket).await?;
        info!(ticket_id = %id, status = ?status, "updated ticket status");

        Ok(())
    }

    /// Record the answer, forcing the terminal `done` status.
    ///
    /// This is the only path that transitions a ticket into `done`.
    pub async fn update_ticket_answer(&self, id: Uuid, answer: String) -> Result<(), ServiceError> {
        let mut ticket = self.get_ticket_data(id).await?;

        ticket.set_answer(answer);
        self.store.update(&ticket).await?;
        info!(ticket_id = %id, "recorded answer, ticket done");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{MemoryBroker, MessageConsumer, MessageStream};
    use crate::store::MemoryTicketStore;
    use async_trait::async_trait;

    fn service_with(
        store: Arc<dyn TicketStore>,
        producer: Arc<dyn MessageProducer>,
    ) -> TicketService {
        TicketService::new(store, producer)
    }

    #[tokio::test]
    async fn test_create_persists_and_publishes() {
        let store = Arc::new(MemoryTicketStore::new());
        let broker = MemoryBroker::new();
        let service = service_with(store.clone(), Arc::new(broker.clone()));

        let id = service.create_ticket("2+2?".to_string()).await.unwrap();

        let ticket = service.get_ticket_data(id).await.unwrap();
        assert_eq!(ticket.status, TicketStatus::Uninitialized);
        assert_eq!(ticket.question, "2+2?");

        let mut stream = broker
            .subscribe(TOPIC_TICKET_CREATED, "g", "c")
            .await
            .unwrap();
        let delivery = stream.recv().await;
        let event: TicketCreated = serde_json::from_value(delivery.payload).unwrap();
        assert_eq!(event.ticket_id, id);
    }

    /// Producer that asserts the ticket is already visible in the store at
    /// publish time — the persist-before-publish ordering contract.
    struct OrderingProbe {
        store: Arc<MemoryTicketStore>,
    }

    #[async_trait]
    impl MessageProducer for OrderingProbe {
        async fn publish(
            &self,
            _topic: &str,
            payload: serde_json::Value,
        ) -> Result<crate::domain::MessageId, BrokerError> {
            let event: TicketCreated = serde_json::from_value(payload)?;
            let found = self
                .store
                .get(event.ticket_id)
                .await
                .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
            assert!(found.is_some(), "event published before ticket persisted");
            Ok(1)
        }
    }

    #[tokio::test]
    async fn test_ticket_is_persisted_before_publish() {
        let store = Arc::new(MemoryTicketStore::new());
        let probe = OrderingProbe {
            store: store.clone(),
        };
        let service = service_with(store, Arc::new(probe));

        service.create_ticket("q".to_string()).await.unwrap();
    }

    /// Producer that always fails, for the persisted-but-unqueued gap.
    struct FailingProducer;

    #[async_trait]
    impl MessageProducer for FailingProducer {
        async fn publish(
            &self,
            _topic: &str,
            _payload: serde_json::Value,
        ) -> Result<crate::domain::MessageId, BrokerError> {
            Err(BrokerError::Unavailable("log offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_enqueue_failure_is_distinct_and_ticket_survives() {
        let store = Arc::new(MemoryTicketStore::new());
        let service = service_with(store.clone(), Arc::new(FailingProducer));

        let err = service.create_ticket("q".to_string()).await.unwrap_err();
        let id = match err {
            ServiceError::Enqueue { id, .. } => id,
            other => panic!("expected Enqueue error, got {other:?}"),
        };

        // The persistence half succeeded: the ticket is queryable
        let ticket = service.get_ticket_data(id).await.unwrap();
        assert_eq!(ticket.status, TicketStatus::Uninitialized);
    }

    #[tokio::test]
    async fn test_unknown_ticket_is_not_found() {
        let service = service_with(
            Arc::new(MemoryTicketStore::new()),
            Arc::new(MemoryBroker::new()),
        );

        let id = Uuid::new_v4();
        match service.get_ticket_status(id).await.unwrap_err() {
            ServiceError::NotFound(missing) => assert_eq!(missing, id),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_backward_transition_is_rejected() {
        let service = service_with(
            Arc::new(MemoryTicketStore::new()),
            Arc::new(MemoryBroker::new()),
        );

        let id = service.create_ticket("q".to_string()).await.unwrap();
        service.update_ticket_answer(id, "a".to_string()).await.unwrap();

        let err = service
            .update_ticket_status(id, TicketStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition { .. }));

        // The ticket is untouched
        let ticket = service.get_ticket_data(id).await.unwrap();
        assert_eq!(ticket.status, TicketStatus::Done);
        assert_eq!(ticket.answer.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_answer_is_absent_until_done() {
        let service = service_with(
            Arc::new(MemoryTicketStore::new()),
            Arc::new(MemoryBroker::new()),
        );

        let id = service.create_ticket("q".to_string()).await.unwrap();
        service
            .update_ticket_status(id, TicketStatus::Processing)
            .await
            .unwrap();
        assert!(service.get_ticket_data(id).await.unwrap().answer.is_none());

        service.update_ticket_answer(id, "a".to_string()).await.unwrap();
        let ticket = service.get_ticket_data(id).await.unwrap();
        assert_eq!(ticket.status, TicketStatus::Done);
        assert!(ticket.answer.is_some());
    }
}
