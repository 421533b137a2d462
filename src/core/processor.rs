//! Worker loop consuming `ticket.created` events.
//!
//! One processor task runs per worker identity. Workers share a consumer
//! group, so multiple processes load-balance the stream automatically.
//! Each delivered record spawns its own task: a slow backend call for one
//! ticket never delays consumption of the next record.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::Backend;
use crate::broker::{Delivery, MessageConsumer, MessageStream};
use crate::domain::{TicketCreated, TicketStatus, TOPIC_TICKET_CREATED};

use super::service::{ServiceError, TicketService};

/// Delay before re-subscribing after the subscription itself fails
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(5);

/// Consumer group shared by all ticket workers
pub const DEFAULT_GROUP: &str = "ticket-processors";

/// Long-running consumer that drives tickets through
/// `processing → done`.
pub struct TicketProcessor {
    service: Arc<TicketService>,
    backend: Arc<dyn Backend>,
    consumer: Arc<dyn MessageConsumer>,
    group: String,
    consumer_name: String,
    processing_timeout: Duration,
}

impl TicketProcessor {
    /// Create a processor with explicitly injected collaborators.
    pub fn new(
        service: Arc<TicketService>,
        backend: Arc<dyn Backend>,
        consumer: Arc<dyn MessageConsumer>,
        group: impl Into<String>,
        consumer_name: impl Into<String>,
        processing_timeout: Duration,
    ) -> Self {
        Self {
            service,
            backend,
            consumer,
            group: group.into(),
            consumer_name: consumer_name.into(),
            processing_timeout,
        }
    }

    /// Run the subscribe loop forever.
    ///
    /// Subscription failures are retried with a fixed delay in an explicit
    /// loop; there is no recursion and no bound, this is the supervisory
    /// availability boundary of the worker.
    #[instrument(skip(self), fields(group = %self.group, consumer = %self.consumer_name))]
    pub async fn run(&self) {
        info!(backend = self.backend.name(), "starting ticket processor");

        loop {
            let mut stream = match self
                .consumer
                .subscribe(TOPIC_TICKET_CREATED, &self.group, &self.consumer_name)
                .await
            {
                Ok(stream) => stream,
                Err(e) => {
                    error!(error = %e, "subscribe failed, retrying");
                    tokio::time::sleep(RESUBSCRIBE_DELAY).await;
                    continue;
                }
            };

            loop {
                let delivery = stream.recv().await;
                self.dispatch(delivery).await;
            }
        }
    }

    /// Hand one delivery to its own task.
    async fn dispatch(&self, delivery: Delivery) {
        let ticket_id = match serde_json::from_value::<TicketCreated>(delivery.payload.clone()) {
            Ok(event) => event.ticket_id,
            Err(e) => {
                // Poison-pill policy: an undecodable payload is acknowledged
                // and dropped so it is never redelivered
                warn!(id = delivery.id, error = %e, "dropping record without a usable ticket_id");
                if let Err(e) = delivery.ack().await {
                    warn!(error = %e, "failed to ack malformed record");
                }
                return;
            }
        };

        let service = Arc::clone(&self.service);
        let backend = Arc::clone(&self.backend);
        let timeout = self.processing_timeout;

        tokio::spawn(async move {
            match process_ticket(&service, backend.as_ref(), ticket_id, timeout).await {
                Ok(()) => {
                    if let Err(e) = delivery.ack().await {
                        warn!(ticket_id = %ticket_id, error = %e, "processed ticket but ack failed");
                    }
                }
                Err(e) => {
                    // Not acknowledged: the broker redelivers after the
                    // delivery window, up to its delivery cap
                    error!(ticket_id = %ticket_id, error = %e, "ticket processing failed");
                }
            }
        });
    }
}

/// Errors that end one record's processing
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("backend error: {0}")]
    Backend(#[from] crate::adapters::BackendError),

    #[error("backend timed out after {0:?}")]
    Timeout(Duration),
}

/// Drive one ticket through `processing → done`.
///
/// Returns `Ok(())` when the record should be acknowledged: either the
/// ticket completed here, or it was already done (a redelivery after a
/// crash between completion and acknowledgment).
#[instrument(skip(service, backend, timeout))]
async fn process_ticket(
    service: &TicketService,
    backend: &dyn Backend,
    ticket_id: Uuid,
    timeout: Duration,
) -> Result<(), ProcessError> {
    let ticket = service.get_ticket_data(ticket_id).await?;

    if ticket.is_done() {
        info!(ticket_id = %ticket_id, "ticket already done, skipping reprocessing");
        return Ok(());
    }

    service
        .update_ticket_status(ticket_id, TicketStatus::Processing)
        .await?;
    info!(ticket_id = %ticket_id, "processing ticket");

    let generation = tokio::time::timeout(timeout, backend.generate(&ticket.question))
        .await
        .map_err(|_| ProcessError::Timeout(timeout))??;

    service
        .update_ticket_answer(ticket_id, generation.text)
        .await?;
    info!(ticket_id = %ticket_id, "completed ticket");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{BackendError, Generation};
    use crate::broker::{MemoryBroker, MessageProducer};
    use crate::store::MemoryTicketStore;
    use async_trait::async_trait;

    struct InstantBackend;

    #[async_trait]
    impl Backend for InstantBackend {
        fn name(&self) -> &str {
            "instant"
        }

        async fn generate(&self, prompt: &str) -> Result<Generation, BackendError> {
            Ok(Generation::new(format!("answer to {}", prompt)))
        }
    }

    fn fixture() -> (Arc<TicketService>, MemoryBroker) {
        let broker = MemoryBroker::new();
        let service = Arc::new(TicketService::new(
            Arc::new(MemoryTicketStore::new()),
            Arc::new(broker.clone()),
        ));
        (service, broker)
    }

    #[tokio::test]
    async fn test_process_ticket_reaches_done() {
        let (service, _broker) = fixture();
        let id = service.create_ticket("2+2?".to_string()).await.unwrap();

        process_ticket(&service, &InstantBackend, id, Duration::from_secs(5))
            .await
            .unwrap();

        let ticket = service.get_ticket_data(id).await.unwrap();
        assert_eq!(ticket.status, TicketStatus::Done);
        assert!(ticket.answer.unwrap().contains("2+2?"));
    }

    #[tokio::test]
    async fn test_done_ticket_is_not_reprocessed() {
        let (service, _broker) = fixture();
        let id = service.create_ticket("q".to_string()).await.unwrap();
        service
            .update_ticket_answer(id, "first answer".to_string())
            .await
            .unwrap();

        struct PanicBackend;

        #[async_trait]
        impl Backend for PanicBackend {
            fn name(&self) -> &str {
                "panic"
            }

            async fn generate(&self, _prompt: &str) -> Result<Generation, BackendError> {
                panic!("backend must not be called for a done ticket");
            }
        }

        process_ticket(&service, &PanicBackend, id, Duration::from_secs(5))
            .await
            .unwrap();

        let ticket = service.get_ticket_data(id).await.unwrap();
        assert_eq!(ticket.answer.as_deref(), Some("first answer"));
    }

    #[tokio::test]
    async fn test_missing_ticket_is_an_error_not_a_panic() {
        let (service, _broker) = fixture();

        let err = process_ticket(
            &service,
            &InstantBackend,
            Uuid::new_v4(),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ProcessError::Service(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_backend_failure_leaves_ticket_processing() {
        let (service, _broker) = fixture();
        let id = service.create_ticket("q".to_string()).await.unwrap();

        struct BrokenBackend;

        #[async_trait]
        impl Backend for BrokenBackend {
            fn name(&self) -> &str {
                "broken"
            }

            async fn generate(&self, _prompt: &str) -> Result<Generation, BackendError> {
                Err(BackendError::Request("boom".to_string()))
            }
        }

        let err = process_ticket(&service, &BrokenBackend, id, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Backend(_)));

        // Known gap: no terminal failed state, the ticket stays processing
        let ticket = service.get_ticket_data(id).await.unwrap();
        assert_eq!(ticket.status, TicketStatus::Processing);
        assert!(ticket.answer.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_backend_hits_deadline() {
        let (service, _broker) = fixture();
        let id = service.create_ticket("q".to_string()).await.unwrap();

        struct HungBackend;

        #[async_trait]
        impl Backend for HungBackend {
            fn name(&self) -> &str {
                "hung"
            }

            async fn generate(&self, _prompt: &str) -> Result<Generation, BackendError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Generation::new(String::new()))
            }
        }

        let err = process_ticket(&service, &HungBackend, id, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_worker_drives_ticket_end_to_end() {
        let (service, broker) = fixture();

        let processor = TicketProcessor::new(
            Arc::clone(&service),
            Arc::new(InstantBackend),
            Arc::new(broker.clone()),
            DEFAULT_GROUP,
            "worker-1",
            Duration::from_secs(5),
        );
        let worker = tokio::spawn(async move { processor.run().await });

        let id = service.create_ticket("2+2?".to_string()).await.unwrap();

        let ticket = wait_done(&service, id).await;
        assert_eq!(ticket.question, "2+2?");
        assert!(!ticket.answer.unwrap().is_empty());

        worker.abort();
    }

    #[tokio::test]
    async fn test_malformed_payload_does_not_stall_the_stream() {
        let (service, broker) = fixture();

        let processor = TicketProcessor::new(
            Arc::clone(&service),
            Arc::new(InstantBackend),
            Arc::new(broker.clone()),
            DEFAULT_GROUP,
            "worker-1",
            Duration::from_secs(5),
        );
        let worker = tokio::spawn(async move { processor.run().await });

        // No ticket_id field: acked and dropped
        broker
            .publish(TOPIC_TICKET_CREATED, serde_json::json!({"bogus": true}))
            .await
            .unwrap();

        // A well-formed event afterwards still gets processed
        let id = service.create_ticket("q".to_string()).await.unwrap();
        let ticket = wait_done(&service, id).await;
        assert!(ticket.answer.is_some());

        worker.abort();
    }

    async fn wait_done(service: &TicketService, id: Uuid) -> crate::domain::Ticket {
        for _ in 0..200 {
            let ticket = service.get_ticket_data(id).await.unwrap();
            if ticket.is_done() {
                return ticket;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("ticket {} never reached done", id);
    }
}
