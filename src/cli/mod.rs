//! Command-line interface and composition root.
//!
//! The CLI owns construction: it loads configuration, builds the concrete
//! store/broker/backend instances, and injects them into the service and
//! processor. No component reaches into shared process state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use uuid::Uuid;

use crate::adapters::{Backend, HttpBackend, MockBackend};
use crate::broker::{BrokerOptions, JournalBroker, MemoryBroker};
use crate::config::{self, BackendKind, ResolvedConfig};
use crate::core::{TicketProcessor, TicketService};
use crate::store::{FileTicketStore, MemoryTicketStore};

/// Asynchronous ticket-processing pipeline
#[derive(Parser, Debug)]
#[command(name = "ticketd", version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a worker consuming ticket.created events
    Work {
        /// Consumer name within the worker group
        #[arg(long, default_value = "ticket-processor-1")]
        consumer: String,
    },

    /// Create a ticket and print its id
    Ask {
        /// The question to process
        question: String,
    },

    /// Print the status of a ticket
    Status {
        /// Ticket id
        id: Uuid,
    },

    /// Print a ticket as JSON
    Show {
        /// Ticket id
        id: Uuid,
    },

    /// Run an in-memory end-to-end demo (no journal, mock backend)
    Demo {
        /// The question to process
        question: String,
    },
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = config::load()?;

        match self.command {
            Commands::Work { consumer } => work(&config, consumer).await,
            Commands::Ask { question } => ask(&config, question).await,
            Commands::Status { id } => status(&config, id).await,
            Commands::Show { id } => show(&config, id).await,
            Commands::Demo { question } => demo(question).await,
        }
    }
}

/// Build the configured backend adapter.
fn build_backend(config: &ResolvedConfig) -> Result<Arc<dyn Backend>> {
    match config.backend {
        BackendKind::Mock => Ok(Arc::new(MockBackend::new())),
        BackendKind::Http => {
            let api_url = config
                .api_url
                .clone()
                .context("http backend requires an api_url")?;
            Ok(Arc::new(HttpBackend::new(api_url, config.api_key.clone())))
        }
    }
}

/// Build the service over the durable store and journal.
fn build_service(config: &ResolvedConfig) -> (Arc<TicketService>, JournalBroker) {
    let store = Arc::new(FileTicketStore::new(config.tickets_dir()));
    let broker = JournalBroker::with_options(config.stream_dir(), config.broker.clone());
    let service = Arc::new(TicketService::new(store, Arc::new(broker.clone())));
    (service, broker)
}

async fn work(config: &ResolvedConfig, consumer: String) -> Result<()> {
    let (service, broker) = build_service(config);
    let backend = build_backend(config)?;

    info!(home = %config.home.display(), group = %config.group, "starting worker");

    let processor = TicketProcessor::new(
        service,
        backend,
        Arc::new(broker),
        config.group.clone(),
        consumer,
        config.processing_timeout,
    );

    processor.run().await;
    Ok(())
}

async fn ask(config: &ResolvedConfig, question: String) -> Result<()> {
    let (service, _broker) = build_service(config);

    let id = service
        .create_ticket(question)
        .await
        .context("Failed to create ticket")?;
    println!("{}", id);

    Ok(())
}

async fn status(config: &ResolvedConfig, id: Uuid) -> Result<()> {
    let (service, _broker) = build_service(config);

    let status = service.get_ticket_status(id).await?;
    println!("{}", status);

    Ok(())
}

async fn show(config: &ResolvedConfig, id: Uuid) -> Result<()> {
    let (service, _broker) = build_service(config);

    let ticket = service.get_ticket_data(id).await?;
    println!("{}", serde_json::to_string_pretty(&ticket)?);

    Ok(())
}

/// End-to-end pipeline in one process: memory store, memory broker, mock
/// backend. Shows the status progression a polling client would observe.
async fn demo(question: String) -> Result<()> {
    let store = Arc::new(MemoryTicketStore::new());
    let broker = MemoryBroker::with_options(BrokerOptions {
        poll_interval: Duration::from_millis(25),
        ..BrokerOptions::default()
    });
    let service = Arc::new(TicketService::new(store, Arc::new(broker.clone())));

    let processor = TicketProcessor::new(
        Arc::clone(&service),
        Arc::new(MockBackend::with_delay(Duration::from_millis(750))),
        Arc::new(broker),
        crate::core::DEFAULT_GROUP,
        "demo-worker",
        Duration::from_secs(30),
    );
    let worker = tokio::spawn(async move { processor.run().await });

    let id = service.create_ticket(question).await?;
    println!("ticket {}", id);

    let mut last = None;
    loop {
        let ticket = service.get_ticket_data(id).await?;
        if last != Some(ticket.status) {
            println!("status: {}", ticket.status);
            last = Some(ticket.status);
        }
        if ticket.is_done() {
            println!("answer: {}", ticket.answer.unwrap_or_default());
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    worker.abort();
    Ok(())
}
