//! Core pipeline logic.
//!
//! This module contains:
//! - TicketService: lifecycle orchestration (persist + enqueue + queries)
//! - TicketProcessor: the worker loop consuming creation events

pub mod processor;
pub mod service;

// Re-export commonly used types
pub use processor::{TicketProcessor, DEFAULT_GROUP};
pub use service::{ServiceError, TicketService};
