//! Backend adapters for answer generation.
//!
//! The processing backend is external to the pipeline: given a prompt it
//! returns generated text, may take seconds, and may fail. Adapters hide
//! the transport behind one capability trait so the worker does not care
//! how an answer is computed.

pub mod http;
pub mod mock;

use async_trait::async_trait;
use thiserror::Error;

// Re-export the backend adapters
pub use http::HttpBackend;
pub use mock::MockBackend;

/// Errors surfaced by backend calls
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Request(String),

    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("backend response was not decodable: {0}")]
    Decode(String),
}

/// Output of one generation call
#[derive(Debug, Clone)]
pub struct Generation {
    /// The generated text
    pub text: String,

    /// Tokens used (if the backend reports it)
    pub tokens_used: Option<u64>,
}

impl Generation {
    /// Create a generation with just text
    pub fn new(text: String) -> Self {
        Self {
            text,
            tokens_used: None,
        }
    }
}

/// Trait for answer-generation backends
#[async_trait]
pub trait Backend: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Generate text for a prompt
    async fn generate(&self, prompt: &str) -> Result<Generation, BackendError>;
}
