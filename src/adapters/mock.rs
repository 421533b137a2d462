//! Mock backend for demos and tests.
//!
//! Produces a canned answer after a configurable delay, standing in for a
//! real generation service.

use std::time::Duration;

use async_trait::async_trait;

use super::{Backend, BackendError, Generation};

/// Canned-response backend with a simulated processing delay
pub struct MockBackend {
    delay: Duration,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a mock with a 2 second delay, roughly what a real backend takes.
    pub fn new() -> Self {
        Self::with_delay(Duration::from_secs(2))
    }

    /// Create a mock with an explicit delay.
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompt: &str) -> Result<Generation, BackendError> {
        tokio::time::sleep(self.delay).await;

        let text = format!(
            "This is a mock response to the question: '{}'. \
             A real deployment replaces the mock backend with a generation service.",
            prompt
        );

        Ok(Generation::new(text))
    }
}
