//! HTTP backend adapter.
//!
//! Posts `{"prompt": ...}` to a completion endpoint and expects
//! `{"text": ..., "tokens_used": ...}` back. Authentication is a bearer
//! token when configured.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Backend, BackendError, Generation};

/// Transport-level request timeout; the worker applies its own overall
/// processing deadline on top of this.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Request body sent to the completion endpoint
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
}

/// Response body returned by the completion endpoint
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
    tokens_used: Option<u64>,
}

/// HTTP client for a remote generation service
pub struct HttpBackend {
    /// Completion endpoint URL
    api_url: String,

    /// Optional bearer token
    api_key: Option<String>,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpBackend {
    /// Create a backend for the given endpoint.
    pub fn new(api_url: impl Into<String>, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            api_url: api_url.into(),
            api_key,
            client,
        }
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn generate(&self, prompt: &str) -> Result<Generation, BackendError> {
        let mut request = self
            .client
            .post(&self.api_url)
            .json(&GenerateRequest { prompt });

        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        Ok(Generation {
            text: parsed.text,
            tokens_used: parsed.tokens_used,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_name() {
        let backend = HttpBackend::new("http://localhost:9000/generate", None);
        assert_eq!(backend.name(), "http");
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(GenerateRequest { prompt: "2+2?" }).unwrap();
        assert_eq!(body, serde_json::json!({"prompt": "2+2?"}));
    }
}
