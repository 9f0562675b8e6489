//! Advice (LLM) endpoint provider.
//!
//! The external text-generation service receives the user's query plus a
//! serialized spending summary and returns free text. It is best-effort:
//! the core advice path downgrades failures to string results, while the
//! diagnostic routes surface them as gateway errors.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use thiserror::Error;

/// Error type for advice calls.
#[derive(Debug, Error)]
pub enum AdviceError {
    #[error("advice endpoint returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("{0}")]
    Network(String),

    #[error("empty response from advice endpoint")]
    Empty,
}

impl From<AdviceError> for AppError {
    fn from(err: AdviceError) -> Self {
        match err {
            AdviceError::Api { status, body } => {
                AppError::BadGateway(format!("LLM server returned {}: {}", status, body))
            }
            AdviceError::Network(msg) => {
                AppError::ServiceUnavailable(format!("Cannot connect to LLM server: {}", msg))
            }
            AdviceError::Empty => {
                AppError::BadGateway("Empty response from LLM server".to_string())
            }
        }
    }
}

/// Advice endpoint configuration.
#[derive(Debug, Clone)]
pub struct AdviceConfig {
    pub base_url: String,
    /// Generous fixed ceiling; the model can take a while to respond.
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    query: &'a str,
    data_context: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    response: Option<String>,
}

/// The advice operation this backend depends on.
#[async_trait]
pub trait AdviceApi: Send + Sync {
    /// Submit a query plus serialized spending context, returning the
    /// endpoint's text verbatim.
    async fn analyze(&self, query: &str, data_context: &str) -> Result<String, AdviceError>;
}

pub struct HttpAdviceClient {
    config: AdviceConfig,
    client: Client,
}

impl HttpAdviceClient {
    pub fn new(config: AdviceConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }
}

#[async_trait]
impl AdviceApi for HttpAdviceClient {
    async fn analyze(&self, query: &str, data_context: &str) -> Result<String, AdviceError> {
        let url = format!("{}/analyze", self.config.base_url);

        tracing::debug!(
            query_len = query.len(),
            context_len = data_context.len(),
            "Sending request to advice endpoint"
        );

        let response = self
            .client
            .post(&url)
            .json(&AnalyzeRequest {
                query,
                data_context,
            })
            .send()
            .await
            .map_err(|e| AdviceError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AdviceError::Api { status, body });
        }

        let parsed: AnalyzeResponse = response
            .json()
            .await
            .map_err(|e| AdviceError::Network(format!("Failed to parse response: {}", e)))?;

        match parsed.response {
            Some(text) if !text.is_empty() => Ok(text),
            _ => Err(AdviceError::Empty),
        }
    }
}

// ============================================================================
// Mock provider
// ============================================================================

/// Mock advice endpoint for tests. Counts calls and records the last
/// data context so tests can assert on what would have been sent.
#[derive(Default)]
pub struct MockAdviceApi {
    pub calls: AtomicUsize,
    pub last_context: Mutex<Option<String>>,
    fail: std::sync::atomic::AtomicBool,
}

impl MockAdviceApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail at the network level.
    pub fn fail_with_network_error(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdviceApi for MockAdviceApi {
    async fn analyze(&self, query: &str, data_context: &str) -> Result<String, AdviceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_context.lock().expect("mock state poisoned") = Some(data_context.to_string());

        if self.fail.load(Ordering::SeqCst) {
            return Err(AdviceError::Network("connection refused".to_string()));
        }

        Ok(format!("Mock advice for: {}", query))
    }
}
