use async_trait::async_trait;
use serde_json::Value;
use url::Url;

pub mod client;
pub mod gemini;
pub mod retry;
pub mod transport;
pub mod types;

pub use client::InferenceClient;
pub use retry::{RetryMode, RetryPolicy};
pub use transport::ReqwestTransport;
pub use types::*;

/// Raw outcome of one HTTP exchange, before any envelope parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The single outbound call the inference client makes.
/// Production uses reqwest; tests script the responses.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` as JSON and return the status and body text.
    /// Only failures to complete the exchange are errors; non-2xx statuses
    /// come back as a normal `TransportResponse`.
    async fn post_json(&self, url: &Url, body: &Value) -> Result<TransportResponse, AiError>;
}
